use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::portal::domain::Principal;

const DEFAULT_STATUS_TTL_SECS: u64 = 30;
const DEFAULT_MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_UPLOAD_CHUNK_BYTES: usize = 64 * 1024;
const DEFAULT_MAX_FILES_PER_UPLOAD: usize = 10;
const DEFAULT_SESSION_IDLE_SECS: u64 = 30 * 60;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub portal: PortalConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let status_ttl = Duration::from_secs(numeric_var(
            "PORTAL_STATUS_TTL_SECS",
            DEFAULT_STATUS_TTL_SECS,
        )?);
        let max_document_bytes =
            numeric_var("PORTAL_MAX_DOCUMENT_BYTES", DEFAULT_MAX_DOCUMENT_BYTES)?;
        let upload_chunk_bytes =
            positive_var("PORTAL_UPLOAD_CHUNK_BYTES", DEFAULT_UPLOAD_CHUNK_BYTES)?;
        let max_files_per_upload =
            positive_var("PORTAL_MAX_FILES_PER_UPLOAD", DEFAULT_MAX_FILES_PER_UPLOAD)?;
        let session_idle_ttl = Duration::from_secs(positive_var(
            "PORTAL_SESSION_IDLE_SECS",
            DEFAULT_SESSION_IDLE_SECS,
        )?);

        let public_base_url = env::var("PORTAL_PUBLIC_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|_| format!("http://{host}:{port}"));

        let admin_principals = env::var("PORTAL_ADMIN_PRINCIPALS")
            .map(|raw| parse_principals(&raw))
            .unwrap_or_default();

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            portal: PortalConfig {
                status_ttl,
                max_document_bytes,
                upload_chunk_bytes,
                max_files_per_upload,
                session_idle_ttl,
                public_base_url,
                admin_principals,
            },
        })
    }
}

fn numeric_var<T>(variable: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match env::var(variable) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber {
                variable,
                value: raw,
            }),
        Err(_) => Ok(default),
    }
}

fn positive_var<T>(variable: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + Default + PartialEq,
{
    let value = numeric_var(variable, default)?;
    if value == T::default() {
        return Err(ConfigError::InvalidNumber {
            variable,
            value: "0".to_string(),
        });
    }
    Ok(value)
}

fn parse_principals(raw: &str) -> Vec<Principal> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| Principal(value.to_string()))
        .collect()
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Knobs for the submission wizard: cache lifetime, upload limits, and who administers it.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub status_ttl: Duration,
    pub max_document_bytes: usize,
    pub upload_chunk_bytes: usize,
    pub max_files_per_upload: usize,
    /// Sessions untouched for this long are forgotten.
    pub session_idle_ttl: Duration,
    pub public_base_url: String,
    pub admin_principals: Vec<Principal>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            status_ttl: Duration::from_secs(DEFAULT_STATUS_TTL_SECS),
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            upload_chunk_bytes: DEFAULT_UPLOAD_CHUNK_BYTES,
            max_files_per_upload: DEFAULT_MAX_FILES_PER_UPLOAD,
            session_idle_ttl: Duration::from_secs(DEFAULT_SESSION_IDLE_SECS),
            public_base_url: "http://127.0.0.1:3000".to_string(),
            admin_principals: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { variable: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { variable, value } => {
                write!(f, "{variable} must be a positive integer (found '{value}')")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for variable in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "PORTAL_STATUS_TTL_SECS",
            "PORTAL_MAX_DOCUMENT_BYTES",
            "PORTAL_UPLOAD_CHUNK_BYTES",
            "PORTAL_MAX_FILES_PER_UPLOAD",
            "PORTAL_SESSION_IDLE_SECS",
            "PORTAL_PUBLIC_URL",
            "PORTAL_ADMIN_PRINCIPALS",
        ] {
            env::remove_var(variable);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.portal.status_ttl, Duration::from_secs(30));
        assert_eq!(config.portal.max_document_bytes, 10 * 1024 * 1024);
        assert_eq!(config.portal.max_files_per_upload, 10);
        assert_eq!(config.portal.session_idle_ttl, Duration::from_secs(1800));
        assert_eq!(config.portal.public_base_url, "http://127.0.0.1:3000");
        assert!(config.portal.admin_principals.is_empty());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn portal_settings_read_from_env() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("PORTAL_STATUS_TTL_SECS", "5");
        env::set_var("PORTAL_MAX_FILES_PER_UPLOAD", "3");
        env::set_var("PORTAL_SESSION_IDLE_SECS", "90");
        env::set_var("PORTAL_PUBLIC_URL", "https://portal.example.org/");
        env::set_var("PORTAL_ADMIN_PRINCIPALS", "root-admin, ,ops-admin");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.portal.status_ttl, Duration::from_secs(5));
        assert_eq!(config.portal.max_files_per_upload, 3);
        assert_eq!(config.portal.session_idle_ttl, Duration::from_secs(90));
        assert_eq!(config.portal.public_base_url, "https://portal.example.org");
        assert_eq!(
            config.portal.admin_principals,
            vec![
                Principal("root-admin".to_string()),
                Principal("ops-admin".to_string())
            ]
        );
        reset_env();
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("PORTAL_UPLOAD_CHUNK_BYTES", "0");
        match AppConfig::load() {
            Err(ConfigError::InvalidNumber { variable, .. }) => {
                assert_eq!(variable, "PORTAL_UPLOAD_CHUNK_BYTES");
            }
            other => panic!("expected invalid number, got {other:?}"),
        }
        reset_env();
    }

    #[test]
    fn rejects_zero_session_idle_time() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("PORTAL_SESSION_IDLE_SECS", "0");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidNumber {
                variable: "PORTAL_SESSION_IDLE_SECS",
                ..
            })
        ));
        reset_env();
    }
}
