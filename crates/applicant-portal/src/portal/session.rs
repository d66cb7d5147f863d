use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::domain::{Identity, Principal};

/// Opaque bearer token naming one browser session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(pub String);

impl SessionToken {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a session stands with the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Initializing,
    Anonymous,
    Authenticated(Identity),
}

impl AuthState {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            AuthState::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }
}

/// External identity provider. The portal never sees credentials, only the resulting principal.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticate(&self, principal: &str) -> Result<Identity, AuthError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("login rejected: {0}")]
    Rejected(String),
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
    #[error("unknown session")]
    UnknownSession,
}

/// Accepts any well-formed principal. Intended for local development and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct DevIdentityProvider;

const MAX_PRINCIPAL_LEN: usize = 64;

#[async_trait]
impl IdentityProvider for DevIdentityProvider {
    async fn authenticate(&self, principal: &str) -> Result<Identity, AuthError> {
        let principal = principal.trim();
        if principal.is_empty() {
            return Err(AuthError::Rejected("principal is required".to_string()));
        }
        if principal.len() > MAX_PRINCIPAL_LEN {
            return Err(AuthError::Rejected(format!(
                "principal exceeds {MAX_PRINCIPAL_LEN} characters"
            )));
        }
        if !principal
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(AuthError::Rejected(
                "principal may only contain letters, digits, '-', '_' and '.'".to_string(),
            ));
        }

        Ok(Identity::new(Principal(principal.to_string())))
    }
}

/// Outcome of a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLogin {
    pub token: SessionToken,
    pub identity: Identity,
    /// Identity the session carried before this login, if any.
    pub replaced: Option<Identity>,
}

const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone)]
struct SessionEntry {
    state: AuthState,
    last_seen: Instant,
}

impl SessionEntry {
    fn new(state: AuthState) -> Self {
        Self {
            state,
            last_seen: Instant::now(),
        }
    }
}

/// Explicit session context: token to authentication state.
///
/// Sessions idle for longer than the TTL are forgotten. Expired entries are
/// swept whenever a session is opened or a login starts.
#[derive(Debug)]
pub struct SessionStore {
    idle_ttl: Duration,
    sessions: Mutex<HashMap<SessionToken, SessionEntry>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_idle_ttl(DEFAULT_IDLE_TTL)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            idle_ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn idle_ttl(&self) -> Duration {
        self.idle_ttl
    }

    /// Opens an anonymous session.
    pub fn open(&self) -> SessionToken {
        let token = SessionToken::generate();
        let mut sessions = self.lock();
        self.sweep(&mut sessions);
        sessions.insert(token.clone(), SessionEntry::new(AuthState::Anonymous));
        token
    }

    /// Unknown, expired, or missing tokens read as anonymous. Reading a live session keeps it alive.
    pub fn state(&self, token: Option<&SessionToken>) -> AuthState {
        let Some(token) = token else {
            return AuthState::Anonymous;
        };
        let mut sessions = self.lock();
        match sessions.get_mut(token) {
            Some(entry) if entry.last_seen.elapsed() < self.idle_ttl => {
                entry.last_seen = Instant::now();
                entry.state.clone()
            }
            Some(_) => {
                sessions.remove(token);
                AuthState::Anonymous
            }
            None => AuthState::Anonymous,
        }
    }

    /// Moves the session through `Initializing` while the provider resolves the principal.
    ///
    /// A rejected login restores whatever the session held before. A rejected login
    /// without a token leaves nothing behind.
    pub async fn login(
        &self,
        token: Option<SessionToken>,
        provider: &dyn IdentityProvider,
        principal: &str,
    ) -> Result<SessionLogin, AuthError> {
        let (token, previous) = {
            let mut sessions = self.lock();
            self.sweep(&mut sessions);
            match token {
                Some(token) => {
                    let entry = sessions.get_mut(&token).ok_or(AuthError::UnknownSession)?;
                    let previous =
                        std::mem::replace(&mut entry.state, AuthState::Initializing);
                    entry.last_seen = Instant::now();
                    (token, Some(previous))
                }
                None => {
                    let token = SessionToken::generate();
                    sessions.insert(token.clone(), SessionEntry::new(AuthState::Initializing));
                    (token, None)
                }
            }
        };

        match provider.authenticate(principal).await {
            Ok(identity) => {
                self.lock().insert(
                    token.clone(),
                    SessionEntry::new(AuthState::Authenticated(identity.clone())),
                );
                info!(principal = %identity.principal, "session authenticated");
                let replaced = previous.and_then(|state| state.identity().cloned());
                Ok(SessionLogin {
                    token,
                    identity,
                    replaced,
                })
            }
            Err(err) => {
                let mut sessions = self.lock();
                match previous {
                    Some(state) => {
                        sessions.insert(token, SessionEntry::new(state));
                    }
                    None => {
                        sessions.remove(&token);
                    }
                }
                warn!(error = %err, "login failed");
                Err(err)
            }
        }
    }

    /// Drops the session, returning the identity it carried.
    pub fn logout(&self, token: &SessionToken) -> Option<Identity> {
        match self.lock().remove(token) {
            Some(SessionEntry {
                state: AuthState::Authenticated(identity),
                ..
            }) => Some(identity),
            _ => None,
        }
    }

    /// Forgets every idle session, returning how many were dropped.
    pub fn purge_idle(&self) -> usize {
        let mut sessions = self.lock();
        self.sweep(&mut sessions)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sweep(&self, sessions: &mut HashMap<SessionToken, SessionEntry>) -> usize {
        let before = sessions.len();
        sessions.retain(|_, entry| entry.last_seen.elapsed() < self.idle_ttl);
        let dropped = before - sessions.len();
        if dropped > 0 {
            debug!(dropped, "idle sessions expired");
        }
        dropped
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionToken, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Notify;

    /// Provider that parks until released so the pending state can be observed.
    struct GatedProvider {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl IdentityProvider for GatedProvider {
        async fn authenticate(&self, principal: &str) -> Result<Identity, AuthError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(Identity::new(Principal(principal.to_string())))
        }
    }

    #[tokio::test]
    async fn login_then_logout_round_trip() {
        let store = SessionStore::new();
        let token = store.open();
        assert_eq!(store.state(Some(&token)), AuthState::Anonymous);

        let SessionLogin {
            token,
            identity,
            replaced,
        } = store
            .login(Some(token), &DevIdentityProvider, "applicant-7")
            .await
            .expect("login succeeds");
        assert_eq!(replaced, None);
        assert_eq!(identity.principal, Principal("applicant-7".to_string()));
        assert_eq!(
            store.state(Some(&token)).identity().map(|id| &id.principal),
            Some(&identity.principal)
        );

        assert_eq!(store.logout(&token), Some(identity));
        assert_eq!(store.state(Some(&token)), AuthState::Anonymous);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn rejected_login_leaves_session_anonymous() {
        let store = SessionStore::new();
        let token = store.open();
        let err = store
            .login(Some(token.clone()), &DevIdentityProvider, "has spaces")
            .await
            .expect_err("principal rejected");
        assert!(matches!(err, AuthError::Rejected(_)));
        assert_eq!(store.state(Some(&token)), AuthState::Anonymous);
    }

    #[tokio::test]
    async fn login_with_unknown_token_fails() {
        let store = SessionStore::new();
        let err = store
            .login(
                Some(SessionToken("stale".to_string())),
                &DevIdentityProvider,
                "applicant-7",
            )
            .await
            .expect_err("unknown session");
        assert_eq!(err, AuthError::UnknownSession);
    }

    #[tokio::test]
    async fn session_is_initializing_while_provider_resolves() {
        let store = Arc::new(SessionStore::new());
        let token = store.open();
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let provider = GatedProvider {
            entered: entered.clone(),
            release: release.clone(),
        };

        let login = {
            let store = store.clone();
            let token = token.clone();
            tokio::spawn(async move {
                store
                    .login(Some(token), &provider, "applicant-9")
                    .await
                    .map(|login| login.identity)
            })
        };

        entered.notified().await;
        assert_eq!(store.state(Some(&token)), AuthState::Initializing);

        release.notify_one();
        let identity = login.await.expect("task joins").expect("login succeeds");
        assert_eq!(
            store.state(Some(&token)),
            AuthState::Authenticated(identity)
        );
    }

    #[tokio::test]
    async fn relogin_reports_the_replaced_identity() {
        let store = SessionStore::new();
        let first = store
            .login(None, &DevIdentityProvider, "applicant-1")
            .await
            .expect("first login");
        let second = store
            .login(Some(first.token.clone()), &DevIdentityProvider, "applicant-2")
            .await
            .expect("second login");
        assert_eq!(second.token, first.token);
        assert_eq!(second.replaced, Some(first.identity));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn rejected_relogin_keeps_the_current_identity() {
        let store = SessionStore::new();
        let login = store
            .login(None, &DevIdentityProvider, "applicant-1")
            .await
            .expect("login");
        store
            .login(Some(login.token.clone()), &DevIdentityProvider, "bad name")
            .await
            .expect_err("principal rejected");
        assert_eq!(
            store.state(Some(&login.token)),
            AuthState::Authenticated(login.identity)
        );
    }

    #[tokio::test]
    async fn rejected_login_without_a_session_leaves_nothing_behind() {
        let store = SessionStore::new();
        for _ in 0..3 {
            store
                .login(None, &DevIdentityProvider, "")
                .await
                .expect_err("blank principal rejected");
        }
        assert!(store.is_empty());
    }

    #[test]
    fn idle_sessions_expire_and_are_swept() {
        let store = SessionStore::with_idle_ttl(Duration::from_millis(20));
        let stale = store.open();
        store.open();
        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(store.state(Some(&stale)), AuthState::Anonymous);
        assert_eq!(store.len(), 1);

        let fresh = store.open();
        assert_eq!(store.len(), 1);
        assert_eq!(store.state(Some(&fresh)), AuthState::Anonymous);
        assert_eq!(store.purge_idle(), 0);
    }

    #[tokio::test]
    async fn login_on_an_expired_session_is_rejected() {
        let store = SessionStore::with_idle_ttl(Duration::from_millis(10));
        let token = store.open();
        std::thread::sleep(Duration::from_millis(30));
        let err = store
            .login(Some(token), &DevIdentityProvider, "applicant-7")
            .await
            .expect_err("session expired");
        assert_eq!(err, AuthError::UnknownSession);
        assert!(store.is_empty());
    }
}
