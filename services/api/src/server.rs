use crate::cli::ServeArgs;
use crate::infra::{local_portal_state, AppState};
use crate::routes::with_portal_routes;
use applicant_portal::config::AppConfig;
use applicant_portal::error::AppError;
use applicant_portal::telemetry;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let portal_state = local_portal_state(&config.portal);
    let app = with_portal_routes(portal_state)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        public_url = %config.portal.public_base_url,
        status_ttl_secs = config.portal.status_ttl.as_secs(),
        "applicant portal ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
