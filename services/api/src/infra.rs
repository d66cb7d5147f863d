use applicant_portal::config::PortalConfig;
use applicant_portal::portal::{
    ApplicationPortal, DevIdentityProvider, InMemoryBlobStore, InMemoryPortalBackend, PortalState,
    SessionStore,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type LocalPortal = ApplicationPortal<InMemoryPortalBackend, InMemoryBlobStore>;
pub(crate) type LocalPortalState = PortalState<InMemoryPortalBackend, InMemoryBlobStore>;

/// Wires the portal against the in-process backend and blob store.
pub(crate) fn local_portal(config: &PortalConfig) -> Arc<LocalPortal> {
    let backend = InMemoryPortalBackend::with_admins(config.admin_principals.iter().cloned());
    let blobs = InMemoryBlobStore::new(config.upload_chunk_bytes);
    Arc::new(ApplicationPortal::new(
        Arc::new(backend),
        Arc::new(blobs),
        config,
    ))
}

pub(crate) fn local_portal_state(config: &PortalConfig) -> LocalPortalState {
    PortalState {
        portal: local_portal(config),
        sessions: Arc::new(SessionStore::with_idle_ttl(config.session_idle_ttl)),
        identity: Arc::new(DevIdentityProvider),
    }
}
