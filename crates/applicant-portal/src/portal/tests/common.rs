use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use serde_json::Value;
use tokio::sync::Notify;
use tower::ServiceExt;

use crate::config::PortalConfig;
use crate::portal::backend::{BackendError, RemoteService};
use crate::portal::blob::{BlobError, BlobStore, InMemoryBlobStore, PendingDocument, ProgressSink, StoredBlob};
use crate::portal::domain::{
    ApplicantDetails, ApplicationStatus, DocumentRef, Identity, Principal, UserProfile, UserRole,
};
use crate::portal::forms::DetailsForm;
use crate::portal::memory::InMemoryPortalBackend;
use crate::portal::router::{portal_router, PortalState};
use crate::portal::service::ApplicationPortal;
use crate::portal::session::{DevIdentityProvider, SessionStore};

pub(super) fn identity(name: &str) -> Identity {
    Identity::new(Principal(name.to_string()))
}

pub(super) fn details_form() -> DetailsForm {
    DetailsForm {
        applicant_name: "  Asha Verma ".to_string(),
        father_name: "Raj Verma".to_string(),
        address: "14 Lake Road, Pune".to_string(),
        service_opted: "passport".to_string(),
    }
}

pub(super) fn submitted_details() -> ApplicantDetails {
    details_form().validate().expect("fixture form is valid")
}

pub(super) fn pdf(name: &str, size: usize) -> PendingDocument {
    PendingDocument::new(name, vec![b'%'; size])
}

pub(super) fn document_ref(key: &str) -> DocumentRef {
    DocumentRef {
        key: key.to_string(),
        name: format!("{key}.pdf"),
        content_type: "application/pdf".to_string(),
        size_bytes: 12,
    }
}

pub(super) fn portal_config() -> PortalConfig {
    PortalConfig {
        status_ttl: Duration::from_secs(60),
        max_document_bytes: 64 * 1024,
        upload_chunk_bytes: 1024,
        max_files_per_upload: 4,
        session_idle_ttl: Duration::from_secs(600),
        public_base_url: "https://portal.test".to_string(),
        admin_principals: Vec::new(),
    }
}

/// Remote service double that records how often each operation reached it.
#[derive(Default)]
pub(super) struct CountingBackend {
    inner: InMemoryPortalBackend,
    pub(super) status_calls: AtomicUsize,
    pub(super) submit_calls: AtomicUsize,
    pub(super) upload_calls: AtomicUsize,
    failure: Mutex<Option<BackendError>>,
    status_gate: Mutex<Option<StatusGate>>,
}

/// Parks one status fetch after it has read the backend.
#[derive(Clone)]
pub(super) struct StatusGate {
    pub(super) entered: Arc<Notify>,
    pub(super) release: Arc<Notify>,
}

impl CountingBackend {
    pub(super) fn with_admins(admins: &[&str]) -> Self {
        Self {
            inner: InMemoryPortalBackend::with_admins(
                admins.iter().map(|name| Principal(name.to_string())),
            ),
            ..Self::default()
        }
    }

    pub(super) fn fail_with(&self, error: BackendError) {
        *self.failure.lock().expect("lock") = Some(error);
    }

    pub(super) fn recover(&self) {
        *self.failure.lock().expect("lock") = None;
    }

    /// The next status fetch snapshots the backend, signals `entered`, then waits for `release`.
    pub(super) fn hold_next_status_fetch(&self) -> StatusGate {
        let gate = StatusGate {
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        };
        *self.status_gate.lock().expect("lock") = Some(gate.clone());
        gate
    }

    pub(super) fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), BackendError> {
        match self.failure.lock().expect("lock").clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteService for CountingBackend {
    async fn get_application_status(
        &self,
        caller: &Principal,
    ) -> Result<ApplicationStatus, BackendError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let snapshot = self.inner.get_application_status(caller).await?;
        let gate = self.status_gate.lock().expect("lock").take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        Ok(snapshot)
    }

    async fn submit_applicant_details(
        &self,
        caller: &Principal,
        details: ApplicantDetails,
    ) -> Result<(), BackendError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.submit_applicant_details(caller, details).await
    }

    async fn upload_application_documents(
        &self,
        caller: &Principal,
        files: Vec<DocumentRef>,
    ) -> Result<(), BackendError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.upload_application_documents(caller, files).await
    }

    async fn clear_documents(&self, caller: &Principal) -> Result<(), BackendError> {
        self.check()?;
        self.inner.clear_documents(caller).await
    }

    async fn get_caller_user_profile(
        &self,
        caller: &Principal,
    ) -> Result<Option<UserProfile>, BackendError> {
        self.check()?;
        self.inner.get_caller_user_profile(caller).await
    }

    async fn save_caller_user_profile(
        &self,
        caller: &Principal,
        profile: UserProfile,
    ) -> Result<(), BackendError> {
        self.check()?;
        self.inner.save_caller_user_profile(caller, profile).await
    }

    async fn get_caller_user_role(&self, caller: &Principal) -> Result<UserRole, BackendError> {
        self.inner.get_caller_user_role(caller).await
    }

    async fn assign_user_role(
        &self,
        caller: &Principal,
        user: &Principal,
        role: UserRole,
    ) -> Result<(), BackendError> {
        self.inner.assign_user_role(caller, user, role).await
    }

    async fn get_all_applications(
        &self,
        caller: &Principal,
    ) -> Result<Vec<ApplicantDetails>, BackendError> {
        self.inner.get_all_applications(caller).await
    }

    async fn get_application_by_user(
        &self,
        caller: &Principal,
        user: &Principal,
    ) -> Result<ApplicationStatus, BackendError> {
        self.inner.get_application_by_user(caller, user).await
    }
}

/// Blob store that refuses files whose name contains "corrupt".
#[derive(Default)]
pub(super) struct PickyBlobStore {
    inner: InMemoryBlobStore,
}

#[async_trait]
impl BlobStore for PickyBlobStore {
    async fn put(
        &self,
        document: PendingDocument,
        progress: &mut ProgressSink,
    ) -> Result<DocumentRef, BlobError> {
        if document.name.contains("corrupt") {
            progress.report(10);
            return Err(BlobError::Rejected("checksum mismatch".to_string()));
        }
        self.inner.put(document, progress).await
    }

    async fn fetch(&self, key: &str) -> Result<Option<StoredBlob>, BlobError> {
        self.inner.fetch(key).await
    }
}

pub(super) type TestPortal = ApplicationPortal<CountingBackend, InMemoryBlobStore>;

pub(super) fn build_portal() -> (TestPortal, Arc<CountingBackend>) {
    build_portal_with(CountingBackend::default())
}

pub(super) fn build_portal_with(backend: CountingBackend) -> (TestPortal, Arc<CountingBackend>) {
    let backend = Arc::new(backend);
    let blobs = Arc::new(InMemoryBlobStore::new(portal_config().upload_chunk_bytes));
    let portal = ApplicationPortal::new(backend.clone(), blobs, &portal_config());
    (portal, backend)
}

pub(super) fn build_picky_portal(
) -> (ApplicationPortal<CountingBackend, PickyBlobStore>, Arc<CountingBackend>) {
    let backend = Arc::new(CountingBackend::default());
    let portal = ApplicationPortal::new(
        backend.clone(),
        Arc::new(PickyBlobStore::default()),
        &portal_config(),
    );
    (portal, backend)
}

pub(super) fn build_state(
    backend: CountingBackend,
) -> (PortalState<CountingBackend, InMemoryBlobStore>, Arc<CountingBackend>) {
    let (portal, backend) = build_portal_with(backend);
    let state = PortalState {
        portal: Arc::new(portal),
        sessions: Arc::new(SessionStore::with_idle_ttl(portal_config().session_idle_ttl)),
        identity: Arc::new(DevIdentityProvider),
    };
    (state, backend)
}

pub(super) fn build_router() -> (axum::Router, Arc<CountingBackend>) {
    let (state, backend) = build_state(CountingBackend::default());
    (portal_router(state), backend)
}

pub(super) async fn send(router: &axum::Router, request: Request<Body>) -> Response {
    router
        .clone()
        .oneshot(request)
        .await
        .expect("router dispatch")
}

pub(super) fn get(path: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(path);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("request")
}

pub(super) fn json_request(method: &str, path: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_vec(body).expect("serialize body")))
        .expect("request")
}

pub(super) async fn login(router: &axum::Router, principal: &str) -> String {
    let response = send(
        router,
        json_request("POST", "/login", None, &serde_json::json!({ "principal": principal })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    payload
        .get("token")
        .and_then(Value::as_str)
        .expect("token issued")
        .to_string()
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body");
    serde_json::from_slice(&body).expect("json")
}

pub(super) fn location(response: &Response) -> Option<&str> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
}
