use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::backend::{BackendError, RemoteService};
use super::blob::{BlobStore, PendingDocument};
use super::domain::{Identity, Principal, UserRole};
use super::forms::{DetailsForm, ProfileForm, UploadLimits, UploadSelection};
use super::guard::{decide_auth, AuthDecision, Navigation, Route, Step};
use super::service::{ApplicationPortal, PortalError};
use super::session::{AuthError, IdentityProvider, SessionStore, SessionToken};
use super::views::{ConfirmationView, DetailsView, EntryView, StatusView, UploadView};

const GENERIC_FAILURE: &str = "The request could not be completed. Please try again.";

/// Shared handler state: the portal facade plus the explicit session context.
pub struct PortalState<B, S> {
    pub portal: Arc<ApplicationPortal<B, S>>,
    pub sessions: Arc<SessionStore>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl<B, S> Clone for PortalState<B, S> {
    fn clone(&self) -> Self {
        Self {
            portal: self.portal.clone(),
            sessions: self.sessions.clone(),
            identity: self.identity.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub principal: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: SessionToken,
    pub principal: Principal,
    pub redirect: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    #[serde(default)]
    pub files: Vec<PendingDocument>,
}

#[derive(Debug, Deserialize)]
pub struct RoleAssignment {
    pub principal: Principal,
    pub role: UserRole,
}

/// Router builder exposing the wizard's navigation surface.
pub fn portal_router<B, S>(state: PortalState<B, S>) -> Router
where
    B: RemoteService + 'static,
    S: BlobStore + 'static,
{
    let body_limit = upload_body_limit(state.portal.upload_limits());

    Router::new()
        .route("/", get(entry_handler::<B, S>))
        .route("/session", post(open_session_handler::<B, S>))
        .route("/login", post(login_handler::<B, S>))
        .route("/logout", post(logout_handler::<B, S>))
        .route(
            "/details",
            get(details_page::<B, S>).post(submit_details_handler::<B, S>),
        )
        .route(
            "/upload",
            get(upload_page::<B, S>).post(upload_handler::<B, S>),
        )
        .route("/confirmation", get(confirmation_page::<B, S>))
        .route("/documents", delete(clear_documents_handler::<B, S>))
        .route(
            "/profile",
            get(profile_handler::<B, S>).put(save_profile_handler::<B, S>),
        )
        .route("/api/status", get(status_handler::<B, S>))
        .route("/blobs/:key", get(blob_handler::<B, S>))
        .route("/admin/applications", get(admin_applications_handler::<B, S>))
        .route(
            "/admin/applications/:principal",
            get(admin_application_handler::<B, S>),
        )
        .route("/admin/roles", post(assign_role_handler::<B, S>))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Upload bodies carry file bytes as JSON number arrays: up to four characters
/// (three digits and a comma) per byte, plus the file's name and content type.
pub(crate) fn upload_body_limit(limits: UploadLimits) -> usize {
    const FILE_ENVELOPE_BYTES: usize = 4 * 1024;
    limits
        .max_document_bytes
        .saturating_mul(4)
        .saturating_add(FILE_ENVELOPE_BYTES)
        .saturating_mul(limits.max_files)
}

pub(crate) fn session_token(headers: &HeaderMap) -> Option<SessionToken> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = raw.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| SessionToken(token.to_string()))
}

fn see_other(route: Route) -> Response {
    Redirect::to(route.path()).into_response()
}

fn waiting() -> Response {
    (StatusCode::ACCEPTED, Json(json!({ "status": "loading" }))).into_response()
}

fn unauthenticated() -> Response {
    let payload = json!({
        "error": "sign in to continue",
        "redirect": Route::Entry.path(),
    });
    (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
}

fn unavailable(message: &str) -> Response {
    let payload = json!({
        "error": "application status is unavailable",
        "detail": message,
    });
    (StatusCode::SERVICE_UNAVAILABLE, Json(payload)).into_response()
}

pub(crate) fn portal_error_response(err: PortalError) -> Response {
    match err {
        PortalError::Validation(fields) => {
            let payload = json!({
                "error": "Please correct the highlighted fields.",
                "fields": fields,
            });
            (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response()
        }
        PortalError::Upload(rejection) => {
            let payload = json!({ "error": rejection.to_string() });
            (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response()
        }
        PortalError::InFlight(_) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::CONFLICT, Json(payload)).into_response()
        }
        PortalError::Backend(BackendError::Unauthorized) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::FORBIDDEN, Json(payload)).into_response()
        }
        PortalError::Backend(_) | PortalError::Blob { .. } => {
            let payload = json!({
                "error": GENERIC_FAILURE,
                "detail": err.to_string(),
            });
            (StatusCode::BAD_GATEWAY, Json(payload)).into_response()
        }
    }
}

/// Resolves the caller or produces the gate's response (wait or sign-in prompt).
fn authenticated<B, S>(state: &PortalState<B, S>, headers: &HeaderMap) -> Result<Identity, Response> {
    let auth = state.sessions.state(session_token(headers).as_ref());
    match decide_auth(&auth) {
        AuthDecision::Proceed(identity) => Ok(identity.clone()),
        AuthDecision::Wait => Err(waiting()),
        AuthDecision::RedirectToEntry => Err(unauthenticated()),
    }
}

fn navigation_response(navigation: Navigation) -> Result<Step, Response> {
    match navigation {
        Navigation::Render(step) => Ok(step),
        Navigation::Redirect(route) => Err(see_other(route)),
        Navigation::ShowLogin => Err(see_other(Route::Entry)),
        Navigation::Wait => Err(waiting()),
        Navigation::Unavailable(message) => Err(unavailable(&message)),
    }
}

/// Runs the auth gate and step guard for `step`, returning the caller when it may render.
async fn guard_step<B, S>(
    state: &PortalState<B, S>,
    headers: &HeaderMap,
    step: Step,
) -> Result<Identity, Response>
where
    B: RemoteService + 'static,
    S: BlobStore + 'static,
{
    let auth = state.sessions.state(session_token(headers).as_ref());
    let navigation = state.portal.resolve(step.route(), &auth).await;
    navigation_response(navigation)?;
    auth.identity().cloned().ok_or_else(unauthenticated)
}

pub(crate) async fn entry_handler<B, S>(
    State(state): State<PortalState<B, S>>,
    headers: HeaderMap,
) -> Response
where
    B: RemoteService + 'static,
    S: BlobStore + 'static,
{
    let auth = state.sessions.state(session_token(&headers).as_ref());
    match state.portal.resolve(Route::Entry, &auth).await {
        Navigation::ShowLogin => (StatusCode::OK, Json(EntryView::login())).into_response(),
        Navigation::Redirect(route) => see_other(route),
        Navigation::Wait => waiting(),
        Navigation::Render(step) => see_other(step.route()),
        Navigation::Unavailable(message) => unavailable(&message),
    }
}

pub(crate) async fn open_session_handler<B, S>(State(state): State<PortalState<B, S>>) -> Response {
    let token = state.sessions.open();
    (StatusCode::CREATED, Json(json!({ "token": token }))).into_response()
}

pub(crate) async fn login_handler<B, S>(
    State(state): State<PortalState<B, S>>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Response
where
    B: RemoteService + 'static,
    S: BlobStore + 'static,
{
    let token = session_token(&headers);
    match state
        .sessions
        .login(token, state.identity.as_ref(), &request.principal)
        .await
    {
        Ok(login) => {
            if let Some(replaced) = &login.replaced {
                state.portal.end_session(replaced);
            }
            let body = LoginResponse {
                token: login.token,
                principal: login.identity.principal,
                redirect: Step::Details.route().path().to_string(),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err @ AuthError::Unavailable(_)) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::SERVICE_UNAVAILABLE, Json(payload)).into_response()
        }
        Err(err) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
        }
    }
}

pub(crate) async fn logout_handler<B, S>(
    State(state): State<PortalState<B, S>>,
    headers: HeaderMap,
) -> Response
where
    B: RemoteService + 'static,
    S: BlobStore + 'static,
{
    if let Some(token) = session_token(&headers) {
        if let Some(identity) = state.sessions.logout(&token) {
            state.portal.end_session(&identity);
            tracing::info!(principal = %identity.principal, "session closed");
        }
    }
    see_other(Route::Entry)
}

pub(crate) async fn details_page<B, S>(
    State(state): State<PortalState<B, S>>,
    headers: HeaderMap,
) -> Response
where
    B: RemoteService + 'static,
    S: BlobStore + 'static,
{
    let identity = match guard_step(&state, &headers, Step::Details).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    let status = match state.portal.status(&identity).await {
        Ok(status) => status,
        Err(err) => return unavailable(&err.to_string()),
    };
    let profile = state.portal.profile(&identity).await.ok();
    (StatusCode::OK, Json(DetailsView::new(&status, profile))).into_response()
}

pub(crate) async fn upload_page<B, S>(
    State(state): State<PortalState<B, S>>,
    headers: HeaderMap,
) -> Response
where
    B: RemoteService + 'static,
    S: BlobStore + 'static,
{
    let identity = match guard_step(&state, &headers, Step::Upload).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    match state.portal.status(&identity).await {
        Ok(status) => {
            let view = UploadView::new(
                &status,
                state.portal.max_document_bytes(),
                state.portal.public_base_url(),
            );
            (StatusCode::OK, Json(view)).into_response()
        }
        Err(err) => unavailable(&err.to_string()),
    }
}

pub(crate) async fn confirmation_page<B, S>(
    State(state): State<PortalState<B, S>>,
    headers: HeaderMap,
) -> Response
where
    B: RemoteService + 'static,
    S: BlobStore + 'static,
{
    let identity = match guard_step(&state, &headers, Step::Confirmation).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    match state.portal.status(&identity).await {
        Ok(status) => {
            let view = ConfirmationView::new(&status, state.portal.public_base_url());
            (StatusCode::OK, Json(view)).into_response()
        }
        Err(err) => unavailable(&err.to_string()),
    }
}

pub(crate) async fn submit_details_handler<B, S>(
    State(state): State<PortalState<B, S>>,
    headers: HeaderMap,
    Json(form): Json<DetailsForm>,
) -> Response
where
    B: RemoteService + 'static,
    S: BlobStore + 'static,
{
    let identity = match authenticated(&state, &headers) {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    match state.portal.submit_details(&identity, &form).await {
        Ok(_) => see_other(Step::Upload.route()),
        Err(err) => portal_error_response(err),
    }
}

pub(crate) async fn upload_handler<B, S>(
    State(state): State<PortalState<B, S>>,
    headers: HeaderMap,
    Json(request): Json<UploadRequest>,
) -> Response
where
    B: RemoteService + 'static,
    S: BlobStore + 'static,
{
    let identity = match guard_step(&state, &headers, Step::Upload).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    let selection = UploadSelection::new(request.files);
    match state.portal.upload_documents(&identity, selection).await {
        Ok(_) => see_other(Step::Confirmation.route()),
        Err(err) => portal_error_response(err),
    }
}

pub(crate) async fn clear_documents_handler<B, S>(
    State(state): State<PortalState<B, S>>,
    headers: HeaderMap,
) -> Response
where
    B: RemoteService + 'static,
    S: BlobStore + 'static,
{
    let identity = match authenticated(&state, &headers) {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    match state.portal.clear_documents(&identity).await {
        Ok(()) => see_other(Step::Upload.route()),
        Err(err) => portal_error_response(err),
    }
}

pub(crate) async fn profile_handler<B, S>(
    State(state): State<PortalState<B, S>>,
    headers: HeaderMap,
) -> Response
where
    B: RemoteService + 'static,
    S: BlobStore + 'static,
{
    let identity = match authenticated(&state, &headers) {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    match state.portal.profile(&identity).await {
        Ok(profile) => (StatusCode::OK, Json(profile)).into_response(),
        Err(err) => portal_error_response(err),
    }
}

pub(crate) async fn save_profile_handler<B, S>(
    State(state): State<PortalState<B, S>>,
    headers: HeaderMap,
    Json(form): Json<ProfileForm>,
) -> Response
where
    B: RemoteService + 'static,
    S: BlobStore + 'static,
{
    let identity = match authenticated(&state, &headers) {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    match state.portal.save_profile(&identity, &form).await {
        Ok(profile) => (StatusCode::OK, Json(profile)).into_response(),
        Err(err) => portal_error_response(err),
    }
}

pub(crate) async fn status_handler<B, S>(
    State(state): State<PortalState<B, S>>,
    headers: HeaderMap,
) -> Response
where
    B: RemoteService + 'static,
    S: BlobStore + 'static,
{
    let identity = match authenticated(&state, &headers) {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    match state.portal.status(&identity).await {
        Ok(status) => {
            let view = StatusView::new(&status, state.portal.public_base_url());
            (StatusCode::OK, Json(view)).into_response()
        }
        Err(err) => portal_error_response(err),
    }
}

pub(crate) async fn blob_handler<B, S>(
    State(state): State<PortalState<B, S>>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Response
where
    B: RemoteService + 'static,
    S: BlobStore + 'static,
{
    let identity = match authenticated(&state, &headers) {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    match state.portal.document(&identity, &key).await {
        Ok(Some(blob)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, blob.document.content_type)],
            blob.bytes,
        )
            .into_response(),
        Ok(None) => {
            let payload = json!({ "error": "document not found", "key": key });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
        Err(err) => portal_error_response(err),
    }
}

pub(crate) async fn admin_applications_handler<B, S>(
    State(state): State<PortalState<B, S>>,
    headers: HeaderMap,
) -> Response
where
    B: RemoteService + 'static,
    S: BlobStore + 'static,
{
    let identity = match authenticated(&state, &headers) {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    match state.portal.all_applications(&identity).await {
        Ok(applications) => (StatusCode::OK, Json(applications)).into_response(),
        Err(err) => portal_error_response(err),
    }
}

pub(crate) async fn admin_application_handler<B, S>(
    State(state): State<PortalState<B, S>>,
    headers: HeaderMap,
    Path(principal): Path<String>,
) -> Response
where
    B: RemoteService + 'static,
    S: BlobStore + 'static,
{
    let identity = match authenticated(&state, &headers) {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    match state
        .portal
        .application_of(&identity, &Principal(principal))
        .await
    {
        Ok(status) => {
            let view = StatusView::new(&status, state.portal.public_base_url());
            (StatusCode::OK, Json(view)).into_response()
        }
        Err(err) => portal_error_response(err),
    }
}

pub(crate) async fn assign_role_handler<B, S>(
    State(state): State<PortalState<B, S>>,
    headers: HeaderMap,
    Json(assignment): Json<RoleAssignment>,
) -> Response
where
    B: RemoteService + 'static,
    S: BlobStore + 'static,
{
    let identity = match authenticated(&state, &headers) {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    match state
        .portal
        .assign_role(&identity, &assignment.principal, assignment.role)
        .await
    {
        Ok(()) => {
            let payload = json!({
                "principal": assignment.principal,
                "role": assignment.role.label(),
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => portal_error_response(err),
    }
}
