//! Applicant submission wizard: details, document upload, confirmation.
//!
//! The step guard in [`guard`] is the single authority on which step a caller may see; the
//! [`ApplicationPortal`] facade wraps the remote service and blob store, and the router exposes
//! both as HTTP routes.

pub mod backend;
pub mod blob;
pub mod cache;
pub mod domain;
pub mod forms;
pub mod guard;
pub mod memory;
pub mod router;
pub mod service;
pub mod session;
pub mod views;

#[cfg(test)]
mod tests;

pub use backend::{BackendError, RemoteService};
pub use blob::{
    BlobError, BlobStore, InMemoryBlobStore, PendingDocument, ProgressEvents, ProgressSink,
    StoredBlob, UploadEvent,
};
pub use cache::{StatusCache, StatusGeneration};
pub use domain::{
    ApplicantDetails, ApplicationStatus, DocumentRef, Identity, Principal, ServiceOption,
    UserProfile, UserRole,
};
pub use forms::{
    DetailsForm, FieldErrors, FormField, ProfileForm, UploadLimits, UploadRejection,
    UploadSelection,
};
pub use guard::{
    decide_auth, decide_entry, decide_route, navigate, next_step, AuthDecision, EntryDecision,
    GuardDecision, Navigation, Route, StatusState, Step,
};
pub use memory::InMemoryPortalBackend;
pub use router::{portal_router, PortalState};
pub use service::{ApplicationPortal, MutationKind, PortalError, ProfileState, UploadBatch};
pub use session::{
    AuthError, AuthState, DevIdentityProvider, IdentityProvider, SessionLogin, SessionStore,
    SessionToken,
};
