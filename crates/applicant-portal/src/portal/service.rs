use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::backend::{BackendError, RemoteService};
use super::blob::{spawn_upload, BlobError, BlobStore, ProgressEvents, StoredBlob, UploadTask};
use super::cache::StatusCache;
use super::domain::{
    ApplicantDetails, ApplicationStatus, DocumentRef, Identity, Principal, UserProfile, UserRole,
};
use super::forms::{
    DetailsForm, FieldErrors, ProfileForm, UploadLimits, UploadRejection, UploadSelection,
};
use super::guard::{navigate, Navigation, Route, StatusState};
use super::session::AuthState;
use crate::config::PortalConfig;

/// Remote operations that change state and therefore must not overlap per principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    SubmitDetails,
    UploadDocuments,
    ClearDocuments,
    SaveProfile,
}

impl MutationKind {
    pub const fn label(self) -> &'static str {
        match self {
            MutationKind::SubmitDetails => "details submission",
            MutationKind::UploadDocuments => "document upload",
            MutationKind::ClearDocuments => "document removal",
            MutationKind::SaveProfile => "profile update",
        }
    }
}

type InFlightSet = Arc<Mutex<HashSet<(Principal, MutationKind)>>>;

/// Held while a mutation is outstanding; releases the slot on drop.
#[derive(Debug)]
pub struct MutationPermit {
    registry: InFlightSet,
    principal: Principal,
    kind: MutationKind,
}

impl Drop for MutationPermit {
    fn drop(&mut self) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(self.principal.clone(), self.kind));
    }
}

/// Concurrent per-file uploads awaiting the aggregate remote call.
#[derive(Debug)]
pub struct UploadBatch {
    tasks: Vec<UploadTask>,
    permit: MutationPermit,
}

impl UploadBatch {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Hands out each file's progress sequence once, tagged with its position and name.
    pub fn subscribe(&mut self) -> Vec<(usize, String, ProgressEvents)> {
        self.tasks
            .iter_mut()
            .filter_map(|task| {
                let index = task.index;
                let name = task.name.clone();
                task.subscribe().map(|events| (index, name, events))
            })
            .collect()
    }
}

/// Profile lookup for the first-visit setup dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileState {
    pub profile: Option<UserProfile>,
    pub needs_setup: bool,
}

/// Error raised by the portal facade.
#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("form has invalid fields: {0}")]
    Validation(FieldErrors),
    #[error(transparent)]
    Upload(#[from] UploadRejection),
    #[error("a {} is already in progress", .0.label())]
    InFlight(MutationKind),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("{name}: {source}")]
    Blob {
        name: String,
        #[source]
        source: BlobError,
    },
}

/// Facade composing the remote service, blob store, and status cache behind the wizard.
pub struct ApplicationPortal<B, S> {
    backend: Arc<B>,
    blobs: Arc<S>,
    cache: StatusCache,
    in_flight: InFlightSet,
    limits: UploadLimits,
    public_base_url: String,
}

impl<B, S> ApplicationPortal<B, S>
where
    B: RemoteService + 'static,
    S: BlobStore + 'static,
{
    pub fn new(backend: Arc<B>, blobs: Arc<S>, config: &PortalConfig) -> Self {
        Self {
            backend,
            blobs,
            cache: StatusCache::new(config.status_ttl),
            in_flight: Arc::default(),
            limits: UploadLimits::from_config(config),
            public_base_url: config.public_base_url.clone(),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn blobs(&self) -> &Arc<S> {
        &self.blobs
    }

    pub fn cache(&self) -> &StatusCache {
        &self.cache
    }

    pub fn public_base_url(&self) -> &str {
        &self.public_base_url
    }

    pub fn max_document_bytes(&self) -> usize {
        self.limits.max_document_bytes
    }

    pub fn upload_limits(&self) -> UploadLimits {
        self.limits
    }

    /// Current application status, served from the cache while fresh.
    pub async fn status(&self, identity: &Identity) -> Result<ApplicationStatus, PortalError> {
        let principal = &identity.principal;
        if let Some(status) = self.cache.get(principal) {
            return Ok(status);
        }

        let generation = self.cache.generation(principal);
        let status = self
            .backend
            .get_application_status(principal)
            .await
            .map_err(|err| {
                warn!(%principal, error = %err, "application status fetch failed");
                err
            })?;
        self.cache.put_if_current(principal, generation, status.clone());
        Ok(status)
    }

    pub async fn status_state(&self, identity: &Identity) -> StatusState {
        match self.status(identity).await {
            Ok(status) => StatusState::Ready(status),
            Err(err) => StatusState::Failed(err.to_string()),
        }
    }

    /// Evaluates a navigation, fetching status only when a step guard needs it.
    pub async fn resolve(&self, route: Route, auth: &AuthState) -> Navigation {
        let status = match (route, auth) {
            (Route::Step(_), AuthState::Authenticated(identity)) => {
                self.status_state(identity).await
            }
            _ => StatusState::Loading,
        };
        navigate(route, auth, &status)
    }

    pub async fn submit_details(
        &self,
        identity: &Identity,
        form: &DetailsForm,
    ) -> Result<ApplicantDetails, PortalError> {
        let details = form.validate().map_err(PortalError::Validation)?;
        let _permit = self.acquire(&identity.principal, MutationKind::SubmitDetails)?;

        let principal = &identity.principal;
        self.backend
            .submit_applicant_details(principal, details.clone())
            .await
            .map_err(|err| {
                warn!(%principal, error = %err, "applicant details rejected");
                err
            })?;

        self.cache.invalidate(principal);
        info!(%principal, service = %details.service_opted, "applicant details submitted");
        Ok(details)
    }

    /// Validates the selection and starts one upload task per file.
    pub fn start_upload(
        &self,
        identity: &Identity,
        selection: UploadSelection,
    ) -> Result<UploadBatch, PortalError> {
        let files = selection.into_validated(self.limits)?;
        let permit = self.acquire(&identity.principal, MutationKind::UploadDocuments)?;

        let tasks = files
            .into_iter()
            .enumerate()
            .map(|(index, file)| spawn_upload(self.blobs.clone(), index, file))
            .collect();

        Ok(UploadBatch { tasks, permit })
    }

    /// Joins every file upload, then records the documents with the remote service.
    pub async fn complete_upload(
        &self,
        batch: UploadBatch,
    ) -> Result<Vec<DocumentRef>, PortalError> {
        let UploadBatch { tasks, permit } = batch;
        let principal = permit.principal.clone();

        let mut documents = Vec::with_capacity(tasks.len());
        let mut first_failure = None;
        for task in tasks {
            let name = task.name.clone();
            match task.join().await {
                Ok(document) => documents.push(document),
                Err(source) => {
                    warn!(%principal, file = %name, error = %source, "document upload failed");
                    first_failure.get_or_insert(PortalError::Blob { name, source });
                }
            }
        }
        if let Some(err) = first_failure {
            return Err(err);
        }

        self.backend
            .upload_application_documents(&principal, documents.clone())
            .await
            .map_err(|err| {
                warn!(%principal, error = %err, "document batch rejected");
                err
            })?;

        self.cache.invalidate(&principal);
        info!(%principal, count = documents.len(), "documents uploaded");
        drop(permit);
        Ok(documents)
    }

    pub async fn upload_documents(
        &self,
        identity: &Identity,
        selection: UploadSelection,
    ) -> Result<Vec<DocumentRef>, PortalError> {
        let batch = self.start_upload(identity, selection)?;
        self.complete_upload(batch).await
    }

    pub async fn clear_documents(&self, identity: &Identity) -> Result<(), PortalError> {
        let principal = &identity.principal;
        let _permit = self.acquire(principal, MutationKind::ClearDocuments)?;
        self.backend.clear_documents(principal).await?;
        self.cache.invalidate(principal);
        info!(%principal, "documents cleared");
        Ok(())
    }

    pub async fn profile(&self, identity: &Identity) -> Result<ProfileState, PortalError> {
        let profile = self
            .backend
            .get_caller_user_profile(&identity.principal)
            .await?;
        Ok(ProfileState {
            needs_setup: profile.is_none(),
            profile,
        })
    }

    pub async fn save_profile(
        &self,
        identity: &Identity,
        form: &ProfileForm,
    ) -> Result<UserProfile, PortalError> {
        let profile = form.validate().map_err(PortalError::Validation)?;
        let principal = &identity.principal;
        let _permit = self.acquire(principal, MutationKind::SaveProfile)?;
        self.backend
            .save_caller_user_profile(principal, profile.clone())
            .await?;
        info!(%principal, "profile saved");
        Ok(profile)
    }

    pub async fn role(&self, identity: &Identity) -> Result<UserRole, PortalError> {
        Ok(self
            .backend
            .get_caller_user_role(&identity.principal)
            .await?)
    }

    pub async fn is_admin(&self, identity: &Identity) -> Result<bool, PortalError> {
        Ok(self.backend.is_caller_admin(&identity.principal).await?)
    }

    pub async fn all_applications(
        &self,
        identity: &Identity,
    ) -> Result<Vec<ApplicantDetails>, PortalError> {
        Ok(self
            .backend
            .get_all_applications(&identity.principal)
            .await?)
    }

    pub async fn application_of(
        &self,
        identity: &Identity,
        user: &Principal,
    ) -> Result<ApplicationStatus, PortalError> {
        Ok(self
            .backend
            .get_application_by_user(&identity.principal, user)
            .await?)
    }

    pub async fn assign_role(
        &self,
        identity: &Identity,
        user: &Principal,
        role: UserRole,
    ) -> Result<(), PortalError> {
        self.backend
            .assign_user_role(&identity.principal, user, role)
            .await?;
        info!(admin = %identity.principal, %user, role = role.label(), "role assigned");
        Ok(())
    }

    /// Reads a stored document on behalf of its owner or an administrator.
    /// Keys outside the caller's application read as absent.
    pub async fn document(
        &self,
        identity: &Identity,
        key: &str,
    ) -> Result<Option<StoredBlob>, PortalError> {
        let owned = self
            .status(identity)
            .await?
            .documents
            .iter()
            .any(|document| document.key == key);
        if !owned && !self.is_admin(identity).await? {
            debug!(principal = %identity.principal, key, "document outside caller's application");
            return Ok(None);
        }

        self.blobs
            .fetch(key)
            .await
            .map_err(|source| PortalError::Blob {
                name: key.to_string(),
                source,
            })
    }

    /// Session teardown: drop every cached read for the principal.
    pub fn end_session(&self, identity: &Identity) {
        self.cache.invalidate(&identity.principal);
    }

    fn acquire(
        &self,
        principal: &Principal,
        kind: MutationKind,
    ) -> Result<MutationPermit, PortalError> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert((principal.clone(), kind)) {
            return Err(PortalError::InFlight(kind));
        }
        Ok(MutationPermit {
            registry: self.in_flight.clone(),
            principal: principal.clone(),
            kind,
        })
    }
}
