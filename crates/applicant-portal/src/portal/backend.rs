use async_trait::async_trait;

use super::domain::{
    ApplicantDetails, ApplicationStatus, DocumentRef, Principal, UserProfile, UserRole,
};

/// Remote actor boundary owning persistence, business rules, and roles.
///
/// Every call carries the caller so implementations can scope data and enforce
/// access control the way the actor does for its authenticated message sender.
#[async_trait]
pub trait RemoteService: Send + Sync {
    async fn get_application_status(
        &self,
        caller: &Principal,
    ) -> Result<ApplicationStatus, BackendError>;

    async fn submit_applicant_details(
        &self,
        caller: &Principal,
        details: ApplicantDetails,
    ) -> Result<(), BackendError>;

    async fn upload_application_documents(
        &self,
        caller: &Principal,
        files: Vec<DocumentRef>,
    ) -> Result<(), BackendError>;

    async fn clear_documents(&self, caller: &Principal) -> Result<(), BackendError>;

    async fn get_caller_user_profile(
        &self,
        caller: &Principal,
    ) -> Result<Option<UserProfile>, BackendError>;

    async fn save_caller_user_profile(
        &self,
        caller: &Principal,
        profile: UserProfile,
    ) -> Result<(), BackendError>;

    async fn get_caller_user_role(&self, caller: &Principal) -> Result<UserRole, BackendError>;

    async fn is_caller_admin(&self, caller: &Principal) -> Result<bool, BackendError> {
        Ok(self.get_caller_user_role(caller).await? == UserRole::Admin)
    }

    async fn assign_user_role(
        &self,
        caller: &Principal,
        user: &Principal,
        role: UserRole,
    ) -> Result<(), BackendError>;

    async fn get_all_applications(
        &self,
        caller: &Principal,
    ) -> Result<Vec<ApplicantDetails>, BackendError>;

    async fn get_application_by_user(
        &self,
        caller: &Principal,
        user: &Principal,
    ) -> Result<ApplicationStatus, BackendError>;
}

/// Failure reported by the remote service. Callers do not distinguish transport from rule errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("caller is not authorized for this operation")]
    Unauthorized,
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("remote service unavailable: {0}")]
    Unavailable(String),
}
