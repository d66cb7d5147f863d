use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::backend::{BackendError, RemoteService};
use super::domain::{
    ApplicantDetails, ApplicationStatus, DocumentRef, Principal, UserProfile, UserRole,
};

#[derive(Debug, Default)]
struct PortalLedger {
    applications: BTreeMap<Principal, ApplicationStatus>,
    profiles: BTreeMap<Principal, UserProfile>,
    roles: BTreeMap<Principal, UserRole>,
}

impl PortalLedger {
    fn role_of(&self, principal: &Principal) -> UserRole {
        self.roles.get(principal).copied().unwrap_or(UserRole::User)
    }

    fn require_admin(&self, caller: &Principal) -> Result<(), BackendError> {
        if self.role_of(caller) == UserRole::Admin {
            Ok(())
        } else {
            Err(BackendError::Unauthorized)
        }
    }
}

/// Process-local stand-in for the remote actor, used by the dev server, demo, and tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPortalBackend {
    ledger: Arc<Mutex<PortalLedger>>,
}

impl InMemoryPortalBackend {
    pub fn with_admins<I>(admins: I) -> Self
    where
        I: IntoIterator<Item = Principal>,
    {
        let backend = Self::default();
        {
            let mut ledger = backend.lock();
            for admin in admins {
                ledger.roles.insert(admin, UserRole::Admin);
            }
        }
        backend
    }

    fn lock(&self) -> MutexGuard<'_, PortalLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RemoteService for InMemoryPortalBackend {
    async fn get_application_status(
        &self,
        caller: &Principal,
    ) -> Result<ApplicationStatus, BackendError> {
        Ok(self
            .lock()
            .applications
            .get(caller)
            .cloned()
            .unwrap_or_default())
    }

    async fn submit_applicant_details(
        &self,
        caller: &Principal,
        details: ApplicantDetails,
    ) -> Result<(), BackendError> {
        let mut ledger = self.lock();
        let application = ledger.applications.entry(caller.clone()).or_default();
        if application.applicant_details.is_some() {
            return Err(BackendError::Rejected(
                "applicant details already submitted".to_string(),
            ));
        }

        let has_documents = application.has_documents();
        application.applicant_details = Some(ApplicantDetails {
            has_documents,
            ..details
        });
        Ok(())
    }

    async fn upload_application_documents(
        &self,
        caller: &Principal,
        files: Vec<DocumentRef>,
    ) -> Result<(), BackendError> {
        if files.is_empty() {
            return Err(BackendError::Rejected("no documents supplied".to_string()));
        }

        let mut ledger = self.lock();
        let application = ledger
            .applications
            .get_mut(caller)
            .filter(|application| application.has_details())
            .ok_or_else(|| {
                BackendError::Rejected(
                    "submit applicant details before uploading documents".to_string(),
                )
            })?;

        application.documents.extend(files);
        if let Some(details) = application.applicant_details.as_mut() {
            details.has_documents = true;
        }
        Ok(())
    }

    async fn clear_documents(&self, caller: &Principal) -> Result<(), BackendError> {
        let mut ledger = self.lock();
        if let Some(application) = ledger.applications.get_mut(caller) {
            application.documents.clear();
            if let Some(details) = application.applicant_details.as_mut() {
                details.has_documents = false;
            }
        }
        Ok(())
    }

    async fn get_caller_user_profile(
        &self,
        caller: &Principal,
    ) -> Result<Option<UserProfile>, BackendError> {
        Ok(self.lock().profiles.get(caller).cloned())
    }

    async fn save_caller_user_profile(
        &self,
        caller: &Principal,
        profile: UserProfile,
    ) -> Result<(), BackendError> {
        self.lock().profiles.insert(caller.clone(), profile);
        Ok(())
    }

    async fn get_caller_user_role(&self, caller: &Principal) -> Result<UserRole, BackendError> {
        Ok(self.lock().role_of(caller))
    }

    async fn assign_user_role(
        &self,
        caller: &Principal,
        user: &Principal,
        role: UserRole,
    ) -> Result<(), BackendError> {
        let mut ledger = self.lock();
        ledger.require_admin(caller)?;
        ledger.roles.insert(user.clone(), role);
        Ok(())
    }

    async fn get_all_applications(
        &self,
        caller: &Principal,
    ) -> Result<Vec<ApplicantDetails>, BackendError> {
        let ledger = self.lock();
        ledger.require_admin(caller)?;
        Ok(ledger
            .applications
            .values()
            .filter_map(|application| application.applicant_details.clone())
            .collect())
    }

    async fn get_application_by_user(
        &self,
        caller: &Principal,
        user: &Principal,
    ) -> Result<ApplicationStatus, BackendError> {
        let ledger = self.lock();
        ledger.require_admin(caller)?;
        Ok(ledger.applications.get(user).cloned().unwrap_or_default())
    }
}
