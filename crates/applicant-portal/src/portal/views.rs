use serde::Serialize;

use super::domain::{ApplicantDetails, ApplicationStatus, DocumentRef, ServiceOption};
use super::forms::ACCEPTED_EXTENSIONS;
use super::guard::{next_step, Step};
use super::service::ProfileState;

#[derive(Debug, Clone, Serialize)]
pub struct StepSummary {
    pub step: Step,
    pub number: u8,
    pub title: &'static str,
    pub path: &'static str,
}

impl From<Step> for StepSummary {
    fn from(step: Step) -> Self {
        Self {
            step,
            number: step.number(),
            title: step.title(),
            path: step.route().path(),
        }
    }
}

/// Login view shown on the entry route.
#[derive(Debug, Clone, Serialize)]
pub struct EntryView {
    pub view: &'static str,
    pub title: &'static str,
    pub steps: Vec<StepSummary>,
}

impl EntryView {
    pub fn login() -> Self {
        Self {
            view: "login",
            title: "Application Portal",
            steps: Step::ALL.into_iter().map(StepSummary::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentView {
    pub key: String,
    pub name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub url: String,
}

impl DocumentView {
    pub fn new(document: &DocumentRef, base_url: &str) -> Self {
        Self {
            key: document.key.clone(),
            name: document.name.clone(),
            content_type: document.content_type.clone(),
            size_bytes: document.size_bytes,
            url: document.direct_url(base_url),
        }
    }

    fn list(documents: &[DocumentRef], base_url: &str) -> Vec<Self> {
        documents
            .iter()
            .map(|document| Self::new(document, base_url))
            .collect()
    }
}

/// Status query projection consumed by clients polling progress.
#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub has_details: bool,
    pub has_documents: bool,
    pub next_step: Step,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applicant_details: Option<ApplicantDetails>,
    pub documents: Vec<DocumentView>,
}

impl StatusView {
    pub fn new(status: &ApplicationStatus, base_url: &str) -> Self {
        Self {
            has_details: status.has_details(),
            has_documents: status.has_documents(),
            next_step: next_step(status),
            applicant_details: status.applicant_details.clone(),
            documents: DocumentView::list(&status.documents, base_url),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceOptionView {
    pub value: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetailsView {
    pub view: Step,
    pub caption: String,
    pub service_options: Vec<ServiceOptionView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted: Option<ApplicantDetails>,
}

impl DetailsView {
    pub fn new(status: &ApplicationStatus, profile: Option<ProfileState>) -> Self {
        Self {
            view: Step::Details,
            caption: Step::Details.caption(),
            service_options: ServiceOption::ALL
                .into_iter()
                .map(|option| ServiceOptionView {
                    value: option.value(),
                    label: option.label(),
                })
                .collect(),
            profile,
            submitted: status.applicant_details.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadView {
    pub view: Step,
    pub caption: String,
    pub accepted_extensions: &'static [&'static str],
    pub max_document_bytes: usize,
    pub documents: Vec<DocumentView>,
}

impl UploadView {
    pub fn new(status: &ApplicationStatus, max_document_bytes: usize, base_url: &str) -> Self {
        Self {
            view: Step::Upload,
            caption: Step::Upload.caption(),
            accepted_extensions: &ACCEPTED_EXTENSIONS,
            max_document_bytes,
            documents: DocumentView::list(&status.documents, base_url),
        }
    }
}

const NEXT_STEPS: [&str; 3] = [
    "Your documents have been forwarded to the admin team for review.",
    "A confirmation has been sent to the admin team.",
    "The admin team will review your application and contact you with updates.",
];

#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationView {
    pub view: Step,
    pub caption: String,
    pub applicant_details: Option<ApplicantDetails>,
    pub documents: Vec<DocumentView>,
    pub next_steps: [&'static str; 3],
}

impl ConfirmationView {
    pub fn new(status: &ApplicationStatus, base_url: &str) -> Self {
        Self {
            view: Step::Confirmation,
            caption: Step::Confirmation.caption(),
            applicant_details: status.applicant_details.clone(),
            documents: DocumentView::list(&status.documents, base_url),
            next_steps: NEXT_STEPS,
        }
    }
}
