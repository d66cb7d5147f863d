use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authenticated principal as issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Principal(pub String);

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session principal plus the moment the provider vouched for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub principal: Principal,
    pub authenticated_at: DateTime<Utc>,
}

impl Identity {
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            authenticated_at: Utc::now(),
        }
    }
}

/// Status tag written on every fresh submission.
pub const SUBMITTED_STATUS: &str = "submitted";

/// Personal and service information captured in the first wizard step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicantDetails {
    pub status: String,
    pub applicant_name: String,
    pub father_name: String,
    pub address: String,
    pub service_opted: String,
    pub has_documents: bool,
}

/// Opaque handle to an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    pub key: String,
    pub name: String,
    pub content_type: String,
    pub size_bytes: u64,
}

impl DocumentRef {
    pub fn direct_url(&self, base_url: &str) -> String {
        format!("{}/blobs/{}", base_url.trim_end_matches('/'), self.key)
    }
}

/// Snapshot of an applicant's progress as owned by the remote service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applicant_details: Option<ApplicantDetails>,
    #[serde(default)]
    pub documents: Vec<DocumentRef>,
}

impl ApplicationStatus {
    pub fn has_details(&self) -> bool {
        self.applicant_details.is_some()
    }

    pub fn has_documents(&self) -> bool {
        !self.documents.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    User,
    Guest,
}

impl UserRole {
    pub const fn label(self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::User => "user",
            UserRole::Guest => "guest",
        }
    }
}

/// Services an applicant can opt for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceOption {
    Passport,
    Visa,
    License,
    Certificate,
    Registration,
    Other,
}

impl ServiceOption {
    pub const ALL: [ServiceOption; 6] = [
        ServiceOption::Passport,
        ServiceOption::Visa,
        ServiceOption::License,
        ServiceOption::Certificate,
        ServiceOption::Registration,
        ServiceOption::Other,
    ];

    pub const fn value(self) -> &'static str {
        match self {
            ServiceOption::Passport => "passport",
            ServiceOption::Visa => "visa",
            ServiceOption::License => "license",
            ServiceOption::Certificate => "certificate",
            ServiceOption::Registration => "registration",
            ServiceOption::Other => "other",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            ServiceOption::Passport => "Passport Services",
            ServiceOption::Visa => "Visa Application",
            ServiceOption::License => "License Renewal",
            ServiceOption::Certificate => "Certificate Verification",
            ServiceOption::Registration => "Business Registration",
            ServiceOption::Other => "Other Services",
        }
    }

    pub fn from_value(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|option| option.value().eq_ignore_ascii_case(raw))
    }
}
