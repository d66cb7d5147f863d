use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::blob::PendingDocument;
use crate::config::PortalConfig;
use super::domain::{ApplicantDetails, ServiceOption, UserProfile, SUBMITTED_STATUS};

/// Extensions the upload step accepts.
pub const ACCEPTED_EXTENSIONS: [&str; 6] = ["pdf", "jpg", "jpeg", "png", "doc", "docx"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormField {
    ApplicantName,
    FatherName,
    Address,
    ServiceOpted,
    Name,
    Email,
}

impl FormField {
    pub const fn key(self) -> &'static str {
        match self {
            FormField::ApplicantName => "applicant_name",
            FormField::FatherName => "father_name",
            FormField::Address => "address",
            FormField::ServiceOpted => "service_opted",
            FormField::Name => "name",
            FormField::Email => "email",
        }
    }
}

/// Per-field validation messages, reported back on the form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<FormField, String>);

impl FieldErrors {
    pub fn insert(&mut self, field: FormField, message: impl Into<String>) {
        self.0.insert(field, message.into());
    }

    pub fn get(&self, field: FormField) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn contains(&self, field: FormField) -> bool {
        self.0.contains_key(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    fn finish<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", field.key(), message)?;
            first = false;
        }
        Ok(())
    }
}

fn required(errors: &mut FieldErrors, field: FormField, raw: &str, message: &str) -> String {
    let value = raw.trim();
    if value.is_empty() {
        errors.insert(field, message);
    }
    value.to_string()
}

/// Raw applicant details as typed into the first step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailsForm {
    #[serde(default)]
    pub applicant_name: String,
    #[serde(default)]
    pub father_name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub service_opted: String,
}

impl DetailsForm {
    /// Trims every field and builds the submission payload, or reports every missing field.
    pub fn validate(&self) -> Result<ApplicantDetails, FieldErrors> {
        let mut errors = FieldErrors::default();

        let applicant_name = required(
            &mut errors,
            FormField::ApplicantName,
            &self.applicant_name,
            "Applicant name is required",
        );
        let father_name = required(
            &mut errors,
            FormField::FatherName,
            &self.father_name,
            "Father's name is required",
        );
        let address = required(
            &mut errors,
            FormField::Address,
            &self.address,
            "Address is required",
        );
        let service = ServiceOption::from_value(&self.service_opted);
        if service.is_none() {
            errors.insert(FormField::ServiceOpted, "Please select a service");
        }

        errors.finish(ApplicantDetails {
            status: SUBMITTED_STATUS.to_string(),
            applicant_name,
            father_name,
            address,
            service_opted: service.map(|option| option.value().to_string()).unwrap_or_default(),
            has_documents: false,
        })
    }
}

/// First-visit profile dialog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl ProfileForm {
    pub fn validate(&self) -> Result<UserProfile, FieldErrors> {
        let mut errors = FieldErrors::default();
        let name = required(&mut errors, FormField::Name, &self.name, "Name is required");

        let email = self
            .email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .map(str::to_string);
        if let Some(email) = &email {
            let valid = email
                .split_once('@')
                .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
            if !valid {
                errors.insert(FormField::Email, "Enter a valid email address");
            }
        }

        errors.finish(UserProfile { name, email })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadRejection {
    #[error("Please select at least one document to continue.")]
    Empty,
    #[error("{name}: unsupported file type (accepted: PDF, JPG, PNG, DOC, DOCX)")]
    UnsupportedType { name: String },
    #[error("{name}: file is empty")]
    EmptyFile { name: String },
    #[error("{name}: file exceeds the {limit} byte limit")]
    TooLarge { name: String, limit: usize },
    #[error("Please select at most {limit} documents per upload.")]
    TooManyFiles { limit: usize },
}

/// Per-request bounds on an upload selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_files: usize,
    pub max_document_bytes: usize,
}

impl UploadLimits {
    pub fn from_config(config: &PortalConfig) -> Self {
        Self {
            max_files: config.max_files_per_upload,
            max_document_bytes: config.max_document_bytes,
        }
    }
}

/// Files picked on the upload step. Uploading is only possible with at least one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSelection {
    files: Vec<PendingDocument>,
}

impl UploadSelection {
    pub fn new(files: Vec<PendingDocument>) -> Self {
        Self { files }
    }

    pub fn add(&mut self, file: PendingDocument) {
        self.files.push(file);
    }

    pub fn remove(&mut self, index: usize) -> Option<PendingDocument> {
        (index < self.files.len()).then(|| self.files.remove(index))
    }

    pub fn files(&self) -> &[PendingDocument] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn can_upload(&self) -> bool {
        !self.files.is_empty()
    }

    pub fn into_validated(
        self,
        limits: UploadLimits,
    ) -> Result<Vec<PendingDocument>, UploadRejection> {
        if self.files.is_empty() {
            return Err(UploadRejection::Empty);
        }
        if self.files.len() > limits.max_files {
            return Err(UploadRejection::TooManyFiles {
                limit: limits.max_files,
            });
        }

        for file in &self.files {
            let accepted = file
                .extension()
                .is_some_and(|ext| ACCEPTED_EXTENSIONS.contains(&ext.as_str()));
            if !accepted {
                return Err(UploadRejection::UnsupportedType {
                    name: file.name.clone(),
                });
            }
            if file.bytes.is_empty() {
                return Err(UploadRejection::EmptyFile {
                    name: file.name.clone(),
                });
            }
            if file.bytes.len() > limits.max_document_bytes {
                return Err(UploadRejection::TooLarge {
                    name: file.name.clone(),
                    limit: limits.max_document_bytes,
                });
            }
        }

        Ok(self.files)
    }
}
