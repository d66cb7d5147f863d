use super::common::{details_form, pdf};
use crate::portal::blob::PendingDocument;
use crate::portal::forms::{
    DetailsForm, FormField, ProfileForm, UploadLimits, UploadRejection, UploadSelection,
};

fn limits(max_document_bytes: usize) -> UploadLimits {
    UploadLimits {
        max_files: 3,
        max_document_bytes,
    }
}

#[test]
fn details_are_trimmed_and_marked_submitted() {
    let details = details_form().validate().expect("valid form");
    assert_eq!(details.applicant_name, "Asha Verma");
    assert_eq!(details.status, "submitted");
    assert_eq!(details.service_opted, "passport");
    assert!(!details.has_documents);
}

#[test]
fn blank_details_report_every_field() {
    let errors = DetailsForm {
        applicant_name: "   ".to_string(),
        ..DetailsForm::default()
    }
    .validate()
    .expect_err("blank form is rejected");

    assert_eq!(errors.len(), 4);
    assert_eq!(
        errors.get(FormField::ApplicantName),
        Some("Applicant name is required")
    );
    assert_eq!(errors.get(FormField::FatherName), Some("Father's name is required"));
    assert_eq!(errors.get(FormField::Address), Some("Address is required"));
    assert_eq!(errors.get(FormField::ServiceOpted), Some("Please select a service"));
}

#[test]
fn unknown_service_is_rejected() {
    let errors = DetailsForm {
        service_opted: "time-travel".to_string(),
        ..details_form()
    }
    .validate()
    .expect_err("unknown service");
    assert_eq!(errors.len(), 1);
    assert!(errors.contains(FormField::ServiceOpted));
    assert_eq!(errors.to_string(), "service_opted: Please select a service");
}

#[test]
fn profile_requires_name_and_plausible_email() {
    let errors = ProfileForm {
        name: String::new(),
        email: Some("not-an-email".to_string()),
    }
    .validate()
    .expect_err("invalid profile");
    assert_eq!(errors.get(FormField::Name), Some("Name is required"));
    assert_eq!(errors.get(FormField::Email), Some("Enter a valid email address"));

    let profile = ProfileForm {
        name: " Asha ".to_string(),
        email: Some("  ".to_string()),
    }
    .validate()
    .expect("blank email is optional");
    assert_eq!(profile.name, "Asha");
    assert_eq!(profile.email, None);
}

#[test]
fn empty_selection_cannot_upload() {
    let selection = UploadSelection::default();
    assert!(!selection.can_upload());
    assert_eq!(
        selection.into_validated(limits(1024)),
        Err(UploadRejection::Empty)
    );
    assert_eq!(
        UploadRejection::Empty.to_string(),
        "Please select at least one document to continue."
    );
}

#[test]
fn selection_edits_before_upload() {
    let mut selection = UploadSelection::default();
    selection.add(pdf("id.pdf", 4));
    selection.add(pdf("photo.png", 4));
    assert_eq!(selection.remove(0).map(|file| file.name), Some("id.pdf".to_string()));
    assert_eq!(selection.remove(5), None);
    assert_eq!(selection.len(), 1);
    assert_eq!(selection.files()[0].name, "photo.png");
}

#[test]
fn selection_rejects_bad_files() {
    let unsupported = UploadSelection::new(vec![pdf("id.pdf", 4), pdf("payload.exe", 4)]);
    assert_eq!(
        unsupported.into_validated(limits(1024)),
        Err(UploadRejection::UnsupportedType {
            name: "payload.exe".to_string()
        })
    );

    let empty = UploadSelection::new(vec![PendingDocument::new("blank.pdf", Vec::new())]);
    assert_eq!(
        empty.into_validated(limits(1024)),
        Err(UploadRejection::EmptyFile {
            name: "blank.pdf".to_string()
        })
    );

    let large = UploadSelection::new(vec![pdf("scan.PDF", 2048)]);
    assert_eq!(
        large.into_validated(limits(1024)),
        Err(UploadRejection::TooLarge {
            name: "scan.PDF".to_string(),
            limit: 1024
        })
    );
}

#[test]
fn selection_is_capped_per_upload() {
    let files = (0..4).map(|index| pdf(&format!("page-{index}.pdf"), 4)).collect();
    let rejection = UploadSelection::new(files)
        .into_validated(limits(1024))
        .expect_err("four files exceed the cap");
    assert_eq!(rejection, UploadRejection::TooManyFiles { limit: 3 });
    assert_eq!(
        rejection.to_string(),
        "Please select at most 3 documents per upload."
    );

    let files = (0..3).map(|index| pdf(&format!("page-{index}.pdf"), 4)).collect();
    assert_eq!(
        UploadSelection::new(files)
            .into_validated(limits(1024))
            .map(|files| files.len()),
        Ok(3)
    );
}
