use crate::infra::local_portal;
use applicant_portal::config::PortalConfig;
use applicant_portal::error::AppError;
use applicant_portal::portal::{
    navigate, next_step, ApplicantDetails, ApplicationStatus, AuthState, DetailsForm,
    DevIdentityProvider, DocumentRef, Identity, Navigation, PendingDocument, Principal,
    SessionStore, StatusState, Step, UploadEvent, UploadSelection,
};
use clap::{Args, ValueEnum};
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Document to upload (repeatable). Synthetic files are used when omitted.
    #[arg(long = "document")]
    pub(crate) documents: Vec<PathBuf>,
    /// Principal to sign in as
    #[arg(long, default_value = "demo-applicant")]
    pub(crate) principal: String,
    /// Service value submitted with the applicant details
    #[arg(long, default_value = "passport")]
    pub(crate) service: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum StepArg {
    Details,
    Upload,
    Confirmation,
}

impl From<StepArg> for Step {
    fn from(value: StepArg) -> Self {
        match value {
            StepArg::Details => Step::Details,
            StepArg::Upload => Step::Upload,
            StepArg::Confirmation => Step::Confirmation,
        }
    }
}

#[derive(Args, Debug)]
pub(crate) struct GuardArgs {
    /// Step the applicant is navigating to
    #[arg(long, value_enum)]
    pub(crate) step: StepArg,
    /// Applicant details have been submitted
    #[arg(long)]
    pub(crate) has_details: bool,
    /// Number of uploaded documents
    #[arg(long, default_value_t = 0)]
    pub(crate) documents: usize,
    /// Treat the status query as still in flight
    #[arg(long)]
    pub(crate) loading: bool,
    /// Treat the status query as failed
    #[arg(long)]
    pub(crate) failed: bool,
}

pub(crate) fn run_guard(args: GuardArgs) -> Result<(), AppError> {
    let step = Step::from(args.step);
    let status = hypothetical_status(args.has_details, args.documents);
    let state = if args.failed {
        StatusState::Failed("status query failed".to_string())
    } else if args.loading {
        StatusState::Loading
    } else {
        StatusState::Ready(status.clone())
    };

    let auth = AuthState::Authenticated(Identity::new(Principal("cli".to_string())));
    let navigation = navigate(step.route(), &auth, &state);

    println!("{}", step.caption());
    println!(
        "- details submitted: {} | documents: {}",
        yes_no(args.has_details),
        args.documents
    );
    println!("- decision: {}", describe(&navigation));
    if matches!(state, StatusState::Ready(_)) {
        println!("- furthest reachable step: {}", next_step(&status).title());
    }
    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        documents,
        principal,
        service,
    } = args;

    let config = PortalConfig::default();
    let portal = local_portal(&config);
    let sessions = SessionStore::with_idle_ttl(config.session_idle_ttl);

    println!("Applicant portal demo");
    let token = sessions.open();
    let identity = sessions
        .login(Some(token.clone()), &DevIdentityProvider, &principal)
        .await?
        .identity;
    let auth = sessions.state(Some(&token));
    println!("Signed in as {}", identity.principal);

    print_guard(&portal, &auth, "Before submitting details").await;

    let form = DetailsForm {
        applicant_name: "Demo Applicant".to_string(),
        father_name: "Demo Parent".to_string(),
        address: "1 Example Street".to_string(),
        service_opted: service,
    };
    let details = portal.submit_details(&identity, &form).await?;
    println!(
        "\nSubmitted details for {} ({})",
        details.applicant_name, details.service_opted
    );
    print_guard(&portal, &auth, "After submitting details").await;

    let files = if documents.is_empty() {
        synthetic_documents()
    } else {
        documents
            .iter()
            .map(|path| read_document(path))
            .collect::<Result<Vec<_>, _>>()?
    };

    println!("\nUploading {} document(s)", files.len());
    let mut batch = portal.start_upload(&identity, UploadSelection::new(files))?;
    let printers: Vec<_> = batch
        .subscribe()
        .into_iter()
        .map(|(index, name, mut events)| {
            tokio::spawn(async move {
                while let Some(event) = events.next().await {
                    println!("  [{index}] {name}: {}", describe_event(&event));
                }
            })
        })
        .collect();
    let stored = portal.complete_upload(batch).await?;
    for printer in printers {
        let _ = printer.await;
    }
    println!("Stored {} document(s)", stored.len());
    print_guard(&portal, &auth, "After uploading documents").await;

    let status = portal.status(&identity).await?;
    println!("\nConfirmation");
    for document in &status.documents {
        println!(
            "- {} ({}, {} bytes) {}",
            document.name,
            document.content_type,
            document.size_bytes,
            document.direct_url(portal.public_base_url())
        );
    }

    if let Some(identity) = sessions.logout(&token) {
        portal.end_session(&identity);
        println!("\nSigned out {}", identity.principal);
    }
    Ok(())
}

async fn print_guard(portal: &crate::infra::LocalPortal, auth: &AuthState, heading: &str) {
    println!("\n{heading}");
    for step in Step::ALL {
        let navigation = portal.resolve(step.route(), auth).await;
        println!("- {}: {}", step.route().path(), describe(&navigation));
    }
}

fn describe(navigation: &Navigation) -> String {
    match navigation {
        Navigation::Wait => "wait (status loading)".to_string(),
        Navigation::ShowLogin => "show login".to_string(),
        Navigation::Render(step) => format!("render {}", step.title()),
        Navigation::Redirect(route) => format!("redirect to {}", route.path()),
        Navigation::Unavailable(message) => format!("unavailable ({message})"),
    }
}

fn describe_event(event: &UploadEvent) -> String {
    match event {
        UploadEvent::Started { total_bytes } => format!("started ({total_bytes} bytes)"),
        UploadEvent::Progress { percentage } => format!("{percentage}%"),
        UploadEvent::Completed { document } => format!("stored as {}", document.key),
        UploadEvent::Failed { message } => format!("failed: {message}"),
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn read_document(path: &Path) -> Result<PendingDocument, AppError> {
    let bytes = std::fs::read(path)?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("document")
        .to_string();
    let content_type = mime_guess::from_path(path).first().map(|mime| mime.to_string());
    Ok(PendingDocument {
        content_type,
        ..PendingDocument::new(name, bytes)
    })
}

fn synthetic_documents() -> Vec<PendingDocument> {
    vec![
        PendingDocument::new("passport-scan.pdf", vec![0x25; 192 * 1024]),
        PendingDocument::new("photo.jpg", vec![0xff; 48 * 1024]),
    ]
}

fn hypothetical_status(has_details: bool, documents: usize) -> ApplicationStatus {
    ApplicationStatus {
        applicant_details: has_details.then(|| ApplicantDetails {
            status: "submitted".to_string(),
            applicant_name: "Hypothetical Applicant".to_string(),
            father_name: "Hypothetical Parent".to_string(),
            address: "Nowhere".to_string(),
            service_opted: "other".to_string(),
            has_documents: documents > 0,
        }),
        documents: (0..documents)
            .map(|index| DocumentRef {
                key: format!("blob-{index}"),
                name: format!("document-{index}.pdf"),
                content_type: "application/pdf".to_string(),
                size_bytes: 0,
            })
            .collect(),
    }
}
