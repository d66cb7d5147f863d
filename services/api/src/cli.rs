use crate::demo::{run_demo, run_guard, DemoArgs, GuardArgs};
use crate::server;
use applicant_portal::error::AppError;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "Applicant Portal",
    about = "Serve and exercise the applicant submission portal from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk one applicant through the whole wizard in-process
    Demo(DemoArgs),
    /// Print the step guard's decision for a hypothetical application status
    Guard(GuardArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args).await,
        Command::Guard(args) => run_guard(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["applicant-portal-api"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn guard_accepts_status_flags() {
        let cli = Cli::try_parse_from([
            "applicant-portal-api",
            "guard",
            "--step",
            "confirmation",
            "--has-details",
            "--documents",
            "2",
        ])
        .expect("parses");
        match cli.command {
            Some(Command::Guard(args)) => {
                assert!(args.has_details);
                assert_eq!(args.documents, 2);
                assert!(!args.loading);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn demo_collects_repeated_documents() {
        let cli = Cli::try_parse_from([
            "applicant-portal-api",
            "demo",
            "--document",
            "passport.pdf",
            "--document",
            "photo.png",
            "--principal",
            "ravi",
        ])
        .expect("parses");
        match cli.command {
            Some(Command::Demo(args)) => {
                assert_eq!(args.documents.len(), 2);
                assert_eq!(args.principal, "ravi");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
