use crate::demo::{run_demo, run_roster_preview, run_status, DemoArgs, RosterArgs, StatusArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use permit_desk::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Permit Desk",
    about = "Track client permits (alvarás), their expirations and renewals",
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
    /// Classify a permit from its dates without touching any store
    Status(StatusArgs),
    /// Client roster utilities
    Clients {
        #[command(subcommand)]
        command: ClientsCommand,
    },
    /// Run an end-to-end demo of the permit lifecycle against in-memory stores
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum ClientsCommand {
    /// Validate a roster CSV and list what would be imported
    Preview(RosterArgs),
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
        Command::Status(args) => run_status(args),
        Command::Clients {
            command: ClientsCommand::Preview(args),
        } => run_roster_preview(args),
        Command::Demo(args) => run_demo(args).await,
    }
}
