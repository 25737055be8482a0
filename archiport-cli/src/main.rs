//! Archiport CLI - command-line interface
//!
//! This binary provides a command-line interface to the Archiport library:
//! exporting archives from a photo-management server to local disk or a
//! cloud target, and managing the stored cloud target configurations.

mod commands;
mod error;

use clap::{Parser, Subcommand};

use error::CliError;

#[derive(Parser)]
#[command(
    name = "archiport",
    version,
    about = "Resilient media archive export from photo servers to disk or cloud storage"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export archives from the photo server
    Export(commands::export::ExportArgs),
    /// Manage stored cloud storage targets
    Targets {
        #[command(subcommand)]
        command: commands::targets::TargetsCommand,
    },
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let result: Result<(), CliError> = match cli.command {
        Command::Export(args) => commands::export::run(args),
        Command::Targets { command } => commands::targets::run(command),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
