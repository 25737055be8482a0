//! Export command - plan and transfer archives.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

use clap::Args;

use archiport::api::{ApiClient, ExportScope};
use archiport::export::{format_size, EmitGate, ProgressEvent, TransferStage};
use archiport::orchestrator::{
    ArchiveState, Destination, ExportReport, ExportRequest, TransferOrchestrator,
};

use super::open_vault;
use crate::error::CliError;

/// Arguments for the export command.
#[derive(Args)]
pub struct ExportArgs {
    /// Photo server API base URL, e.g. https://photos.example.com/api
    #[arg(long)]
    pub server: String,

    /// API key for the photo server
    #[arg(long, env = "ARCHIPORT_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Comma-separated asset ids, or @path/to/file with one id per line
    #[arg(long, conflicts_with = "album", required_unless_present = "album")]
    pub assets: Option<String>,

    /// Album id to export instead of explicit assets
    #[arg(long)]
    pub album: Option<String>,

    /// Output directory for local exports (also holds resume state)
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Base name for the produced archives
    #[arg(long, default_value = "archive")]
    pub name: String,

    /// Maximum size of a single archive in bytes
    #[arg(long, default_value_t = 4 * 1024 * 1024 * 1024)]
    pub max_archive_size: u64,

    /// Upload to this stored cloud target instead of saving locally
    #[arg(long)]
    pub target: Option<String>,

    /// Start fresh, ignoring any resume state
    #[arg(long)]
    pub no_resume: bool,
}

/// Run the export command.
pub fn run(args: ExportArgs) -> Result<(), CliError> {
    let scope = resolve_scope(&args)?;

    let destination = match &args.target {
        Some(name) => {
            let vault = open_vault()?;
            let config = vault.load(name).ok_or_else(|| {
                CliError::Config(format!(
                    "no cloud target named '{}'. Add one with `archiport targets add-webdav` \
                     or `archiport targets add-s3`.",
                    name
                ))
            })?;
            Destination::Cloud(config)
        }
        None => Destination::Local,
    };

    let api = ApiClient::new(&args.server, &args.api_key)?;
    let mut request = ExportRequest::new(scope, &args.name, args.max_archive_size, destination);
    request.resume_allowed = !args.no_resume;

    let orchestrator = TransferOrchestrator::new(api, &args.output_dir);

    let cancel = orchestrator.cancel_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nStopping after the current chunk...");
        cancel.store(true, Ordering::SeqCst);
    })
    .map_err(|e| CliError::Config(format!("failed to install Ctrl-C handler: {}", e)))?;

    println!("Archiport v{}", archiport::VERSION);
    println!("Server: {}", args.server);
    match &request.destination {
        Destination::Local => println!("Destination: {}", args.output_dir.display()),
        Destination::Cloud(target) => println!("Destination: {}", target.display_name()),
    }
    if orchestrator.resume_store().has_any() && request.resume_allowed {
        println!("Resume state found; interrupted downloads will continue.");
    }
    println!();

    let mut gate = EmitGate::with_interval(Duration::from_millis(500));
    let report = orchestrator.run(&request, |event| {
        if gate.ready() {
            print_progress(&event);
        }
    });

    print_report(&report);

    if let Some(message) = &report.plan_error {
        return Err(CliError::ExportFailed(message.clone()));
    }
    if report.count(ArchiveState::Error) > 0 {
        return Err(CliError::ExportFailed(format!(
            "{} archive(s) failed; see messages above",
            report.count(ArchiveState::Error)
        )));
    }
    Ok(())
}

fn resolve_scope(args: &ExportArgs) -> Result<ExportScope, CliError> {
    if let Some(album) = &args.album {
        return Ok(ExportScope::Album(album.clone()));
    }

    let raw = args.assets.as_deref().unwrap_or_default();
    let ids: Vec<String> = if let Some(path) = raw.strip_prefix('@') {
        fs::read_to_string(path)
            .map_err(|e| CliError::Config(format!("failed to read asset list {}: {}", path, e)))?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect()
    } else {
        raw.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(String::from)
            .collect()
    };

    if ids.is_empty() {
        return Err(CliError::Config(
            "no asset ids given; use --assets or --album".to_string(),
        ));
    }
    Ok(ExportScope::Assets(ids))
}

fn print_progress(event: &ProgressEvent) {
    let stage = match event.stage {
        TransferStage::Download => "downloading",
        TransferStage::Upload => "uploading",
    };
    println!(
        "{}: {} - {:.1}% ({} / {}, {}/s)",
        stage,
        event.archive_name,
        event.percent,
        format_size(event.bytes),
        format_size(event.total_bytes),
        format_size(event.bytes_per_sec as u64),
    );
}

fn print_report(report: &ExportReport) {
    println!();
    if let Some(message) = &report.plan_error {
        println!("Export failed during planning: {}", message);
        return;
    }

    for archive in &report.archives {
        let status = match archive.state {
            ArchiveState::Completed => "completed",
            ArchiveState::SkippedExisting => "already present",
            ArchiveState::Paused => "paused (resumable)",
            ArchiveState::Error => "failed",
            ArchiveState::Planned => "not started",
            ArchiveState::Downloading | ArchiveState::Uploading => "interrupted",
        };
        match &archive.message {
            Some(message) => println!("  {}: {} - {}", archive.archive_name, status, message),
            None => println!(
                "  {}: {} ({})",
                archive.archive_name,
                status,
                format_size(archive.bytes_transferred)
            ),
        }
    }

    if report.is_resumable() {
        println!();
        println!("Export paused. Run the same command again to resume.");
    } else if report.all_succeeded() {
        println!();
        println!("Export finished: {} archive(s), {}.", report.archives.len(), format_size(report.total_size));
    }
}
