//! Types for the transfer orchestrator.

use std::path::PathBuf;

use crate::api::{ArchiveDescriptor, ExportScope};
use crate::cloud::CloudTargetConfig;
use crate::export::{final_path, partial_path};

/// Where the archives of an export end up.
#[derive(Debug, Clone)]
pub enum Destination {
    /// Download to the output directory.
    Local,
    /// Stream straight to a cloud target without a local copy.
    Cloud(CloudTargetConfig),
}

/// One export request, as supplied by the caller.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    /// What to export.
    pub scope: ExportScope,
    /// Base name for the produced archives (without extension).
    pub base_name: String,
    /// Maximum size of a single archive; the server splits above this.
    pub max_archive_size_bytes: u64,
    /// Where the archives go.
    pub destination: Destination,
    /// Whether interrupted downloads may continue from a partial file.
    pub resume_allowed: bool,
}

impl ExportRequest {
    /// Create a request with resume enabled.
    pub fn new(
        scope: ExportScope,
        base_name: impl Into<String>,
        max_archive_size_bytes: u64,
        destination: Destination,
    ) -> Self {
        Self {
            scope,
            base_name: base_name.into(),
            max_archive_size_bytes,
            destination,
            resume_allowed: true,
        }
    }
}

/// Transfer mode of one archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Download to local disk.
    Local,
    /// Stream to a cloud target.
    Cloud,
}

/// Lifecycle state of one archive within an export.
///
/// ```text
/// Planned → (SkippedExisting | Downloading | Uploading)
///                 → (Completed | Paused | Error)
/// ```
///
/// `Paused` is reachable only from `Downloading`: cloud uploads are not
/// resumable, so cancelling one terminates in `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveState {
    /// Planned but not yet started.
    Planned,
    /// A matching final file already existed; nothing was transferred.
    SkippedExisting,
    /// Streaming from the server to local disk.
    Downloading,
    /// Streaming to a cloud target.
    Uploading,
    /// Finished successfully.
    Completed,
    /// Interrupted with resume state persisted.
    Paused,
    /// Failed terminally for this run.
    Error,
}

impl ArchiveState {
    /// Whether this state ends the archive's lifecycle for this run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ArchiveState::SkippedExisting
                | ArchiveState::Completed
                | ArchiveState::Paused
                | ArchiveState::Error
        )
    }

    /// Whether this state counts as a successful outcome.
    pub fn is_success(&self) -> bool {
        matches!(self, ArchiveState::SkippedExisting | ArchiveState::Completed)
    }

    /// Whether the machine may move from `self` to `next`.
    pub fn can_transition_to(&self, next: ArchiveState) -> bool {
        use ArchiveState::*;
        matches!(
            (self, next),
            (Planned, SkippedExisting)
                | (Planned, Downloading)
                | (Planned, Uploading)
                | (Planned, Error)
                | (Downloading, Completed)
                | (Downloading, Paused)
                | (Downloading, Error)
                | (Uploading, Completed)
                | (Uploading, Error)
        )
    }
}

/// In-memory bookkeeping for one archive transfer.
///
/// Created per descriptor when the orchestrator reaches it, destroyed (into
/// an [`ArchiveReport`]) at a terminal state.
#[derive(Debug)]
pub struct TransferSession {
    /// Archive name (without extension).
    pub archive_name: String,
    /// In-flight file location (local mode).
    pub partial_path: PathBuf,
    /// Final file location (local mode).
    pub final_path: PathBuf,
    /// Expected total bytes.
    pub total_size: u64,
    /// Bytes moved so far.
    pub bytes_transferred: u64,
    /// Local or cloud.
    pub mode: TransferMode,
    /// Current lifecycle state.
    pub state: ArchiveState,
    /// Human-readable detail for failures.
    pub message: Option<String>,
}

impl TransferSession {
    /// Create a session in `Planned` state.
    pub fn new(
        output_dir: &std::path::Path,
        archive_name: impl Into<String>,
        total_size: u64,
        mode: TransferMode,
    ) -> Self {
        let archive_name = archive_name.into();
        Self {
            partial_path: partial_path(output_dir, &archive_name),
            final_path: final_path(output_dir, &archive_name),
            archive_name,
            total_size,
            bytes_transferred: 0,
            mode,
            state: ArchiveState::Planned,
            message: None,
        }
    }

    /// Move to the next state.
    ///
    /// Invalid transitions are a logic error in the orchestrator; they are
    /// logged and applied anyway so a report is still produced.
    pub fn advance(&mut self, next: ArchiveState) {
        if !self.state.can_transition_to(next) {
            tracing::error!(
                archive = self.archive_name.as_str(),
                from = ?self.state,
                to = ?next,
                "invalid archive state transition"
            );
        }
        self.state = next;
    }

    /// Collapse the session into its report.
    pub fn finish(self) -> ArchiveReport {
        ArchiveReport {
            archive_name: self.archive_name,
            state: self.state,
            bytes_transferred: self.bytes_transferred,
            total_bytes: self.total_size,
            message: self.message,
        }
    }
}

/// Outcome of one archive within an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReport {
    /// Archive name (without extension).
    pub archive_name: String,
    /// Terminal state (or `Planned` if never attempted).
    pub state: ArchiveState,
    /// Bytes moved.
    pub bytes_transferred: u64,
    /// Expected total bytes.
    pub total_bytes: u64,
    /// Failure detail, when there is one.
    pub message: Option<String>,
}

/// Aggregated outcome of one export request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    /// Total size the server planned.
    pub total_size: u64,
    /// Per-archive outcomes, in plan order.
    pub archives: Vec<ArchiveReport>,
    /// Set when planning itself failed; no archives were attempted.
    pub plan_error: Option<String>,
}

impl ExportReport {
    /// A report for an export whose planning failed.
    pub fn plan_failed(message: impl Into<String>) -> Self {
        Self {
            total_size: 0,
            archives: Vec::new(),
            plan_error: Some(message.into()),
        }
    }

    /// An empty report for a successfully planned export.
    pub fn new(total_size: u64) -> Self {
        Self {
            total_size,
            archives: Vec::new(),
            plan_error: None,
        }
    }

    /// Whether every archive finished successfully.
    pub fn all_succeeded(&self) -> bool {
        self.plan_error.is_none() && self.archives.iter().all(|a| a.state.is_success())
    }

    /// Whether the export can be resumed (some archive paused).
    pub fn is_resumable(&self) -> bool {
        self.archives
            .iter()
            .any(|a| a.state == ArchiveState::Paused)
    }

    /// Number of archives in the given state.
    pub fn count(&self, state: ArchiveState) -> usize {
        self.archives.iter().filter(|a| a.state == state).count()
    }
}

/// Name for one archive of a plan.
///
/// Single-archive plans use the base name; multi-archive plans get a
/// `_partN` suffix in plan order.
pub fn archive_name_for(base_name: &str, descriptor: &ArchiveDescriptor) -> String {
    if descriptor.total_in_group <= 1 {
        base_name.to_string()
    } else {
        format!("{}_part{}", base_name, descriptor.sequence_index + 1)
    }
}
