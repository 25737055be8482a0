//! Top-level transfer coordination.
//!
//! The orchestrator drives one export request end to end: it asks the
//! server to plan the export, then walks the planned archives strictly in
//! order. Local-destination archives go through the [`DownloadEngine`];
//! cloud-destination archives stream straight from the server into a cloud
//! driver on a worker thread, with no full local buffering.
//!
//! # Concurrency
//!
//! The orchestrator runs on the caller's thread. A cloud upload is the only
//! background work: one worker thread per upload, progress flowing back over
//! a channel, and at most one upload in flight per orchestrator instance.
//! Cancellation is a shared flag polled between chunks; a cancelled download
//! pauses with resume state persisted, while a cancelled cloud upload
//! terminates as an error (uploads are not resumable - a deliberate
//! asymmetry).

mod types;

pub use types::{
    archive_name_for, ArchiveReport, ArchiveState, Destination, ExportReport, ExportRequest,
    TransferMode, TransferSession,
};

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use tracing::{error, info, warn};

use crate::api::{ArchiveApi, ArchiveDescriptor};
use crate::cloud::{
    CloudError, CloudTargetConfig, CloudUploadEngine, ProgressCallback, StreamSource,
};
use crate::export::{
    final_path, within_tolerance, DownloadEngine, DownloadOutcome, ProgressEvent,
    ResumeMetadataStore, ServerCapabilityCache, TransferStage,
};

/// Coordinates one export at a time against one server.
pub struct TransferOrchestrator<A: ArchiveApi> {
    api: A,
    resume: ResumeMetadataStore,
    capabilities: ServerCapabilityCache,
    output_dir: PathBuf,
    cancel: Arc<AtomicBool>,
    upload_in_flight: AtomicBool,
}

impl<A: ArchiveApi> TransferOrchestrator<A> {
    /// Create an orchestrator writing local archives into `output_dir`.
    ///
    /// The output directory also anchors the resume metadata store, so
    /// interrupted exports can be resumed by a later orchestrator pointed at
    /// the same directory.
    pub fn new(api: A, output_dir: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        Self {
            api,
            resume: ResumeMetadataStore::new(&output_dir),
            capabilities: ServerCapabilityCache::new(),
            output_dir,
            cancel: Arc::new(AtomicBool::new(false)),
            upload_in_flight: AtomicBool::new(false),
        }
    }

    /// Share an externally-owned cancel flag (e.g. wired to Ctrl-C).
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// The cooperative cancel flag. Set it to `true` to stop transfers at
    /// the next chunk boundary.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Request cancellation of the current run.
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// The resume store backing this orchestrator.
    pub fn resume_store(&self) -> &ResumeMetadataStore {
        &self.resume
    }

    /// Run one export request to completion, pause, or failure.
    ///
    /// Archives are processed strictly in plan order; a paused archive
    /// halts the remaining ones (they stay `Planned` in the report), and
    /// failed archives do not - the user can retry the whole export later.
    pub fn run(
        &self,
        request: &ExportRequest,
        mut on_progress: impl FnMut(ProgressEvent),
    ) -> ExportReport {
        self.cancel.store(false, Ordering::SeqCst);

        let plan = match self
            .api
            .prepare(&request.scope, request.max_archive_size_bytes)
        {
            Ok(plan) => plan,
            Err(e) => {
                error!(error = %e, "export planning failed");
                return ExportReport::plan_failed(format!("planning failed: {}", e));
            }
        };
        if plan.is_empty() {
            warn!("server returned an empty export plan");
            return ExportReport::plan_failed("server returned an empty export plan");
        }

        info!(
            total_size = plan.total_size,
            archives = plan.archives.len(),
            "export planned"
        );

        let mut report = ExportReport::new(plan.total_size);
        let mut halted = false;

        for descriptor in &plan.archives {
            let name = archive_name_for(&request.base_name, descriptor);

            if halted || self.cancel.load(Ordering::SeqCst) {
                report.archives.push(ArchiveReport {
                    archive_name: name,
                    state: ArchiveState::Planned,
                    bytes_transferred: 0,
                    total_bytes: descriptor.byte_size,
                    message: None,
                });
                continue;
            }

            let archive_report = match &request.destination {
                Destination::Local => {
                    self.run_local(descriptor, &name, request.resume_allowed, &mut on_progress)
                }
                Destination::Cloud(target) => {
                    self.run_cloud(descriptor, &name, target, &mut on_progress)
                }
            };

            if archive_report.state == ArchiveState::Paused || self.cancel.load(Ordering::SeqCst) {
                halted = true;
            }
            report.archives.push(archive_report);
        }

        report
    }

    /// Download one archive to local disk.
    fn run_local(
        &self,
        descriptor: &ArchiveDescriptor,
        name: &str,
        resume_allowed: bool,
        on_progress: &mut dyn FnMut(ProgressEvent),
    ) -> ArchiveReport {
        let mut session =
            TransferSession::new(&self.output_dir, name, descriptor.byte_size, TransferMode::Local);

        if self.already_exported(name, descriptor.byte_size) {
            info!(archive = name, "matching archive already on disk, skipping");
            self.resume.clear(name);
            session.advance(ArchiveState::SkippedExisting);
            session.bytes_transferred = descriptor.byte_size;
            return session.finish();
        }

        session.advance(ArchiveState::Downloading);
        let engine = DownloadEngine::new(
            &self.api,
            &self.resume,
            &self.capabilities,
            &self.output_dir,
            Arc::clone(&self.cancel),
        );

        let mut bytes_seen = 0u64;
        let outcome = engine.download(descriptor, name, resume_allowed, &mut |event| {
            bytes_seen = event.bytes;
            on_progress(event);
        });
        session.bytes_transferred = bytes_seen;

        match outcome {
            DownloadOutcome::Completed => session.advance(ArchiveState::Completed),
            DownloadOutcome::Paused => session.advance(ArchiveState::Paused),
            DownloadOutcome::Failed(message) => {
                session.message = Some(format!("download of '{}' failed: {}", name, message));
                session.advance(ArchiveState::Error);
            }
        }
        session.finish()
    }

    /// Stream one archive from the server straight to a cloud target.
    ///
    /// The raw response body is handed to the upload driver with no full
    /// local buffering; only the S3 driver's one-part accumulator holds
    /// bytes in memory. The upload runs on a worker thread so this thread
    /// keeps forwarding progress and stays responsive to cancellation.
    fn run_cloud(
        &self,
        descriptor: &ArchiveDescriptor,
        name: &str,
        target: &CloudTargetConfig,
        on_progress: &mut dyn FnMut(ProgressEvent),
    ) -> ArchiveReport {
        let mut session =
            TransferSession::new(&self.output_dir, name, descriptor.byte_size, TransferMode::Cloud);

        if self.upload_in_flight.swap(true, Ordering::SeqCst) {
            session.message =
                Some("another cloud upload is already in flight for this orchestrator".to_string());
            session.advance(ArchiveState::Error);
            return session.finish();
        }

        let result = self.cloud_transfer(descriptor, name, target, &mut session, on_progress);
        self.upload_in_flight.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => session.advance(ArchiveState::Completed),
            Err(e) if e.is_cancelled() => {
                // Cloud uploads are cancel-only: no resume state to keep.
                session.message = Some(format!("upload of '{}' cancelled by user", name));
                session.advance(ArchiveState::Error);
            }
            Err(e) => {
                session.message = Some(format!("upload of '{}' failed: {}", name, e));
                session.advance(ArchiveState::Error);
            }
        }
        session.finish()
    }

    fn cloud_transfer(
        &self,
        descriptor: &ArchiveDescriptor,
        name: &str,
        target: &CloudTargetConfig,
        session: &mut TransferSession,
        on_progress: &mut dyn FnMut(ProgressEvent),
    ) -> Result<(), CloudError> {
        let total = descriptor.byte_size;
        let response = self
            .api
            .open(&descriptor.asset_ids, None)
            .map_err(|e| CloudError::Source(format!("failed to open archive stream: {}", e)))?;
        session.advance(ArchiveState::Uploading);

        let source = StreamSource::new(response.body, total);
        let remote_file = format!("{}.zip", name);

        let (tx, rx) = mpsc::channel::<ProgressEvent>();
        let cancel = Arc::clone(&self.cancel);
        let target = target.clone();
        let event_name = name.to_string();
        let remote_file_thread = remote_file.clone();

        let worker = thread::Builder::new()
            .name("cloud-upload".to_string())
            .spawn(move || {
                let progress: ProgressCallback =
                    Box::new(move |percent, bytes, total_bytes, speed| {
                        if cancel.load(Ordering::SeqCst) {
                            return false;
                        }
                        let _ = tx.send(ProgressEvent {
                            archive_name: event_name.clone(),
                            stage: TransferStage::Upload,
                            percent,
                            bytes,
                            total_bytes,
                            bytes_per_sec: speed,
                        });
                        true
                    });
                CloudUploadEngine::new().upload(
                    &target,
                    &remote_file_thread,
                    Box::new(source),
                    progress,
                )
            })
            .map_err(|e| CloudError::Upload {
                remote_path: remote_file.clone(),
                reason: format!("failed to spawn upload worker: {}", e),
            })?;

        // Forward progress until the worker drops its sender.
        for event in rx {
            session.bytes_transferred = event.bytes;
            on_progress(event);
        }

        worker.join().unwrap_or_else(|_| {
            Err(CloudError::Upload {
                remote_path: remote_file,
                reason: "upload worker panicked".to_string(),
            })
        })
    }

    fn already_exported(&self, name: &str, expected_size: u64) -> bool {
        fs::metadata(final_path(&self.output_dir, name))
            .map(|m| within_tolerance(expected_size, m.len()))
            .unwrap_or(false)
    }
}
