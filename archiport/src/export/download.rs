//! Streaming archive download with resume support.
//!
//! The engine downloads one archive descriptor to a local `.partial` file
//! and atomically renames it into place on completion. Interruptions leave
//! the partial file and a resume record behind; a later attempt against a
//! range-capable server continues from the partial file's byte offset.
//! Servers that ignore `Range` are demoted in the capability cache and the
//! download restarts in full within the same call.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::api::{ArchiveDescriptor, ArchiveStream};

use super::capability::ServerCapabilityCache;
use super::error::{ExportError, ExportResult};
use super::progress::{ProgressEvent, SpeedTracker, TransferStage};
use super::resume::ResumeMetadataStore;
use super::{final_path, partial_path};

/// Chunk size for streaming reads/writes (128 KiB).
const CHUNK_SIZE: usize = 128 * 1024;

/// How often the resume record is refreshed during a download.
const RESUME_SAVE_INTERVAL: Duration = Duration::from_secs(5);

/// Terminal result of a download attempt.
///
/// Failures are reported here rather than as `Err`: the engine has already
/// logged them and retained the partial file for a future resume, so the
/// caller only needs the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The final file is in place (downloaded now, or already present).
    Completed,
    /// Cancellation was requested; resume state has been persisted.
    Paused,
    /// The download failed; the partial file is retained.
    Failed(String),
}

/// Whether an on-disk size is acceptably close to the expected size.
///
/// The tolerance is `max(1 KiB, 0.1%)` of the expected size: archive
/// servers occasionally rewrite container metadata between the plan and the
/// stream, so exact equality is too strict.
pub fn within_tolerance(expected: u64, actual: u64) -> bool {
    let tolerance = (expected / 1000).max(1024);
    expected.abs_diff(actual) <= tolerance
}

/// Streaming downloader for planned archives.
pub struct DownloadEngine<'a> {
    stream: &'a dyn ArchiveStream,
    resume: &'a ResumeMetadataStore,
    capabilities: &'a ServerCapabilityCache,
    output_dir: PathBuf,
    cancel: Arc<AtomicBool>,
    chunk_size: usize,
}

impl<'a> DownloadEngine<'a> {
    /// Create an engine writing into `output_dir`.
    pub fn new(
        stream: &'a dyn ArchiveStream,
        resume: &'a ResumeMetadataStore,
        capabilities: &'a ServerCapabilityCache,
        output_dir: impl Into<PathBuf>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            stream,
            resume,
            capabilities,
            output_dir: output_dir.into(),
            cancel,
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Override the streaming chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Download one archive to `<output_dir>/<archive_name>.zip`.
    ///
    /// Emits a progress event per streamed chunk. Errors are captured into
    /// [`DownloadOutcome::Failed`]; the partial file is deliberately left on
    /// disk for a future resume.
    pub fn download(
        &self,
        descriptor: &ArchiveDescriptor,
        archive_name: &str,
        resume_allowed: bool,
        on_progress: &mut dyn FnMut(ProgressEvent),
    ) -> DownloadOutcome {
        match self.run(descriptor, archive_name, resume_allowed, on_progress) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(archive = archive_name, error = %e, "download failed");
                DownloadOutcome::Failed(e.to_string())
            }
        }
    }

    fn run(
        &self,
        descriptor: &ArchiveDescriptor,
        archive_name: &str,
        resume_allowed: bool,
        on_progress: &mut dyn FnMut(ProgressEvent),
    ) -> ExportResult<DownloadOutcome> {
        let total = descriptor.byte_size;
        let final_file = final_path(&self.output_dir, archive_name);
        let partial_file = partial_path(&self.output_dir, archive_name);

        fs::create_dir_all(&self.output_dir).map_err(|e| ExportError::CreateDirFailed {
            path: self.output_dir.clone(),
            source: e,
        })?;

        // A matching final file means a previous export already finished.
        if let Ok(meta) = fs::metadata(&final_file) {
            if within_tolerance(total, meta.len()) {
                info!(
                    archive = archive_name,
                    size = meta.len(),
                    "final file already present, skipping download"
                );
                self.resume.clear(archive_name);
                on_progress(ProgressEvent::new(
                    archive_name,
                    TransferStage::Download,
                    total,
                    total,
                    0.0,
                ));
                return Ok(DownloadOutcome::Completed);
            }
            debug!(
                archive = archive_name,
                existing = meta.len(),
                expected = total,
                "existing final file does not match plan, re-downloading"
            );
        }

        let server = self.stream.server_identity().to_string();
        let mut offset = 0u64;
        if resume_allowed && self.capabilities.supports_range(&server) {
            let (ok, bytes) = self
                .resume
                .can_resume(archive_name, &descriptor.asset_ids, total);
            if ok {
                offset = bytes;
                info!(
                    archive = archive_name,
                    offset, "resuming download from byte offset"
                );
            }
        }

        let mut response = self
            .stream
            .open(&descriptor.asset_ids, (offset > 0).then_some(offset))?;

        if offset > 0 && !response.range_honored(offset, total) {
            // The server ignored the range. Don't trust it again this run,
            // and don't touch the resume record yet: it stays valid until
            // fresh bytes overwrite the partial file.
            warn!(
                archive = archive_name,
                server = %server,
                "server ignored range request, restarting full download"
            );
            self.capabilities.set_supports_range(&server, false);
            drop(response);
            offset = 0;
            response = self.stream.open(&descriptor.asset_ids, None)?;
        }

        let file = if offset > 0 {
            OpenOptions::new()
                .append(true)
                .open(&partial_file)
                .map_err(|e| ExportError::WriteFailed {
                    path: partial_file.clone(),
                    source: e,
                })?
        } else {
            File::create(&partial_file).map_err(|e| ExportError::WriteFailed {
                path: partial_file.clone(),
                source: e,
            })?
        };

        let mut writer = BufWriter::new(file);
        let mut downloaded = offset;
        let mut buffer = vec![0u8; self.chunk_size];
        let mut speed = SpeedTracker::new();
        let mut last_record_save = Instant::now();

        loop {
            if self.cancel.load(Ordering::SeqCst) {
                writer.flush().map_err(|e| ExportError::WriteFailed {
                    path: partial_file.clone(),
                    source: e,
                })?;
                self.resume
                    .save(archive_name, &descriptor.asset_ids, total, downloaded)?;
                info!(
                    archive = archive_name,
                    downloaded, "download paused by user"
                );
                return Ok(DownloadOutcome::Paused);
            }

            let read = match response.body.read(&mut buffer) {
                Ok(read) => read,
                Err(e) => {
                    // Persist what we have so the interruption is resumable.
                    writer.flush().ok();
                    self.resume
                        .save(archive_name, &descriptor.asset_ids, total, downloaded)
                        .ok();
                    return Err(ExportError::StreamInterrupted {
                        archive: archive_name.to_string(),
                        reason: e.to_string(),
                    });
                }
            };
            if read == 0 {
                break;
            }

            writer
                .write_all(&buffer[..read])
                .map_err(|e| ExportError::WriteFailed {
                    path: partial_file.clone(),
                    source: e,
                })?;
            downloaded += read as u64;

            on_progress(ProgressEvent::new(
                archive_name,
                TransferStage::Download,
                downloaded,
                total,
                speed.sample(downloaded),
            ));

            if last_record_save.elapsed() >= RESUME_SAVE_INTERVAL {
                if let Err(e) =
                    self.resume
                        .save(archive_name, &descriptor.asset_ids, total, downloaded)
                {
                    warn!(archive = archive_name, error = %e, "failed to refresh resume record");
                }
                last_record_save = Instant::now();
            }
        }

        writer.flush().map_err(|e| ExportError::WriteFailed {
            path: partial_file.clone(),
            source: e,
        })?;
        drop(writer);

        fs::rename(&partial_file, &final_file).map_err(|e| ExportError::RenameFailed {
            from: partial_file.clone(),
            to: final_file.clone(),
            source: e,
        })?;
        self.resume.clear(archive_name);

        let final_len = fs::metadata(&final_file).map(|m| m.len()).unwrap_or(downloaded);
        if !within_tolerance(total, final_len) {
            warn!(
                archive = archive_name,
                expected = total,
                actual = final_len,
                "downloaded archive size outside tolerance"
            );
        }

        on_progress(ProgressEvent::new(
            archive_name,
            TransferStage::Download,
            downloaded,
            total,
            0.0,
        ));
        info!(
            archive = archive_name,
            bytes = downloaded,
            "archive downloaded"
        );
        Ok(DownloadOutcome::Completed)
    }
}
