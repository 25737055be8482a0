//! Resume metadata persistence for interrupted downloads.
//!
//! Each in-flight archive gets a small JSON record under
//! `<output_dir>/.resume/` describing what was being downloaded and how far
//! it got. Records are self-verifying: a record whose partial file has
//! disappeared, or whose parameters no longer match the current request, is
//! purged rather than trusted. A mismatch always forces a full restart,
//! never a corrupted append.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::{ExportError, ExportResult};
use super::partial_path;

/// Directory under the output directory holding resume records.
const RESUME_DIR: &str = ".resume";

/// Persisted state of one interrupted download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeRecord {
    /// Archive name, also the record's key.
    pub archive_name: String,
    /// Asset ids the archive was planned from.
    pub asset_ids: Vec<String>,
    /// Expected total archive size in bytes.
    pub total_size: u64,
    /// Bytes written at the time the record was saved.
    ///
    /// May lag the partial file by up to one save interval; the partial
    /// file's on-disk length is authoritative for the resume offset.
    pub downloaded_size: u64,
    /// When the record was last saved.
    pub timestamp: DateTime<Utc>,
    /// The partial file the record describes.
    pub partial_file_path: PathBuf,
}

/// Store for per-archive resume records.
#[derive(Debug, Clone)]
pub struct ResumeMetadataStore {
    output_dir: PathBuf,
}

impl ResumeMetadataStore {
    /// Create a store rooted at the given output directory.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Path of the record file for an archive.
    pub fn record_path(&self, archive_name: &str) -> PathBuf {
        self.output_dir
            .join(RESUME_DIR)
            .join(format!("{}.resume.json", archive_name))
    }

    /// Save (or overwrite) the resume record for an archive.
    ///
    /// `downloaded_size` is clamped to `total_size`; a record can never
    /// claim more bytes than the archive holds.
    pub fn save(
        &self,
        archive_name: &str,
        asset_ids: &[String],
        total_size: u64,
        downloaded_size: u64,
    ) -> ExportResult<()> {
        let record = ResumeRecord {
            archive_name: archive_name.to_string(),
            asset_ids: asset_ids.to_vec(),
            total_size,
            downloaded_size: downloaded_size.min(total_size),
            timestamp: Utc::now(),
            partial_file_path: partial_path(&self.output_dir, archive_name),
        };

        let dir = self.output_dir.join(RESUME_DIR);
        fs::create_dir_all(&dir).map_err(|e| ExportError::CreateDirFailed {
            path: dir.clone(),
            source: e,
        })?;

        let json = serde_json::to_vec_pretty(&record).map_err(|e| ExportError::RecordEncode {
            archive: archive_name.to_string(),
            source: e,
        })?;

        let path = self.record_path(archive_name);
        fs::write(&path, json).map_err(|e| ExportError::WriteFailed { path, source: e })?;
        debug!(
            archive = archive_name,
            downloaded = record.downloaded_size,
            total = total_size,
            "resume record saved"
        );
        Ok(())
    }

    /// Load the resume record for an archive.
    ///
    /// Returns `None` if there is no record, the record is unreadable, or
    /// its partial file has disappeared. Invalid records are deleted so a
    /// stale record can never block future exports.
    pub fn load(&self, archive_name: &str) -> Option<ResumeRecord> {
        let path = self.record_path(archive_name);
        let bytes = fs::read(&path).ok()?;

        let record: ResumeRecord = match serde_json::from_slice(&bytes) {
            Ok(record) => record,
            Err(e) => {
                warn!(archive = archive_name, error = %e, "discarding unreadable resume record");
                fs::remove_file(&path).ok();
                return None;
            }
        };

        if !record.partial_file_path.exists() {
            debug!(
                archive = archive_name,
                "partial file gone, discarding resume record"
            );
            fs::remove_file(&path).ok();
            return None;
        }

        Some(record)
    }

    /// Whether a download of the given parameters can resume, and from how
    /// many bytes.
    ///
    /// Resume requires a record matching the current asset ids and total
    /// size, with a partial file that is neither missing nor already
    /// complete. Mismatched records are purged before answering.
    pub fn can_resume(
        &self,
        archive_name: &str,
        asset_ids: &[String],
        total_size: u64,
    ) -> (bool, u64) {
        let Some(record) = self.load(archive_name) else {
            return (false, 0);
        };

        if record.asset_ids != asset_ids || record.total_size != total_size {
            debug!(
                archive = archive_name,
                "resume record does not match request, purging"
            );
            self.clear(archive_name);
            return (false, 0);
        }

        let partial_len = fs::metadata(&record.partial_file_path)
            .map(|m| m.len())
            .unwrap_or(0);
        if partial_len == 0 || partial_len >= total_size {
            return (false, 0);
        }

        (true, partial_len)
    }

    /// Delete the record for an archive, if present.
    pub fn clear(&self, archive_name: &str) {
        fs::remove_file(self.record_path(archive_name)).ok();
    }

    /// Whether any resume records exist under the output directory.
    pub fn has_any(&self) -> bool {
        let dir = self.output_dir.join(RESUME_DIR);
        let Ok(entries) = fs::read_dir(dir) else {
            return false;
        };
        entries.flatten().any(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .ends_with(".resume.json")
        })
    }

    /// The output directory this store is rooted at.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}
