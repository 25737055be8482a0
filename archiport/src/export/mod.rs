//! Resumable archive download engine and its supporting state.
//!
//! This module provides the local half of the transfer pipeline:
//! - Resume metadata persistence (`resume`)
//! - Per-server range-capability tracking (`capability`)
//! - Progress events and speed tracking (`progress`)
//! - The streaming download engine itself (`download`)
//!
//! # Architecture
//!
//! ```text
//! DownloadEngine
//!         │
//!         ├── ArchiveStream (api trait, opens the byte stream)
//!         ├── ResumeMetadataStore (persists resume records)
//!         ├── ServerCapabilityCache (gates Range attempts)
//!         └── progress events → caller
//! ```
//!
//! Downloads land in `<output_dir>/<archive_name>.zip.partial` and are
//! atomically renamed to `<archive_name>.zip` on completion. A valid resume
//! record plus a range-capable server lets an interrupted download continue
//! from the partial file's byte offset.

mod capability;
mod download;
mod error;
mod progress;
mod resume;

pub use capability::ServerCapabilityCache;
pub use download::{within_tolerance, DownloadEngine, DownloadOutcome};
pub use error::{ExportError, ExportResult};
pub use progress::{format_size, percent_of, EmitGate, ProgressEvent, SpeedTracker, TransferStage};
pub use resume::{ResumeMetadataStore, ResumeRecord};

use std::path::{Path, PathBuf};

/// Final on-disk location for a named archive.
pub fn final_path(output_dir: &Path, archive_name: &str) -> PathBuf {
    output_dir.join(format!("{}.zip", archive_name))
}

/// In-flight on-disk location for a named archive.
pub fn partial_path(output_dir: &Path, archive_name: &str) -> PathBuf {
    output_dir.join(format!("{}.zip.partial", archive_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_paths() {
        let dir = Path::new("/exports");
        assert_eq!(
            final_path(dir, "june_2024"),
            PathBuf::from("/exports/june_2024.zip")
        );
        assert_eq!(
            partial_path(dir, "june_2024"),
            PathBuf::from("/exports/june_2024.zip.partial")
        );
    }
}
