//! Error types for the export engine.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::api::ApiError;

/// Result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;

/// Errors that can occur while downloading archives or managing resume state.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Failed to read a file.
    #[error("failed to read {}: {source}", path.display())]
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to write a file.
    #[error("failed to write {}: {source}", path.display())]
    WriteFailed { path: PathBuf, source: io::Error },

    /// Failed to create a directory.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDirFailed { path: PathBuf, source: io::Error },

    /// Failed to rename the finished partial file into place.
    #[error("failed to rename {} to {}: {source}", from.display(), to.display())]
    RenameFailed {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    /// Reading from the archive byte stream failed mid-transfer.
    #[error("archive stream interrupted for '{archive}': {reason}")]
    StreamInterrupted { archive: String, reason: String },

    /// A resume record could not be encoded.
    #[error("failed to encode resume record for '{archive}': {source}")]
    RecordEncode {
        archive: String,
        source: serde_json::Error,
    },

    /// The server API failed.
    #[error(transparent)]
    Api(#[from] ApiError),
}
