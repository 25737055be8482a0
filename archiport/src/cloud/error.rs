//! Error types for cloud storage operations.

use thiserror::Error;

/// Result type for cloud storage operations.
pub type CloudResult<T> = Result<T, CloudError>;

/// Errors that can occur while talking to a cloud storage target.
///
/// Storage failures are classified so user-facing messages can point at a
/// likely remediation rather than a raw provider response.
#[derive(Debug, Error)]
pub enum CloudError {
    /// The target configuration is unusable.
    #[error("invalid cloud target configuration: {0}")]
    InvalidConfig(String),

    /// The target could not be reached at the transport level.
    #[error("connection to {url} failed: {reason} - check the URL and network connectivity")]
    Connection { url: String, reason: String },

    /// The target rejected the credentials.
    #[error("authentication failed for {resource} - check username/access key and secret")]
    Auth { resource: String },

    /// The credentials are valid but lack permission.
    #[error("access denied to {resource} - check credentials and permissions")]
    AccessDenied { resource: String },

    /// The configured bucket does not exist.
    #[error("bucket '{bucket}' not found - check the bucket name")]
    BucketNotFound { bucket: String },

    /// A remote directory could not be created.
    #[error("failed to create remote directory '{path}': {reason}")]
    DirectoryCreate { path: String, reason: String },

    /// The upload itself failed.
    #[error("upload of '{remote_path}' failed: {reason}")]
    Upload { remote_path: String, reason: String },

    /// The upload source could not be read.
    #[error("failed to read upload source: {0}")]
    Source(String),

    /// The remote reports a different size than was sent.
    #[error(
        "size mismatch after uploading '{remote_path}': local {local} bytes, remote {remote} bytes"
    )]
    SizeMismatch {
        remote_path: String,
        local: u64,
        remote: u64,
    },

    /// The progress callback requested cancellation.
    #[error("upload cancelled by user")]
    Cancelled,
}

impl CloudError {
    /// Whether this error is the cooperative-cancellation outcome.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CloudError::Cancelled)
    }
}
