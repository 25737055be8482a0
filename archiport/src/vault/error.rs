//! Error types for the credential vault.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

/// Errors that can occur while storing or loading cloud targets.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Filesystem access failed.
    #[error("vault I/O failed at {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    /// A cryptographic operation failed.
    #[error("vault crypto operation failed: {0}")]
    Crypto(String),

    /// The on-disk state is unusable.
    #[error("vault is corrupt: {0}")]
    Corrupt(String),

    /// The store could not be serialized.
    #[error("failed to encode vault store: {0}")]
    Encode(#[source] serde_json::Error),

    /// Configuration names must be non-empty.
    #[error("configuration name must not be empty")]
    InvalidName,
}
