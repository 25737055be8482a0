//! Client for the remote photo-management server.
//!
//! This module provides the archive-planning and archive-download surface of
//! the remote server:
//!
//! - Export planning (`POST /download/info`) via [`ArchivePlanner`]
//! - Album scope resolution (`GET /albums/{id}`)
//! - Binary archive streams (`POST /download/archive`) via [`ArchiveStream`],
//!   with optional `Range` requests for resumption
//!
//! The engines downstream only ever talk to the two traits, never to
//! `reqwest` directly. [`ApiClient`] is the production implementation; tests
//! substitute in-memory fakes.

mod client;
mod error;
mod types;

pub use client::ApiClient;
pub use error::{ApiError, ApiResult};
pub use types::{ArchiveDescriptor, ArchivePlan, ArchiveResponse, ExportScope};

/// Plans an export into one or more archive descriptors.
pub trait ArchivePlanner: Send + Sync {
    /// Ask the server to partition the export into archives no larger than
    /// `max_archive_size_bytes`.
    ///
    /// A malformed or incomplete server response yields the sentinel empty
    /// plan (`total_size == 0`) rather than an error; transport failures
    /// propagate.
    fn prepare(&self, scope: &ExportScope, max_archive_size_bytes: u64) -> ApiResult<ArchivePlan>;
}

/// Opens binary archive streams.
pub trait ArchiveStream: Send + Sync {
    /// Open an archive stream for the given assets.
    ///
    /// When `offset` is set, a `Range: bytes=<offset>-` header is sent. The
    /// caller must verify from the returned [`ArchiveResponse`] whether the
    /// server actually honored the range.
    fn open(&self, asset_ids: &[String], offset: Option<u64>) -> ApiResult<ArchiveResponse>;

    /// Identity of the server behind this stream, used as the key in the
    /// range-capability cache.
    fn server_identity(&self) -> &str;
}

/// Combined server surface needed by the orchestrator.
pub trait ArchiveApi: ArchivePlanner + ArchiveStream {}

impl<T: ArchivePlanner + ArchiveStream> ArchiveApi for T {}
