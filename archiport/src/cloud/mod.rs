//! Streaming uploads to cloud storage targets.
//!
//! Two backend drivers share one contract:
//!
//! - `webdav` — PROPFIND/MKCOL/PUT over plain HTTP
//! - `s3` — S3-compatible object storage via the AWS SDK, with multipart
//!   uploads above 5 MiB
//!
//! Both consume an [`UploadSource`] (a local file or a live byte stream with
//! a known length) and report progress through a callback whose `false`
//! return is the sole cancellation channel. Uploads are not resumable; a
//! cancelled upload terminates with [`CloudError::Cancelled`].

mod config;
mod error;
mod s3;
mod source;
mod webdav;

pub use config::{AuthMode, CloudTargetConfig, S3Target, WebdavTarget};
pub use error::{CloudError, CloudResult};
pub use s3::{S3Uploader, MULTIPART_THRESHOLD, PART_SIZE};
pub use source::{LocalFileSource, ProgressCallback, StreamSource, UploadSource};
pub use webdav::WebdavUploader;

use tracing::info;

/// Backend-dispatching upload engine.
///
/// Resolves the driver from the target's `type` tag and forwards the shared
/// upload contract to it.
#[derive(Debug, Default)]
pub struct CloudUploadEngine;

impl CloudUploadEngine {
    /// Create the engine.
    pub fn new() -> Self {
        Self
    }

    /// Upload `source` to `target` under the target's remote prefix.
    ///
    /// `remote_file_name` is the file name within the target's configured
    /// remote directory or prefix.
    pub fn upload(
        &self,
        target: &CloudTargetConfig,
        remote_file_name: &str,
        source: Box<dyn UploadSource>,
        progress: ProgressCallback,
    ) -> CloudResult<()> {
        let remote_path = target.remote_path_for(remote_file_name);
        info!(
            backend = target.kind(),
            remote_path = remote_path.as_str(),
            "starting cloud upload"
        );
        match target {
            CloudTargetConfig::Webdav(webdav) => {
                WebdavUploader::new()?.upload(webdav, &remote_path, source, progress)
            }
            CloudTargetConfig::S3(s3) => {
                S3Uploader::new(s3)?.upload(&remote_path, source, progress)
            }
        }
    }

    /// Probe the target for reachability and permissions.
    pub fn test_connection(&self, target: &CloudTargetConfig) -> CloudResult<()> {
        match target {
            CloudTargetConfig::Webdav(webdav) => WebdavUploader::new()?.test_connection(webdav),
            CloudTargetConfig::S3(s3) => S3Uploader::new(s3)?.test_connection(),
        }
    }
}
