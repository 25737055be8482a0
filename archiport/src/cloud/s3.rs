//! S3-compatible upload driver.
//!
//! Built on the official AWS SDK, pointed at any S3-compatible endpoint
//! (AWS, MinIO, ...) via `endpoint_url` + path-style addressing. Payloads at
//! or below 5 MiB go up in a single `PutObject`; larger payloads use a
//! multipart upload whose parts are read from the source one at a time, so
//! only one part's worth of bytes is ever buffered. A failed part aborts the
//! multipart upload before the error surfaces, leaving no orphaned
//! provider-side state.
//!
//! The SDK is async; the driver owns a current-thread tokio runtime and
//! blocks on each call, which keeps the rest of the pipeline synchronous.

use std::io::Read;

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use tracing::{debug, info, warn};

use super::config::S3Target;
use super::error::{CloudError, CloudResult};
use super::source::{ProgressCallback, UploadMeter, UploadSource};

/// Payloads above this size use multipart upload (5 MiB).
pub const MULTIPART_THRESHOLD: u64 = 5 * 1024 * 1024;

/// Size of each multipart part (5 MiB, the S3 minimum for non-final parts).
pub const PART_SIZE: usize = 5 * 1024 * 1024;

/// Read granularity when pulling bytes from the source (64 KiB).
const READ_CHUNK: usize = 64 * 1024;

/// Whether a payload of this size takes the multipart path.
pub(crate) fn uses_multipart(total_size: u64) -> bool {
    total_size > MULTIPART_THRESHOLD
}

/// Read up to `limit` bytes from the source, metering progress.
///
/// Returns fewer bytes only at end of stream. Cancellation requested through
/// the meter surfaces as [`CloudError::Cancelled`].
pub(crate) fn read_part(
    source: &mut dyn UploadSource,
    limit: usize,
    meter: &mut UploadMeter,
) -> CloudResult<Vec<u8>> {
    let mut part = Vec::with_capacity(limit.min(PART_SIZE));
    let mut buffer = vec![0u8; READ_CHUNK];
    while part.len() < limit {
        let want = READ_CHUNK.min(limit - part.len());
        let read = source
            .read(&mut buffer[..want])
            .map_err(|e| CloudError::Source(e.to_string()))?;
        if read == 0 {
            break;
        }
        part.extend_from_slice(&buffer[..read]);
        if !meter.tick(read) {
            return Err(CloudError::Cancelled);
        }
    }
    Ok(part)
}

/// Map a known S3 service error code to a classified error.
fn classify_service_code(code: &str, bucket: &str, resource: &str) -> Option<CloudError> {
    match code {
        "NoSuchBucket" | "NotFound" => Some(CloudError::BucketNotFound {
            bucket: bucket.to_string(),
        }),
        "AccessDenied" | "Forbidden" => Some(CloudError::AccessDenied {
            resource: resource.to_string(),
        }),
        "InvalidAccessKeyId" | "SignatureDoesNotMatch" => Some(CloudError::Auth {
            resource: resource.to_string(),
        }),
        _ => None,
    }
}

/// Classify an SDK error for user messaging.
fn classify<E, R>(err: SdkError<E, R>, bucket: &str, resource: &str) -> CloudError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let reason = format!("{}", DisplayErrorContext(&err));

    if let Some(classified) = err
        .code()
        .and_then(|code| classify_service_code(code, bucket, resource))
    {
        return classified;
    }

    match &err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => CloudError::Connection {
            url: resource.to_string(),
            reason,
        },
        _ => CloudError::Upload {
            remote_path: resource.to_string(),
            reason,
        },
    }
}

/// S3-compatible upload driver bound to one target.
#[derive(Debug)]
pub struct S3Uploader {
    client: Client,
    runtime: tokio::runtime::Runtime,
    bucket: String,
}

impl S3Uploader {
    /// Create a driver for the given target.
    pub fn new(target: &S3Target) -> CloudResult<Self> {
        if target.endpoint_url.trim().is_empty() {
            return Err(CloudError::InvalidConfig(
                "S3 endpoint URL must not be empty".to_string(),
            ));
        }
        if target.bucket.trim().is_empty() {
            return Err(CloudError::InvalidConfig(
                "S3 bucket name must not be empty".to_string(),
            ));
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                CloudError::InvalidConfig(format!("failed to create async runtime: {}", e))
            })?;

        let credentials = Credentials::new(
            target.access_key.clone(),
            target.secret_key.clone(),
            None,
            None,
            "archiport",
        );
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(target.region.clone()))
            .endpoint_url(&target.endpoint_url)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(config),
            runtime,
            bucket: target.bucket.clone(),
        })
    }

    /// Probe the bucket with `HeadBucket`.
    pub fn test_connection(&self) -> CloudResult<()> {
        let result = self
            .runtime
            .block_on(self.client.head_bucket().bucket(&self.bucket).send());
        match result {
            Ok(_) => {
                debug!(bucket = self.bucket.as_str(), "bucket is accessible");
                Ok(())
            }
            Err(err) => {
                if err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                {
                    return Err(CloudError::BucketNotFound {
                        bucket: self.bucket.clone(),
                    });
                }
                Err(classify(err, &self.bucket, &self.bucket))
            }
        }
    }

    /// Upload a source to `remote_path` in the bucket.
    pub fn upload(
        &self,
        remote_path: &str,
        mut source: Box<dyn UploadSource>,
        progress: ProgressCallback,
    ) -> CloudResult<()> {
        let total = source.total_size();
        if total == 0 {
            return Err(CloudError::Source(
                "cannot upload a zero-length payload".to_string(),
            ));
        }
        let mut meter = UploadMeter::new(progress, total);

        if uses_multipart(total) {
            self.multipart_upload(remote_path, source.as_mut(), &mut meter)
        } else {
            self.single_put(remote_path, source.as_mut(), &mut meter, total)
        }
    }

    /// Buffer the whole payload and send one `PutObject`.
    fn single_put(
        &self,
        key: &str,
        source: &mut dyn UploadSource,
        meter: &mut UploadMeter,
        total: u64,
    ) -> CloudResult<()> {
        let data = read_part(source, total as usize, meter)?;
        self.runtime
            .block_on(
                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .body(ByteStream::from(data))
                    .send(),
            )
            .map_err(|e| classify(e, &self.bucket, key))?;
        info!(key, bytes = meter.sent(), "S3 upload completed");
        Ok(())
    }

    /// Multipart upload: create, stream parts, complete; abort on failure.
    fn multipart_upload(
        &self,
        key: &str,
        source: &mut dyn UploadSource,
        meter: &mut UploadMeter,
    ) -> CloudResult<()> {
        let create = self
            .runtime
            .block_on(
                self.client
                    .create_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .send(),
            )
            .map_err(|e| classify(e, &self.bucket, key))?;
        let upload_id = create
            .upload_id()
            .ok_or_else(|| CloudError::Upload {
                remote_path: key.to_string(),
                reason: "server returned no multipart upload id".to_string(),
            })?
            .to_string();

        match self.upload_parts(key, &upload_id, source, meter) {
            Ok(parts) => {
                let completed = CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build();
                self.runtime
                    .block_on(
                        self.client
                            .complete_multipart_upload()
                            .bucket(&self.bucket)
                            .key(key)
                            .upload_id(&upload_id)
                            .multipart_upload(completed)
                            .send(),
                    )
                    .map_err(|e| classify(e, &self.bucket, key))?;
                info!(key, bytes = meter.sent(), "S3 multipart upload completed");
                Ok(())
            }
            Err(e) => {
                // Abort so the provider does not accumulate orphaned parts.
                if let Err(abort_err) = self.runtime.block_on(
                    self.client
                        .abort_multipart_upload()
                        .bucket(&self.bucket)
                        .key(key)
                        .upload_id(&upload_id)
                        .send(),
                ) {
                    warn!(
                        key,
                        error = %DisplayErrorContext(&abort_err),
                        "failed to abort multipart upload"
                    );
                }
                Err(e)
            }
        }
    }

    fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        source: &mut dyn UploadSource,
        meter: &mut UploadMeter,
    ) -> CloudResult<Vec<CompletedPart>> {
        let mut parts = Vec::new();
        let mut part_number: i32 = 1;
        loop {
            let chunk = read_part(source, PART_SIZE, meter)?;
            if chunk.is_empty() {
                break;
            }
            let bytes = chunk.len();
            let response = self
                .runtime
                .block_on(
                    self.client
                        .upload_part()
                        .bucket(&self.bucket)
                        .key(key)
                        .upload_id(upload_id)
                        .part_number(part_number)
                        .body(ByteStream::from(chunk))
                        .send(),
                )
                .map_err(|e| classify(e, &self.bucket, key))?;

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(response.e_tag().map(str::to_owned))
                    .part_number(part_number)
                    .build(),
            );
            debug!(key, part_number, bytes, "uploaded part");
            part_number += 1;
        }
        Ok(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::source::StreamSource;
    use std::io::Cursor;

    fn meter(cancel_after: Option<u64>) -> UploadMeter {
        let progress: ProgressCallback = match cancel_after {
            Some(limit) => Box::new(move |_pct, bytes, _total, _speed| bytes < limit),
            None => Box::new(|_, _, _, _| true),
        };
        UploadMeter::new(progress, 6 * 1024 * 1024)
    }

    fn stream_of(len: usize) -> Box<dyn UploadSource> {
        Box::new(StreamSource::new(
            Box::new(Cursor::new(vec![9u8; len])),
            len as u64,
        ))
    }

    #[test]
    fn test_multipart_threshold_boundary() {
        assert!(!uses_multipart(MULTIPART_THRESHOLD));
        assert!(uses_multipart(MULTIPART_THRESHOLD + 1));
    }

    #[test]
    fn test_read_part_splits_six_mib_into_two_parts() {
        let mut source = stream_of(6 * 1024 * 1024);
        let mut meter = meter(None);

        let first = read_part(source.as_mut(), PART_SIZE, &mut meter).unwrap();
        let second = read_part(source.as_mut(), PART_SIZE, &mut meter).unwrap();
        let third = read_part(source.as_mut(), PART_SIZE, &mut meter).unwrap();

        assert_eq!(first.len(), PART_SIZE);
        assert_eq!(second.len(), 1024 * 1024);
        assert!(third.is_empty());
        assert!(first.len() <= PART_SIZE && second.len() <= PART_SIZE);
        assert_eq!(meter.sent(), 6 * 1024 * 1024);
    }

    #[test]
    fn test_read_part_cancellation() {
        let mut source = stream_of(2 * 1024 * 1024);
        // The gate admits the first tick, so the callback sees the first
        // 64 KiB and rejects anything past it.
        let mut meter = meter(Some(1));

        let result = read_part(source.as_mut(), PART_SIZE, &mut meter);
        assert!(matches!(result, Err(CloudError::Cancelled)));
        assert!(meter.was_cancelled());
    }

    #[test]
    fn test_classify_service_codes() {
        assert!(matches!(
            classify_service_code("NoSuchBucket", "exports", "k"),
            Some(CloudError::BucketNotFound { bucket }) if bucket == "exports"
        ));
        assert!(matches!(
            classify_service_code("AccessDenied", "exports", "k"),
            Some(CloudError::AccessDenied { .. })
        ));
        assert!(matches!(
            classify_service_code("InvalidAccessKeyId", "exports", "k"),
            Some(CloudError::Auth { .. })
        ));
        assert!(classify_service_code("SlowDown", "exports", "k").is_none());
    }

    #[test]
    fn test_new_rejects_blank_config() {
        let target = S3Target {
            display_name: String::new(),
            endpoint_url: String::new(),
            region: "us-east-1".to_string(),
            access_key: "k".to_string(),
            secret_key: "s".to_string(),
            bucket: "b".to_string(),
            remote_prefix: String::new(),
            created_at: None,
            updated_at: None,
        };
        assert!(matches!(
            S3Uploader::new(&target),
            Err(CloudError::InvalidConfig(_))
        ));
    }
}
