//! WebDAV upload driver.
//!
//! Speaks plain HTTP: `PROPFIND` to probe, `MKCOL` to create directories,
//! one streaming `PUT` per archive, `HEAD` to verify sizes. Connection-level
//! failures on the idempotent probe methods are retried with capped backoff;
//! application-level 4xx/5xx surface immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Body, Client, RequestBuilder, Response};
use reqwest::{Method, StatusCode};
use tracing::{debug, info, warn};

use super::config::{AuthMode, WebdavTarget};
use super::error::{CloudError, CloudResult};
use super::source::{MeteredReader, ProgressCallback, UploadMeter, UploadSource};

/// Attempts for idempotent probe requests.
const MAX_ATTEMPTS: u32 = 3;

/// Backoff ceiling between retries.
const MAX_BACKOFF: Duration = Duration::from_secs(4);

/// Timeout for probe requests (PROPFIND/MKCOL/HEAD).
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Minimal PROPFIND body asking for the display name only.
const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:propfind xmlns:D="DAV:"><D:prop><D:displayname/></D:prop></D:propfind>"#;

/// Statuses that count as a successful PUT.
const PUT_OK: [u16; 4] = [200, 201, 204, 207];

fn propfind() -> Method {
    Method::from_bytes(b"PROPFIND").expect("valid method name")
}

fn mkcol() -> Method {
    Method::from_bytes(b"MKCOL").expect("valid method name")
}

/// Join a base URL and a remote path with exactly one separator.
fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// The directory chain leading to (and including) `path`.
///
/// `"a/b/c"` yields `["a", "a/b", "a/b/c"]`; MKCOL only creates one level at
/// a time.
fn directory_chain(path: &str) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = String::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if !current.is_empty() {
            current.push('/');
        }
        current.push_str(segment);
        chain.push(current.clone());
    }
    chain
}

/// WebDAV upload driver.
#[derive(Debug)]
pub struct WebdavUploader {
    client: Client,
}

impl WebdavUploader {
    /// Create the driver.
    ///
    /// The client carries a connect timeout but no overall deadline, since
    /// archive uploads can run for a long time.
    pub fn new() -> CloudResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| CloudError::InvalidConfig(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn authed(&self, request: RequestBuilder, target: &WebdavTarget) -> RequestBuilder {
        match target.auth_type {
            AuthMode::Basic => request.basic_auth(&target.username, Some(&target.password)),
            AuthMode::Bearer => request.bearer_auth(&target.password),
        }
    }

    /// Send a probe request, retrying connection-level failures.
    fn send_probe(
        &self,
        url: &str,
        build: impl Fn() -> RequestBuilder,
    ) -> CloudResult<Response> {
        let mut delay = Duration::from_secs(1);
        let mut last_error = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            match build().timeout(PROBE_TIMEOUT).send() {
                Ok(response) => return Ok(response),
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < MAX_ATTEMPTS {
                        debug!(url, attempt, error = %last_error, "probe failed, retrying");
                        thread::sleep(delay);
                        delay = (delay * 2).min(MAX_BACKOFF);
                    }
                }
            }
        }
        Err(CloudError::Connection {
            url: url.to_string(),
            reason: last_error,
        })
    }

    /// Probe the server with a `PROPFIND Depth: 0` on the base URL.
    pub fn test_connection(&self, target: &WebdavTarget) -> CloudResult<()> {
        let url = join_url(&target.url, "");
        let response = self.send_probe(&url, || {
            self.authed(
                self.client
                    .request(propfind(), &url)
                    .header("Depth", "0")
                    .header("Content-Type", "application/xml")
                    .body(PROPFIND_BODY),
                target,
            )
        })?;

        match response.status().as_u16() {
            200 | 207 => Ok(()),
            401 => Err(CloudError::Auth {
                resource: url.clone(),
            }),
            403 => Err(CloudError::AccessDenied {
                resource: url.clone(),
            }),
            404 => Err(CloudError::Connection {
                url,
                reason: "no WebDAV endpoint at this URL (HTTP 404)".to_string(),
            }),
            status => Err(CloudError::Connection {
                url,
                reason: format!("unexpected HTTP {}", status),
            }),
        }
    }

    /// Ensure the remote directory chain exists.
    ///
    /// Existing directories are detected with PROPFIND; missing levels are
    /// created one MKCOL at a time. `405` (already exists) counts as
    /// success, so repeated calls are idempotent.
    pub fn ensure_directory(&self, target: &WebdavTarget, directory: &str) -> CloudResult<()> {
        for level in directory_chain(directory) {
            let url = format!("{}/", join_url(&target.url, &level));

            let probe = self.send_probe(&url, || {
                self.authed(
                    self.client.request(propfind(), &url).header("Depth", "0"),
                    target,
                )
            })?;
            if probe.status().is_success() {
                continue;
            }
            if probe.status() == StatusCode::UNAUTHORIZED {
                return Err(CloudError::Auth { resource: url });
            }

            let response =
                self.send_probe(&url, || self.authed(self.client.request(mkcol(), &url), target))?;
            match response.status().as_u16() {
                201 | 207 | 405 => {
                    debug!(directory = level.as_str(), "remote directory ensured");
                }
                401 => return Err(CloudError::Auth { resource: url }),
                403 => return Err(CloudError::AccessDenied { resource: url }),
                status => {
                    return Err(CloudError::DirectoryCreate {
                        path: level,
                        reason: format!("MKCOL returned HTTP {}", status),
                    })
                }
            }
        }
        Ok(())
    }

    /// Upload a source to `remote_path` under the target's base URL.
    ///
    /// Parent directories are created first. The body streams straight from
    /// the source; the progress callback is invoked at a bounded rate and
    /// its `false` return cancels the transfer.
    pub fn upload(
        &self,
        target: &WebdavTarget,
        remote_path: &str,
        source: Box<dyn UploadSource>,
        progress: ProgressCallback,
    ) -> CloudResult<()> {
        let total = source.total_size();
        let verify_local = source.is_local_file().then_some(total);
        let url = join_url(&target.url, remote_path);

        if let Some((parent, _file)) = remote_path.rsplit_once('/') {
            self.ensure_directory(target, parent)?;
        }

        info!(url = url.as_str(), total, "starting WebDAV PUT");
        let cancel_note = Arc::new(AtomicBool::new(false));
        let reader = MeteredReader::new(
            source,
            UploadMeter::new(progress, total),
            Arc::clone(&cancel_note),
        );

        let response = self
            .authed(
                self.client
                    .put(&url)
                    .header("Content-Type", "application/octet-stream")
                    .body(Body::sized(reader, total)),
                target,
            )
            .send();

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                if cancel_note.load(Ordering::SeqCst) {
                    info!(url = url.as_str(), "WebDAV upload cancelled");
                    return Err(CloudError::Cancelled);
                }
                return Err(CloudError::Connection {
                    url,
                    reason: e.to_string(),
                });
            }
        };

        let status = response.status().as_u16();
        if !PUT_OK.contains(&status) {
            return match status {
                401 => Err(CloudError::Auth { resource: url }),
                403 => Err(CloudError::AccessDenied { resource: url }),
                _ => Err(CloudError::Upload {
                    remote_path: remote_path.to_string(),
                    reason: format!("PUT returned HTTP {}", status),
                }),
            };
        }

        if let Some(local_size) = verify_local {
            self.verify_remote_size(target, &url, remote_path, local_size)?;
        }

        info!(url = url.as_str(), "WebDAV upload completed");
        Ok(())
    }

    /// Best-effort size check after a local-file upload.
    ///
    /// An unreachable HEAD endpoint is not a failure; a reachable one that
    /// reports a different size is.
    fn verify_remote_size(
        &self,
        target: &WebdavTarget,
        url: &str,
        remote_path: &str,
        local_size: u64,
    ) -> CloudResult<()> {
        let response = match self.send_probe(url, || self.authed(self.client.head(url), target)) {
            Ok(response) if response.status().is_success() => response,
            Ok(_) | Err(_) => {
                warn!(url, "could not verify uploaded size, skipping check");
                return Ok(());
            }
        };

        let remote_size = response
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());

        match remote_size {
            Some(remote) if remote != local_size => Err(CloudError::SizeMismatch {
                remote_path: remote_path.to_string(),
                local: local_size,
                remote,
            }),
            _ => Ok(()),
        }
    }
}
