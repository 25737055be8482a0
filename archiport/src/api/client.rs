//! Blocking HTTP client for the photo-management server.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;

use super::error::{ApiError, ApiResult};
use super::types::{ArchivePlan, ArchiveResponse, ExportScope};
use super::{ArchivePlanner, ArchiveStream};

/// Default timeout for planning requests in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 300; // 5 minutes

/// HTTP client for the archive-planning and archive-download endpoints.
///
/// Authenticates every request with the caller-supplied API key. Archive
/// bodies are streamed; planning responses are buffered JSON.
#[derive(Debug)]
pub struct ApiClient {
    client: Client,
    server_url: String,
    api_key: String,
    timeout: Duration,
}

impl ApiClient {
    /// Create a new client for the given server.
    ///
    /// `server_url` is the API base, e.g. `https://photos.example.com/api`.
    pub fn new(server_url: impl Into<String>, api_key: impl Into<String>) -> ApiResult<Self> {
        Self::with_timeout(server_url, api_key, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a new client with a custom request timeout.
    ///
    /// The timeout applies to planning requests only; archive streams use a
    /// connect timeout but no overall deadline, since archives can be
    /// arbitrarily large.
    pub fn with_timeout(
        server_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> ApiResult<Self> {
        let server_url = server_url.into().trim_end_matches('/').to_string();
        // No overall deadline: archive streams can be arbitrarily large.
        // Planning requests get a per-request timeout instead.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| ApiError::Transport {
                url: server_url.clone(),
                reason: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            server_url,
            api_key: api_key.into(),
            timeout,
        })
    }

    /// The server base URL this client talks to.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server_url, path)
    }

    fn map_send_error(&self, url: &str, err: reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Timeout {
                url: url.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            ApiError::Transport {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }

    /// POST a JSON body and decode a JSON response.
    fn post_json(&self, path: &str, body: &serde_json::Value) -> ApiResult<serde_json::Value> {
        let url = self.url(path);
        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("x-api-key", &self.api_key)
            .json(body)
            .send()
            .map_err(|e| self.map_send_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                url,
                status: status.as_u16(),
            });
        }

        response.json().map_err(|e| ApiError::Decode {
            url,
            reason: e.to_string(),
        })
    }

    /// Resolve an album id to its asset id list.
    ///
    /// A response without the expected shape yields an empty list, which
    /// callers collapse to the sentinel empty plan.
    fn album_asset_ids(&self, album_id: &str) -> ApiResult<Vec<String>> {
        #[derive(Deserialize)]
        struct WireAlbum {
            assets: Vec<WireAsset>,
        }

        #[derive(Deserialize)]
        struct WireAsset {
            id: String,
        }

        let url = self.url(&format!("/albums/{}", album_id));
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .header("x-api-key", &self.api_key)
            .send()
            .map_err(|e| self.map_send_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let album: WireAlbum = match response.json() {
            Ok(album) => album,
            Err(_) => return Ok(Vec::new()),
        };

        Ok(album.assets.into_iter().map(|a| a.id).collect())
    }
}

impl ArchivePlanner for ApiClient {
    fn prepare(&self, scope: &ExportScope, max_archive_size_bytes: u64) -> ApiResult<ArchivePlan> {
        if max_archive_size_bytes == 0 {
            return Err(ApiError::InvalidRequest(
                "max archive size must be greater than zero".to_string(),
            ));
        }

        let asset_ids = match scope {
            ExportScope::Assets(ids) => ids.clone(),
            ExportScope::Album(album_id) => self.album_asset_ids(album_id)?,
        };
        if asset_ids.is_empty() {
            return Ok(ArchivePlan::empty());
        }

        let body = serde_json::json!({
            "assetIds": asset_ids,
            "archiveSize": max_archive_size_bytes,
        });
        let value = self.post_json("/download/info", &body)?;
        let plan = ArchivePlan::from_json(&value);
        debug!(
            total_size = plan.total_size,
            archives = plan.archives.len(),
            "export planned"
        );
        Ok(plan)
    }
}

impl ArchiveStream for ApiClient {
    fn open(&self, asset_ids: &[String], offset: Option<u64>) -> ApiResult<ArchiveResponse> {
        let url = self.url("/download/archive");
        let body = serde_json::json!({ "assetIds": asset_ids });

        let mut request = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .json(&body);
        if let Some(offset) = offset {
            request = request.header("Range", format!("bytes={}-", offset));
        }

        let response = request.send().map_err(|e| self.map_send_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let partial = status.as_u16() == 206;
        let content_range = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let content_length = response.content_length();

        Ok(ArchiveResponse {
            body: Box::new(response),
            partial,
            content_range,
            content_length,
        })
    }

    fn server_identity(&self) -> &str {
        &self.server_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_strips_trailing_slash() {
        let client = ApiClient::new("http://server/api/", "key").unwrap();
        assert_eq!(client.server_url(), "http://server/api");
        assert_eq!(client.url("/download/info"), "http://server/api/download/info");
    }

    #[test]
    fn test_prepare_rejects_zero_archive_size() {
        let client = ApiClient::new("http://server/api", "key").unwrap();
        let result = client.prepare(&ExportScope::Assets(vec!["a".to_string()]), 0);
        assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
    }

    #[test]
    fn test_prepare_empty_asset_list_is_sentinel_plan() {
        let client = ApiClient::new("http://server/api", "key").unwrap();
        let plan = client
            .prepare(&ExportScope::Assets(Vec::new()), 1024)
            .unwrap();
        assert!(plan.is_empty());
    }
}
