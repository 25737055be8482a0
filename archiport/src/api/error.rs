//! Error types for the server API client.

use thiserror::Error;

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors that can occur while talking to the photo-management server.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request was rejected before it was sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The request could not be completed at the transport level.
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    /// The request timed out.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    /// The server answered with a non-success status.
    #[error("server returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// The response body could not be decoded.
    #[error("failed to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display_names_url_and_code() {
        let err = ApiError::Status {
            url: "http://server/download/info".to_string(),
            status: 401,
        };
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("/download/info"));
    }
}
