//! Data types for export planning and archive streams.

use std::io::Read;

use serde::Deserialize;

/// What an export covers: an explicit asset list or a whole album.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportScope {
    /// Export the given assets.
    Assets(Vec<String>),
    /// Export every asset in the album with the given id.
    Album(String),
}

/// One server-defined partition of an export.
///
/// Produced once by [`ArchivePlanner::prepare`](super::ArchivePlanner::prepare)
/// and treated as immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveDescriptor {
    /// Assets bundled into this archive, in server order.
    pub asset_ids: Vec<String>,
    /// Expected size of the archive in bytes.
    pub byte_size: u64,
    /// Position of this archive within the plan (0-based).
    pub sequence_index: usize,
    /// Number of archives in the plan.
    pub total_in_group: usize,
}

/// A planned export: total size plus the archives it is split into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePlan {
    /// Total size of all archives in bytes.
    pub total_size: u64,
    /// The archives, in download order.
    pub archives: Vec<ArchiveDescriptor>,
}

impl ArchivePlan {
    /// The sentinel plan returned for malformed or empty server responses.
    ///
    /// Callers treat `total_size == 0` as the uniform failure signal.
    pub fn empty() -> Self {
        Self {
            total_size: 0,
            archives: Vec::new(),
        }
    }

    /// Whether this is the sentinel empty plan.
    pub fn is_empty(&self) -> bool {
        self.total_size == 0 || self.archives.is_empty()
    }

    /// Parse a plan from the server's JSON response.
    ///
    /// Any missing or malformed field collapses to [`ArchivePlan::empty`].
    pub fn from_json(value: &serde_json::Value) -> Self {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct WirePlan {
            total_size: u64,
            archives: Vec<WireArchive>,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct WireArchive {
            asset_ids: Vec<String>,
            size: u64,
        }

        let wire: WirePlan = match serde_json::from_value(value.clone()) {
            Ok(wire) => wire,
            Err(_) => return Self::empty(),
        };

        let total_in_group = wire.archives.len();
        Self {
            total_size: wire.total_size,
            archives: wire
                .archives
                .into_iter()
                .enumerate()
                .map(|(sequence_index, a)| ArchiveDescriptor {
                    asset_ids: a.asset_ids,
                    byte_size: a.size,
                    sequence_index,
                    total_in_group,
                })
                .collect(),
        }
    }
}

/// An open archive byte stream plus the headers needed to judge it.
pub struct ArchiveResponse {
    /// The response body. Read to completion in fixed-size chunks.
    pub body: Box<dyn Read + Send>,
    /// True if the server answered `206 Partial Content`.
    pub partial: bool,
    /// Raw `Content-Range` header, if present.
    pub content_range: Option<String>,
    /// `Content-Length` header, if present.
    pub content_length: Option<u64>,
}

impl ArchiveResponse {
    /// Whether the server honored a `Range: bytes=<offset>-` request.
    ///
    /// Honored means an explicit `Content-Range` echoing the offset, or a
    /// body length equal to the requested remainder. Anything else is
    /// treated as a full-body response.
    pub fn range_honored(&self, offset: u64, expected_total: u64) -> bool {
        if let Some(range) = &self.content_range {
            return range
                .trim()
                .strip_prefix("bytes ")
                .map(|r| r.starts_with(&format!("{}-", offset)))
                .unwrap_or(false);
        }
        if let Some(len) = self.content_length {
            return expected_total >= offset && len == expected_total - offset;
        }
        false
    }
}

impl std::fmt::Debug for ArchiveResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveResponse")
            .field("partial", &self.partial)
            .field("content_range", &self.content_range)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn response(
        content_range: Option<&str>,
        content_length: Option<u64>,
        partial: bool,
    ) -> ArchiveResponse {
        ArchiveResponse {
            body: Box::new(Cursor::new(Vec::new())),
            partial,
            content_range: content_range.map(String::from),
            content_length,
        }
    }

    #[test]
    fn test_plan_from_valid_json() {
        let value = serde_json::json!({
            "totalSize": 3145728,
            "archives": [
                {"assetIds": ["a", "b"], "size": 3145728}
            ]
        });

        let plan = ArchivePlan::from_json(&value);

        assert_eq!(plan.total_size, 3_145_728);
        assert_eq!(plan.archives.len(), 1);
        assert_eq!(plan.archives[0].asset_ids, vec!["a", "b"]);
        assert_eq!(plan.archives[0].sequence_index, 0);
        assert_eq!(plan.archives[0].total_in_group, 1);
        assert!(!plan.is_empty());
    }

    #[test]
    fn test_plan_from_multi_archive_json_indexes_in_order() {
        let value = serde_json::json!({
            "totalSize": 200,
            "archives": [
                {"assetIds": ["a"], "size": 100},
                {"assetIds": ["b"], "size": 100}
            ]
        });

        let plan = ArchivePlan::from_json(&value);

        assert_eq!(plan.archives[0].sequence_index, 0);
        assert_eq!(plan.archives[1].sequence_index, 1);
        assert_eq!(plan.archives[1].total_in_group, 2);
    }

    #[test]
    fn test_plan_from_malformed_json_is_sentinel() {
        for value in [
            serde_json::json!({}),
            serde_json::json!({"totalSize": "huge"}),
            serde_json::json!({"totalSize": 100}),
            serde_json::json!({"archives": []}),
            serde_json::json!(null),
        ] {
            let plan = ArchivePlan::from_json(&value);
            assert_eq!(plan, ArchivePlan::empty(), "input: {}", value);
            assert!(plan.is_empty());
        }
    }

    #[test]
    fn test_range_honored_via_content_range() {
        let resp = response(Some("bytes 1024-2047/2048"), Some(1024), true);
        assert!(resp.range_honored(1024, 2048));
        assert!(!resp.range_honored(512, 2048));
    }

    #[test]
    fn test_range_honored_via_body_length() {
        let resp = response(None, Some(1024), false);
        assert!(resp.range_honored(1024, 2048));
    }

    #[test]
    fn test_range_not_honored_for_full_body() {
        let resp = response(None, Some(2048), false);
        assert!(!resp.range_honored(1024, 2048));
    }

    #[test]
    fn test_range_not_honored_without_headers() {
        let resp = response(None, None, false);
        assert!(!resp.range_honored(1024, 2048));
    }
}
