//! Cloud target configuration records.
//!
//! A target is a named destination for archive uploads, selected by its
//! `type` tag at configuration-load time. Secret fields (`password`,
//! `secret_key`) are stored encrypted by the credential vault and only ever
//! decrypted in memory for one operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authentication mode for WebDAV targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// HTTP Basic authentication (username + password).
    #[default]
    Basic,
    /// Bearer token authentication (password field holds the token).
    Bearer,
}

/// A WebDAV upload target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebdavTarget {
    /// Human-readable label shown in listings.
    #[serde(default)]
    pub display_name: String,
    /// Server base URL, e.g. `https://dav.example.com/remote.php/dav/files/user`.
    pub url: String,
    /// Username for basic auth.
    #[serde(default)]
    pub username: String,
    /// Password or bearer token. Encrypted at rest.
    #[serde(default)]
    pub password: String,
    /// Authentication mode.
    #[serde(default)]
    pub auth_type: AuthMode,
    /// Directory under the base URL to place archives in. May be empty.
    #[serde(default)]
    pub remote_directory: String,
    /// When the record was first saved.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// When the record was last saved.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// An S3-compatible upload target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct S3Target {
    /// Human-readable label shown in listings.
    #[serde(default)]
    pub display_name: String,
    /// Endpoint URL, e.g. `https://s3.example.com` or a MinIO address.
    pub endpoint_url: String,
    /// Signing region. Many S3-compatible services accept any value.
    #[serde(default = "default_region")]
    pub region: String,
    /// Access key id.
    pub access_key: String,
    /// Secret access key. Encrypted at rest.
    #[serde(default)]
    pub secret_key: String,
    /// Bucket receiving the archives.
    pub bucket: String,
    /// Key prefix under the bucket. May be empty.
    #[serde(default)]
    pub remote_prefix: String,
    /// When the record was first saved.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// When the record was last saved.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A cloud target, selected by its `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CloudTargetConfig {
    /// WebDAV server.
    Webdav(WebdavTarget),
    /// S3-compatible object storage.
    S3(S3Target),
}

impl CloudTargetConfig {
    /// The backend tag, as it appears in the stored record.
    pub fn kind(&self) -> &'static str {
        match self {
            CloudTargetConfig::Webdav(_) => "webdav",
            CloudTargetConfig::S3(_) => "s3",
        }
    }

    /// The label to show for this target.
    ///
    /// Falls back to a generated `kind (who@where)` label when no display
    /// name was configured.
    pub fn display_name(&self) -> String {
        let custom = match self {
            CloudTargetConfig::Webdav(t) => t.display_name.trim(),
            CloudTargetConfig::S3(t) => t.display_name.trim(),
        };
        if !custom.is_empty() {
            return custom.to_string();
        }
        match self {
            CloudTargetConfig::Webdav(t) => match host_of(&t.url) {
                Some(host) => format!("WebDAV ({}@{})", t.username, host),
                None => "WebDAV".to_string(),
            },
            CloudTargetConfig::S3(t) => match host_of(&t.endpoint_url) {
                Some(host) => format!("S3 ({}@{})", t.bucket, host),
                None => "S3".to_string(),
            },
        }
    }

    /// The remote path for a file name, under the configured directory or
    /// prefix.
    pub fn remote_path_for(&self, file_name: &str) -> String {
        let prefix = match self {
            CloudTargetConfig::Webdav(t) => t.remote_directory.trim_matches('/'),
            CloudTargetConfig::S3(t) => t.remote_prefix.trim_matches('/'),
        };
        if prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", prefix, file_name)
        }
    }

    /// The secret field of this target (password or secret key).
    pub fn secret(&self) -> &str {
        match self {
            CloudTargetConfig::Webdav(t) => &t.password,
            CloudTargetConfig::S3(t) => &t.secret_key,
        }
    }

    /// Replace the secret field of this target.
    pub fn set_secret(&mut self, value: String) {
        match self {
            CloudTargetConfig::Webdav(t) => t.password = value,
            CloudTargetConfig::S3(t) => t.secret_key = value,
        }
    }

    /// Stamp creation/update times, preserving an earlier creation time.
    pub fn touch(&mut self, created_at: Option<DateTime<Utc>>) {
        let now = Utc::now();
        let (created, updated) = match self {
            CloudTargetConfig::Webdav(t) => (&mut t.created_at, &mut t.updated_at),
            CloudTargetConfig::S3(t) => (&mut t.created_at, &mut t.updated_at),
        };
        *created = created_at.or(Some(now));
        *updated = Some(now);
    }

    /// Creation timestamp, if stamped.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        match self {
            CloudTargetConfig::Webdav(t) => t.created_at,
            CloudTargetConfig::S3(t) => t.created_at,
        }
    }

    /// Last-update timestamp, if stamped.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        match self {
            CloudTargetConfig::Webdav(t) => t.updated_at,
            CloudTargetConfig::S3(t) => t.updated_at,
        }
    }
}

fn host_of(url: &str) -> Option<String> {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(String::from))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webdav() -> CloudTargetConfig {
        CloudTargetConfig::Webdav(WebdavTarget {
            display_name: String::new(),
            url: "https://dav.example.com/files".to_string(),
            username: "anna".to_string(),
            password: "secret".to_string(),
            auth_type: AuthMode::Basic,
            remote_directory: "/photos/exports/".to_string(),
            created_at: None,
            updated_at: None,
        })
    }

    fn s3() -> CloudTargetConfig {
        CloudTargetConfig::S3(S3Target {
            display_name: String::new(),
            endpoint_url: "https://minio.example.com:9000".to_string(),
            region: "us-east-1".to_string(),
            access_key: "AKIA".to_string(),
            secret_key: "shh".to_string(),
            bucket: "exports".to_string(),
            remote_prefix: String::new(),
            created_at: None,
            updated_at: None,
        })
    }

    #[test]
    fn test_serde_tag_round_trip() {
        let json = serde_json::to_value(webdav()).unwrap();
        assert_eq!(json["type"], "webdav");
        let back: CloudTargetConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, webdav());

        let json = serde_json::to_value(s3()).unwrap();
        assert_eq!(json["type"], "s3");
        assert_eq!(json["bucket"], "exports");
    }

    #[test]
    fn test_remote_path_for_trims_separators() {
        assert_eq!(webdav().remote_path_for("june.zip"), "photos/exports/june.zip");
        assert_eq!(s3().remote_path_for("june.zip"), "june.zip");
    }

    #[test]
    fn test_display_name_fallback() {
        assert_eq!(webdav().display_name(), "WebDAV (anna@dav.example.com)");
        assert_eq!(s3().display_name(), "S3 (exports@minio.example.com)");

        let mut named = webdav();
        if let CloudTargetConfig::Webdav(t) = &mut named {
            t.display_name = "Home NAS".to_string();
        }
        assert_eq!(named.display_name(), "Home NAS");
    }

    #[test]
    fn test_secret_accessors() {
        let mut target = s3();
        assert_eq!(target.secret(), "shh");
        target.set_secret("encrypted-blob".to_string());
        assert_eq!(target.secret(), "encrypted-blob");
    }

    #[test]
    fn test_touch_preserves_creation_time() {
        let mut target = webdav();
        target.touch(None);
        let created = target.created_at().unwrap();

        let mut updated = target.clone();
        updated.touch(target.created_at());
        assert_eq!(updated.created_at().unwrap(), created);
        assert!(updated.updated_at().unwrap() >= created);
    }
}
