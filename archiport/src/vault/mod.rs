//! Encrypted at-rest storage for cloud target configurations.
//!
//! Targets are stored as one JSON document keyed by configuration name.
//! Secret fields (WebDAV password, S3 secret key) are AES-256-GCM encrypted
//! with a symmetric key generated once and kept next to the store; the rest
//! of the record stays readable for listings. Key and store files are
//! written with owner-only permissions, and the store is replaced with a
//! whole-file atomic write so a crash can never leave it half-written.
//!
//! Key rotation is deliberately out of scope: one long-lived local key,
//! decrypt in memory per operation.

mod error;

pub use error::{VaultError, VaultResult};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use rand::RngCore;
use tracing::{debug, warn};

use crate::cloud::CloudTargetConfig;

/// File holding the generated symmetric key.
const KEY_FILE: &str = ".encryption_key";

/// File holding all target records.
const CONFIG_FILE: &str = "configurations.json";

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Listing entry for a stored target, without secrets.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSummary {
    /// Configuration name (the storage key).
    pub name: String,
    /// Backend tag (`webdav` or `s3`).
    pub kind: String,
    /// Label to display.
    pub display_name: String,
    /// When the record was first saved.
    pub created_at: Option<DateTime<Utc>>,
    /// When the record was last saved.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Encrypted store of named cloud targets.
#[derive(Debug)]
pub struct CredentialVault {
    dir: PathBuf,
    key: [u8; 32],
}

impl CredentialVault {
    /// Open the vault at `dir`, generating the encryption key on first use.
    pub fn open(dir: impl Into<PathBuf>) -> VaultResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| VaultError::Io {
            path: dir.clone(),
            source: e,
        })?;

        let key_path = dir.join(KEY_FILE);
        let key = if key_path.exists() {
            let bytes = fs::read(&key_path).map_err(|e| VaultError::Io {
                path: key_path.clone(),
                source: e,
            })?;
            let key: [u8; 32] = bytes
                .try_into()
                .map_err(|_| VaultError::Corrupt("encryption key has wrong length".to_string()))?;
            key
        } else {
            let mut key = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut key);
            write_private(&key_path, &key)?;
            debug!(path = %key_path.display(), "generated new vault key");
            key
        };

        Ok(Self { dir, key })
    }

    fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    fn encrypt(&self, plaintext: &str) -> VaultResult<String> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| VaultError::Crypto("encryption failed".to_string()))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(combined))
    }

    /// Decrypt a stored secret. Undecryptable data yields an empty string so
    /// a damaged record can still be listed and repaired by re-saving.
    fn decrypt(&self, encoded: &str) -> String {
        let Ok(combined) = BASE64.decode(encoded) else {
            return String::new();
        };
        if combined.len() <= NONCE_LEN {
            return String::new();
        }
        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let Ok(plaintext) = cipher.decrypt(Nonce::from_slice(nonce_bytes), ciphertext) else {
            warn!("failed to decrypt stored secret, returning empty");
            return String::new();
        };
        String::from_utf8(plaintext).unwrap_or_default()
    }

    fn load_all_raw(&self) -> BTreeMap<String, CloudTargetConfig> {
        let Ok(bytes) = fs::read(self.config_path()) else {
            return BTreeMap::new();
        };
        match serde_json::from_slice(&bytes) {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, "cloud target store is unreadable, treating as empty");
                BTreeMap::new()
            }
        }
    }

    fn write_all(&self, configs: &BTreeMap<String, CloudTargetConfig>) -> VaultResult<()> {
        let json = serde_json::to_vec_pretty(configs).map_err(VaultError::Encode)?;
        write_private(&self.config_path(), &json)
    }

    /// Save (or overwrite) a named target.
    ///
    /// The secret field is encrypted before anything touches disk; creation
    /// time is preserved across overwrites.
    pub fn save(&self, name: &str, mut config: CloudTargetConfig) -> VaultResult<()> {
        if name.trim().is_empty() {
            return Err(VaultError::InvalidName);
        }

        let mut configs = self.load_all_raw();
        let created_at = configs.get(name).and_then(|existing| existing.created_at());

        let encrypted = self.encrypt(config.secret())?;
        config.set_secret(encrypted);
        config.touch(created_at);

        configs.insert(name.to_string(), config);
        self.write_all(&configs)?;
        debug!(name, "cloud target saved");
        Ok(())
    }

    /// Load a named target with its secret decrypted.
    pub fn load(&self, name: &str) -> Option<CloudTargetConfig> {
        let mut config = self.load_all_raw().remove(name)?;
        let secret = self.decrypt(config.secret());
        config.set_secret(secret);
        Some(config)
    }

    /// List stored targets without decrypting anything.
    pub fn list(&self) -> Vec<TargetSummary> {
        self.load_all_raw()
            .iter()
            .map(|(name, config)| TargetSummary {
                name: name.clone(),
                kind: config.kind().to_string(),
                display_name: config.display_name(),
                created_at: config.created_at(),
                updated_at: config.updated_at(),
            })
            .collect()
    }

    /// Delete a named target. Returns whether it existed.
    pub fn delete(&self, name: &str) -> VaultResult<bool> {
        let mut configs = self.load_all_raw();
        if configs.remove(name).is_none() {
            return Ok(false);
        }
        self.write_all(&configs)?;
        Ok(true)
    }

    /// Remove the whole store (the key file is kept).
    pub fn clear_all(&self) -> VaultResult<()> {
        let path = self.config_path();
        if path.exists() {
            fs::remove_file(&path).map_err(|e| VaultError::Io { path, source: e })?;
        }
        Ok(())
    }

    /// The directory this vault lives in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Write a file atomically (temp + rename) with owner-only permissions.
fn write_private(path: &Path, contents: &[u8]) -> VaultResult<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents).map_err(|e| VaultError::Io {
        path: tmp.clone(),
        source: e,
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600)).map_err(|e| {
            VaultError::Io {
                path: tmp.clone(),
                source: e,
            }
        })?;
    }

    fs::rename(&tmp, path).map_err(|e| VaultError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
