//! services/api/src/adapters/storage.rs
//!
//! A filesystem-backed `ObjectStore`. Objects live under a root directory and
//! are served back through `GET /storage/{*path}` with HMAC-signed,
//! expiring URLs.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use study_deck_core::ports::{ObjectStore, PortError, PortResult};
use tokio::io::AsyncWriteExt;
use tracing::info;

type HmacSha256 = Hmac<Sha256>;

//=========================================================================================
// URL Signing
//=========================================================================================

/// Signs and verifies `(path, expiry)` pairs.
#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
}

impl UrlSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    fn mac(&self, path: &str, expires: u64) -> PortResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| PortError::Unexpected(format!("Invalid signing key: {}", e)))?;
        mac.update(path.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }

    /// Hex signature for `path` valid until the unix time `expires`.
    pub fn sign(&self, path: &str, expires: u64) -> PortResult<String> {
        Ok(hex::encode(self.mac(path, expires)?.finalize().into_bytes()))
    }

    /// Checks the signature and that `expires` has not passed.
    pub fn verify(&self, path: &str, expires: u64, signature: &str) -> bool {
        if expires < unix_now() {
            return false;
        }
        let Ok(signature) = hex::decode(signature) else {
            return false;
        };
        self.mac(path, expires)
            .map(|mac| mac.verify_slice(&signature).is_ok())
            .unwrap_or(false)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: String,
    signer: UrlSigner,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str, signer: UrlSigner) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            signer,
        }
    }

    /// Maps an object path onto the filesystem, refusing anything that could
    /// escape the root.
    fn resolve(&self, path: &str) -> PortResult<PathBuf> {
        let relative = Path::new(path);
        let safe = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(PortError::InvalidInput(format!(
                "Invalid object path: {}",
                path
            )));
        }
        Ok(self.root.join(relative))
    }
}

//=========================================================================================
// `ObjectStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload(&self, path: &str, bytes: &[u8], content_type: &str) -> PortResult<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PortError::Unexpected(e.to_string()))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => {
                    PortError::InvalidInput(format!("Object already exists: {}", path))
                }
                _ => PortError::Unexpected(e.to_string()),
            })?;
        file.write_all(bytes)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        info!("Stored {} ({} bytes, {})", path, bytes.len(), content_type);
        Ok(())
    }

    async fn download(&self, path: &str) -> PortResult<Vec<u8>> {
        let target = self.resolve(path)?;
        tokio::fs::read(&target).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => PortError::NotFound(format!("Object {} not found", path)),
            _ => PortError::Unexpected(e.to_string()),
        })
    }

    async fn create_signed_url(&self, path: &str, ttl: Duration) -> PortResult<String> {
        self.resolve(path)?;
        let expires = unix_now() + ttl.as_secs();
        let signature = self.signer.sign(path, expires)?;
        Ok(format!(
            "{}/storage/{}?expires={}&signature={}",
            self.public_base_url, path, expires, signature
        ))
    }
}
