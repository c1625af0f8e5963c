use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("blob I/O error: {0}")]
    Io(String),
}

/// Content-addressable blob storage with signed-URL retrieval. The
/// production store is external; this trait is what the core needs from it.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, BlobError>;
    async fn store(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<(), BlobError>;
    async fn exists(&self, path: &str) -> Result<bool, BlobError>;
    /// Fresh time-limited download URL for an existing blob.
    fn signed_url(&self, path: &str) -> String;
}

/// Filesystem-backed blob store. Blob paths are slash-separated keys
/// (`tenants/<tenant>/petitions/<file>`) mapped onto a root directory; signed
/// URLs carry an expiry and a keyed SHA-256 signature over (path, expiry).
pub struct FsBlobStore {
    root: PathBuf,
    base_url: String,
    signing_key: Vec<u8>,
    url_ttl_s: i64,
}

impl FsBlobStore {
    pub fn new(
        root: impl Into<PathBuf>,
        base_url: impl Into<String>,
        signing_key: impl Into<Vec<u8>>,
        url_ttl_s: i64,
    ) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
            signing_key: signing_key.into(),
            url_ttl_s,
        }
    }

    /// Rejects keys that would escape the root directory.
    fn resolve(&self, path: &str) -> Result<PathBuf, BlobError> {
        if path.is_empty()
            || path.starts_with('/')
            || path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
        {
            return Err(BlobError::Io(format!("invalid blob path: {path}")));
        }
        Ok(self.root.join(path))
    }

    fn signature(&self, path: &str, expires: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.signing_key);
        hasher.update(path.as_bytes());
        hasher.update(expires.to_be_bytes());
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
    }

    /// Validates the (expires, sig) pair produced by [`signed_url`].
    pub fn verify_signature(&self, path: &str, expires: i64, sig: &str, now: i64) -> bool {
        expires > now && self.signature(path, expires) == sig
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        let full = self.resolve(path)?;
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(path.to_string()))
            }
            Err(e) => Err(BlobError::Io(e.to_string())),
        }
    }

    async fn store(&self, path: &str, bytes: &[u8], _content_type: &str) -> Result<(), BlobError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BlobError::Io(e.to_string()))?;
        }
        tokio::fs::write(&full, bytes)
            .await
            .map_err(|e| BlobError::Io(e.to_string()))
    }

    async fn exists(&self, path: &str) -> Result<bool, BlobError> {
        let full = self.resolve(path)?;
        Ok(Path::new(&full).exists())
    }

    fn signed_url(&self, path: &str) -> String {
        let expires = chrono::Utc::now().timestamp() + self.url_ttl_s;
        let sig = self.signature(path, expires);
        format!(
            "{}/blobs/{path}?expires={expires}&sig={sig}",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &std::path::Path) -> FsBlobStore {
        FsBlobStore::new(dir, "http://localhost:8080", b"test-key".to_vec(), 3600)
    }

    #[tokio::test]
    async fn store_and_fetch_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = store(dir.path());
        blobs
            .store("tenants/t1/docs/a.pdf", b"conteudo", "application/pdf")
            .await
            .unwrap();
        let bytes = blobs.fetch("tenants/t1/docs/a.pdf").await.unwrap();
        assert_eq!(bytes, b"conteudo");
    }

    #[tokio::test]
    async fn fetch_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = store(dir.path());
        match blobs.fetch("tenants/t1/docs/missing.pdf").await {
            Err(BlobError::NotFound(p)) => assert!(p.contains("missing")),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn traversal_paths_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = store(dir.path());
        assert!(blobs.fetch("../etc/passwd").await.is_err());
        assert!(blobs.fetch("/abs/path").await.is_err());
        assert!(blobs.fetch("a//b").await.is_err());
    }

    #[test]
    fn signed_url_verifies_and_expires() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = store(dir.path());
        let url = blobs.signed_url("tenants/t1/docs/a.pdf");
        let expires: i64 = url
            .split("expires=")
            .nth(1)
            .and_then(|s| s.split('&').next())
            .and_then(|s| s.parse().ok())
            .unwrap();
        let sig = url.split("sig=").nth(1).unwrap();

        let now = chrono::Utc::now().timestamp();
        assert!(blobs.verify_signature("tenants/t1/docs/a.pdf", expires, sig, now));
        // Wrong path, wrong sig, and past expiry all fail.
        assert!(!blobs.verify_signature("tenants/t2/docs/a.pdf", expires, sig, now));
        assert!(!blobs.verify_signature("tenants/t1/docs/a.pdf", expires, "bogus", now));
        assert!(!blobs.verify_signature("tenants/t1/docs/a.pdf", expires, sig, expires + 1));
    }
}
