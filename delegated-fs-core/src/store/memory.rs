use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::ContentStore;
use crate::error::{DelegatedFsError, Result};

/// Process-local content store addressing blobs by their SHA-256 digest.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    blobs: Mutex<HashMap<String, String>>,
    uploads: AtomicUsize,
    downloads: AtomicUsize,
}

impl MemoryContentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `upload` calls so far.
    #[must_use]
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    /// Number of `download` calls so far.
    #[must_use]
    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    /// Replaces the blob under `hash` without recomputing the digest.
    ///
    /// # Errors
    ///
    /// Returns an error if the store mutex is poisoned.
    pub fn overwrite(&self, hash: &str, data: &str) -> Result<()> {
        self.blobs
            .lock()
            .map_err(|_| DelegatedFsError::StorageUnavailable("mutex poisoned".to_string()))?
            .insert(hash.to_string(), data.to_string());
        Ok(())
    }
}

/// Hex SHA-256 digest of `data`.
#[must_use]
pub fn content_hash(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn upload(&self, _key: &str, data: &str) -> Result<String> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let hash = content_hash(data);
        self.overwrite(&hash, data)?;
        Ok(hash)
    }

    async fn download(&self, hash: &str) -> Result<String> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.blobs
            .lock()
            .map_err(|_| DelegatedFsError::StorageUnavailable("mutex poisoned".to_string()))?
            .get(hash)
            .cloned()
            .ok_or_else(|| DelegatedFsError::StorageUnavailable(format!("blob {hash} not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_is_content_addressed() {
        let store = MemoryContentStore::new();
        let a = store.upload("k1", "payload").await.unwrap();
        let b = store.upload("k2", "payload").await.unwrap();
        let c = store.upload("k1", "other").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert_eq!(store.download(&a).await.unwrap(), "payload");
        assert_eq!(store.upload_count(), 3);
        assert_eq!(store.download_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_blob() {
        let store = MemoryContentStore::new();
        let err = store.download("deadbeef").await.unwrap_err();
        assert!(matches!(err, DelegatedFsError::StorageUnavailable(_)));
        assert_eq!(store.download_count(), 1);
    }
}
