//! Content-addressed store capability.
//!
//! An upload returns the hash the blob can later be downloaded by. The engine
//! never interprets hashes; it only stores them in the local index and in
//! root snapshots.

use async_trait::async_trait;

use crate::error::Result;

mod memory;
#[cfg(feature = "pinning")]
mod http_request;
#[cfg(feature = "pinning")]
pub mod pinata;

pub use memory::{content_hash, MemoryContentStore};
#[cfg(feature = "pinning")]
pub use pinata::{PinataStore, PinningConfig};

/// Backing store that persists blobs and addresses them by content.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Uploads `data`, returning the hash it is addressable by. `key` is a
    /// human-readable label; it does not influence the hash.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the store rejects or cannot be reached.
    async fn upload(&self, key: &str, data: &str) -> Result<String>;

    /// Downloads the blob previously uploaded under `hash`.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the blob cannot be fetched.
    async fn download(&self, hash: &str) -> Result<String>;
}
