//! Local index capability: the queryable copy of every (user, application)
//! record and the hash it was uploaded under.
//!
//! Adapters receive canonical addresses only; the engine canonicalizes at the
//! boundary. Nonce ordering is the engine's concern, except for
//! [`LocalIndex::compare_and_put`], which adapters must implement atomically.

use async_trait::async_trait;

use crate::error::{DelegatedFsError, Result};
use crate::primitives::EthAddress;
use crate::types::{RootSnapshot, StoredRecord};

mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryIndex;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteIndex;

/// Stored nonce reported for pairs with no record.
pub const NO_NONCE: i64 = -1;

/// Storage-agnostic index of stored records.
#[async_trait]
pub trait LocalIndex: Send + Sync {
    /// Returns the record for the pair.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if absent, `LocalIndex` on adapter failure.
    async fn get_record(
        &self,
        user: &EthAddress,
        application: &EthAddress,
    ) -> Result<StoredRecord>;

    /// Upserts the record for the pair, overwriting any existing one.
    ///
    /// # Errors
    ///
    /// Returns `LocalIndex` on adapter failure.
    async fn put_record(
        &self,
        user: &EthAddress,
        application: &EthAddress,
        record: &StoredRecord,
        hash: &str,
    ) -> Result<()>;

    /// Upserts the record only if the stored nonce still equals
    /// `observed_nonce` ([`NO_NONCE`] meaning no record). The check and the
    /// write are one atomic step.
    ///
    /// # Errors
    ///
    /// Returns `NonceMismatch` carrying the fresh expected nonce if another
    /// writer got there first, `LocalIndex` on adapter failure.
    async fn compare_and_put(
        &self,
        user: &EthAddress,
        application: &EthAddress,
        observed_nonce: i64,
        record: &StoredRecord,
        hash: &str,
    ) -> Result<()>;

    /// Returns the stored nonce, or [`NO_NONCE`] if there is no record.
    ///
    /// # Errors
    ///
    /// Returns `LocalIndex` on adapter failure.
    async fn get_nonce(&self, user: &EthAddress, application: &EthAddress) -> Result<i64>;

    /// Scans every record into a `user -> application -> hash` mapping.
    ///
    /// # Errors
    ///
    /// Returns `LocalIndex` on adapter failure.
    async fn list_all_hashes(&self) -> Result<RootSnapshot>;
}

/// Nonce the next write for a pair must carry, given the stored nonce.
///
/// A pair whose stored nonce is [`MAX_NONCE`](crate::MAX_NONCE) accepts no
/// further writes.
pub(crate) fn next_nonce(stored: i64) -> Result<u64> {
    stored
        .checked_add(1)
        .and_then(|next| u64::try_from(next).ok())
        .ok_or_else(|| {
            DelegatedFsError::LocalIndex(format!("no nonce follows stored nonce {stored}"))
        })
}
