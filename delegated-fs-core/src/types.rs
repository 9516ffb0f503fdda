//! Records exchanged between the engine and its adapters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::primitives::{EthAddress, EthSignature};

/// Largest nonce a record may carry. Indexes store nonces as signed 64-bit
/// integers.
pub const MAX_NONCE: u64 = i64::MAX.unsigned_abs();

/// The proof accompanying every write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegatedProof {
    /// Must equal the stored nonce for (user, application) plus one, or 0 for
    /// the first write. Never above [`MAX_NONCE`].
    pub nonce: u64,
    /// Application that manages the user's data.
    pub application_address: EthAddress,
    /// Authorization service signature over the delegation message.
    pub auth_service_proof: EthSignature,
    /// Delegated key signature over `nonce ‖ data`.
    pub application_delegate_data_signature: EthSignature,
}

/// A record as kept in the local index and uploaded to the content store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// The user's payload.
    pub data: String,
    /// Proof that the payload was written through a trusted delegation.
    pub proof: DelegatedProof,
}

/// `user -> application -> content hash` for every record in the local index.
pub type RootSnapshot = BTreeMap<EthAddress, BTreeMap<EthAddress, String>>;

/// Number of (user, application) pairs in a snapshot.
#[must_use]
pub fn snapshot_len(snapshot: &RootSnapshot) -> usize {
    snapshot.values().map(BTreeMap::len).sum()
}
