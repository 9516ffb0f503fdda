use thiserror::Error;

/// Result type for delegated storage operations.
pub type Result<T, E = DelegatedFsError> = std::result::Result<T, E>;

/// Error outputs from the delegated storage engine and its adapters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DelegatedFsError {
    /// The value is not a 20-byte hex address (optionally `0x`-prefixed).
    #[error("invalid_address: {value}")]
    InvalidAddress {
        /// The rejected input.
        value: String,
    },
    /// The value is not a well-formed 65-byte signature, or recovery failed.
    #[error("invalid_signature: {reason}")]
    InvalidSignature {
        /// Why the signature was rejected.
        reason: String,
    },
    /// The user, delegated and application addresses are not pairwise distinct.
    #[error("duplicate_address: delegation addresses must be unique")]
    DuplicateAddress,
    /// The payload exceeds the configured maximum length.
    #[error("payload_too_large: {length} > {max}")]
    PayloadTooLarge {
        /// Length of the rejected payload, in characters.
        length: usize,
        /// Configured ceiling.
        max: usize,
    },
    /// The proof nonce is not the next nonce for the (user, application) pair.
    #[error("nonce_mismatch: expected {expected}")]
    NonceMismatch {
        /// The only nonce that would have been accepted.
        expected: u64,
    },
    /// The delegation chain does not end at the trusted authorization service.
    #[error("untrusted_delegation: proof signed by {recovered}")]
    UntrustedDelegation {
        /// Canonical address recovered from the authorization proof, or
        /// `unknown` when recovery found a malformed chain.
        recovered: String,
    },
    /// No record exists for the (user, application) pair.
    #[error("not_found: {user}/{application}")]
    NotFound {
        /// Canonical user address.
        user: String,
        /// Canonical application address.
        application: String,
    },
    /// The content-addressed store failed to upload or download.
    #[error("storage_unavailable: {0}")]
    StorageUnavailable(String),
    /// The blob under a root hash is not a `user -> app -> hash` mapping.
    #[error("corrupt_snapshot: {0}")]
    CorruptSnapshot(String),
    /// The blob under a record hash is not a stored record.
    #[error("corrupt_record: {hash}: {reason}")]
    CorruptRecord {
        /// Content hash the record was downloaded from.
        hash: String,
        /// Description of the shape mismatch.
        reason: String,
    },
    /// The local index adapter failed.
    #[error("local_index: {0}")]
    LocalIndex(String),
    /// The signer refused or failed to sign.
    #[error("signing_error: {0}")]
    Signing(String),
    /// The presented input is not valid for the requested operation.
    #[error("invalid_input: {attribute}: {reason}")]
    InvalidInput {
        /// Name of the offending attribute.
        attribute: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl From<alloy_signer::Error> for DelegatedFsError {
    fn from(error: alloy_signer::Error) -> Self {
        Self::Signing(error.to_string())
    }
}
