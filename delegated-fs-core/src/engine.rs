//! The delegated storage engine.
//!
//! [`DelegatedFs`] holds no mutable state of its own: every record lives in
//! the [`LocalIndex`], every payload in the [`ContentStore`]. A write is
//! durable once both the upload and the conditional index upsert succeeded.

use std::sync::Arc;

use alloy_signer::Signer;

use crate::config::{DelegatedFsOptions, EngineConfig};
use crate::delegation::{
    sign_delegation, DelegationMessage, DelegationOutcome, DelegationVerifier, ProofVerifier,
};
use crate::error::{DelegatedFsError, Result};
use crate::index::{next_nonce, LocalIndex};
use crate::primitives::{canonicalize_address, EthAddress, EthSignature};
use crate::snapshot::{decode_record, decode_snapshot, encode_record, encode_snapshot};
use crate::store::ContentStore;
use crate::types::{snapshot_len, DelegatedProof, RootSnapshot, StoredRecord};

/// Upload key prefix for individual records.
pub const RECORD_KEY_PREFIX: &str = "user-app-data-item";

/// Upload key for root snapshots.
pub const ROOT_SNAPSHOT_KEY: &str = "result-data";

/// Signer reported by recovery when a record's proof names no recoverable
/// authorization service.
pub const UNKNOWN_SIGNER: &str = "unknown";

/// Upload key of the record for (user, application).
#[must_use]
pub fn record_key(user: &EthAddress, application: &EthAddress) -> String {
    format!("{RECORD_KEY_PREFIX}_{user}_{application}")
}

/// Storage engine over a local index and a content-addressed store.
#[derive(Clone)]
pub struct DelegatedFs {
    index: Arc<dyn LocalIndex>,
    store: Arc<dyn ContentStore>,
    verifier: Arc<dyn ProofVerifier>,
    options: DelegatedFsOptions,
}

impl std::fmt::Debug for DelegatedFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegatedFs")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl DelegatedFs {
    /// Creates an engine trusting the configured authorization service.
    #[must_use]
    pub fn new(
        config: &EngineConfig,
        index: Arc<dyn LocalIndex>,
        store: Arc<dyn ContentStore>,
    ) -> Self {
        let verifier = Arc::new(DelegationVerifier::new(config.trusted_auth_service_address));
        Self::with_verifier(index, store, verifier, config.options)
    }

    /// Creates an engine with a custom proof verifier.
    #[must_use]
    pub const fn with_verifier(
        index: Arc<dyn LocalIndex>,
        store: Arc<dyn ContentStore>,
        verifier: Arc<dyn ProofVerifier>,
        options: DelegatedFsOptions,
    ) -> Self {
        Self {
            index,
            store,
            verifier,
            options,
        }
    }

    /// Engine tunables.
    #[must_use]
    pub const fn options(&self) -> &DelegatedFsOptions {
        &self.options
    }

    /// Accepts a write of `data` for `user`, authorized by `proof`.
    ///
    /// Checks run in a fixed order: payload size, nonce, delegation chain.
    /// Only then is the record uploaded and, if no concurrent writer advanced
    /// the nonce in the meantime, recorded in the local index.
    ///
    /// # Errors
    ///
    /// - `PayloadTooLarge` if `data` exceeds `max_data_length` Unicode scalar
    ///   values.
    /// - `InvalidAddress` if `user` is malformed.
    /// - `NonceMismatch` if `proof.nonce` is not the next nonce, including
    ///   when a concurrent write wins the race.
    /// - `LocalIndex` if the pair already holds [`MAX_NONCE`](crate::MAX_NONCE).
    /// - `InvalidSignature`, `DuplicateAddress` or `UntrustedDelegation` from
    ///   proof verification.
    /// - `StorageUnavailable` if the upload fails; the index is untouched.
    pub async fn set_record(&self, user: &str, data: &str, proof: &DelegatedProof) -> Result<()> {
        let length = data.chars().count();
        if length > self.options.max_data_length {
            return Err(DelegatedFsError::PayloadTooLarge {
                length,
                max: self.options.max_data_length,
            });
        }

        let user = canonicalize_address(user)?;
        let application = proof.application_address;

        let stored = self.index.get_nonce(&user, &application).await?;
        let expected = next_nonce(stored)?;
        if proof.nonce != expected {
            log::warn!(
                "rejected write for {user}/{application}: nonce {} != {expected}",
                proof.nonce
            );
            return Err(DelegatedFsError::NonceMismatch { expected });
        }

        if let Err(err) = self.verifier.verify(&user, data, proof) {
            log::warn!("rejected write for {user}/{application}: {err}");
            return Err(err);
        }

        let record = StoredRecord {
            data: data.to_string(),
            proof: proof.clone(),
        };
        let hash = self
            .store
            .upload(&record_key(&user, &application), &encode_record(&record)?)
            .await?;

        match self
            .index
            .compare_and_put(&user, &application, stored, &record, &hash)
            .await
        {
            Ok(()) => {
                log::debug!(
                    "stored {user}/{application} nonce {} as {hash}",
                    proof.nonce
                );
                Ok(())
            }
            Err(err @ DelegatedFsError::NonceMismatch { .. }) => {
                log::warn!("lost write race for {user}/{application}, blob {hash} orphaned");
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Returns the stored record for the pair.
    ///
    /// # Errors
    ///
    /// `InvalidAddress` for malformed input, `NotFound` if there is no record.
    pub async fn get_record(&self, user: &str, application: &str) -> Result<StoredRecord> {
        let user = canonicalize_address(user)?;
        let application = canonicalize_address(application)?;
        self.index.get_record(&user, &application).await
    }

    /// Returns the stored nonce for the pair, `-1` if there is none.
    ///
    /// # Errors
    ///
    /// `InvalidAddress` for malformed input, `LocalIndex` if the adapter fails.
    pub async fn get_nonce(&self, user: &str, application: &str) -> Result<i64> {
        let user = canonicalize_address(user)?;
        let application = canonicalize_address(application)?;
        self.index.get_nonce(&user, &application).await
    }

    /// The current `user -> application -> hash` mapping, without uploading.
    ///
    /// # Errors
    ///
    /// `LocalIndex` if the adapter fails.
    pub async fn user_app_hashes(&self) -> Result<RootSnapshot> {
        self.index.list_all_hashes().await
    }

    /// Uploads the current mapping as one blob and returns its hash.
    ///
    /// # Errors
    ///
    /// `LocalIndex` if the scan fails, `StorageUnavailable` if the upload
    /// fails.
    pub async fn upload_root_snapshot(&self) -> Result<String> {
        let snapshot = self.index.list_all_hashes().await?;
        let hash = self
            .store
            .upload(ROOT_SNAPSHOT_KEY, &encode_snapshot(&snapshot)?)
            .await?;
        log::info!(
            "uploaded root snapshot of {} records as {hash}",
            snapshot_len(&snapshot)
        );
        Ok(hash)
    }

    /// Rebuilds the local index from the snapshot at `root_hash`, verifying
    /// delegation chains if `verify_on_recover` is set. Returns the number of
    /// records restored.
    ///
    /// # Errors
    ///
    /// See [`DelegatedFs::recover_from_root_with`].
    pub async fn recover_from_root(&self, root_hash: &str) -> Result<usize> {
        self.recover_from_root_with(root_hash, self.options.verify_on_recover)
            .await
    }

    /// Rebuilds the local index from the snapshot at `root_hash`.
    ///
    /// Every referenced record overwrites the local one regardless of nonce.
    /// Entries are committed one at a time; the first failure aborts and
    /// leaves earlier entries in place.
    ///
    /// # Errors
    ///
    /// - `StorageUnavailable` if a download fails.
    /// - `CorruptSnapshot` or `CorruptRecord` if a blob has the wrong shape.
    /// - `UntrustedDelegation` if `verify` is set and a record's chain does
    ///   not check out, including malformed signatures and duplicate
    ///   addresses.
    pub async fn recover_from_root_with(&self, root_hash: &str, verify: bool) -> Result<usize> {
        let snapshot = decode_snapshot(&self.store.download(root_hash).await?)?;
        log::info!(
            "recovering {} records from root {root_hash}",
            snapshot_len(&snapshot)
        );

        let mut restored = 0;
        for (user, applications) in &snapshot {
            for (application, hash) in applications {
                let record = decode_record(hash, &self.store.download(hash).await?)?;
                if record.proof.application_address != *application {
                    return Err(DelegatedFsError::CorruptRecord {
                        hash: hash.clone(),
                        reason: format!(
                            "record belongs to application {}, indexed under {application}",
                            record.proof.application_address
                        ),
                    });
                }
                if verify {
                    self.verifier
                        .verify(user, &record.data, &record.proof)
                        .map_err(|err| untrusted_on_recover(hash, err))?;
                }
                self.index
                    .put_record(user, application, &record, hash)
                    .await?;
                log::debug!("recovered {user}/{application} from {hash}");
                restored += 1;
            }
        }

        log::info!("recovered {restored} records from root {root_hash}");
        Ok(restored)
    }

    /// Signs the delegation message for (user, delegated, application) with
    /// the authorization service key. Failure outcomes produce a signature
    /// that never verifies as a success-path delegation.
    ///
    /// # Errors
    ///
    /// `InvalidAddress` for malformed input, `DuplicateAddress` if the
    /// addresses are not distinct, `Signing` if the signer fails.
    pub async fn issue_delegation_signature<S>(
        user: &str,
        delegated: &str,
        application: &str,
        signer: &S,
        outcome: DelegationOutcome,
    ) -> Result<EthSignature>
    where
        S: Signer + Send + Sync + ?Sized,
    {
        let message = DelegationMessage::new(
            canonicalize_address(user)?,
            canonicalize_address(delegated)?,
            canonicalize_address(application)?,
            outcome,
        )?;
        sign_delegation(&message, signer).await
    }
}

fn untrusted_on_recover(hash: &str, err: DelegatedFsError) -> DelegatedFsError {
    match err {
        DelegatedFsError::InvalidAddress { .. }
        | DelegatedFsError::InvalidSignature { .. }
        | DelegatedFsError::DuplicateAddress => {
            log::warn!("record {hash} failed verification: {err}");
            DelegatedFsError::UntrustedDelegation {
                recovered: UNKNOWN_SIGNER.to_string(),
            }
        }
        other => other,
    }
}
