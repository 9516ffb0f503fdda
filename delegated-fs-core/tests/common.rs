#![allow(dead_code)]

//! Common test utilities shared across integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use delegated_fs_core::delegation::sign_data;
use delegated_fs_core::{
    ContentStore, DelegatedFs, DelegatedFsError, DelegatedFsOptions, DelegatedProof,
    DelegationOutcome, DelegationVerifier, EthAddress, LocalIndex, MemoryContentStore,
    MemoryIndex, ProofVerifier,
};

/// Wraps the real verifier and counts how often it ran.
pub struct CountingVerifier {
    inner: DelegationVerifier,
    calls: AtomicUsize,
}

impl CountingVerifier {
    /// Verifier trusting `trusted`, with no calls recorded.
    pub fn new(trusted: EthAddress) -> Self {
        Self {
            inner: DelegationVerifier::new(trusted),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of proofs checked so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProofVerifier for CountingVerifier {
    fn verify(
        &self,
        user: &EthAddress,
        data: &str,
        proof: &DelegatedProof,
    ) -> Result<(), DelegatedFsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.verify(user, data, proof)
    }
}

/// A content store that is permanently down.
pub struct UnreachableStore;

#[async_trait]
impl ContentStore for UnreachableStore {
    async fn upload(&self, _key: &str, _data: &str) -> Result<String, DelegatedFsError> {
        Err(DelegatedFsError::StorageUnavailable(
            "connection refused".to_string(),
        ))
    }

    async fn download(&self, _hash: &str) -> Result<String, DelegatedFsError> {
        Err(DelegatedFsError::StorageUnavailable(
            "connection refused".to_string(),
        ))
    }
}

/// Authorization service key plus the engine and adapters under test.
pub struct Harness {
    /// Authorization service key trusted by `engine`.
    pub auth: PrivateKeySigner,
    /// Local index behind `engine`.
    pub index: Arc<MemoryIndex>,
    /// Content store behind `engine`.
    pub store: Arc<MemoryContentStore>,
    /// Verifier behind `engine`.
    pub verifier: Arc<CountingVerifier>,
    /// Engine under test.
    pub engine: DelegatedFs,
}

impl Harness {
    /// Harness with a random authorization service and empty adapters.
    pub fn new(options: DelegatedFsOptions) -> Self {
        let auth = PrivateKeySigner::random();
        let store = Arc::new(MemoryContentStore::new());
        Self::with_store(auth, store, options)
    }

    /// Harness over an empty index and the given store.
    pub fn with_store(
        auth: PrivateKeySigner,
        store: Arc<MemoryContentStore>,
        options: DelegatedFsOptions,
    ) -> Self {
        let index = Arc::new(MemoryIndex::new());
        let verifier = Arc::new(CountingVerifier::new(auth.address().into()));
        let engine = DelegatedFs::with_verifier(
            index.clone(),
            store.clone(),
            verifier.clone(),
            options,
        );
        Self {
            auth,
            index,
            store,
            verifier,
            engine,
        }
    }

    /// A fresh engine over an empty index, sharing this harness's store.
    pub fn fresh_replica(&self, options: DelegatedFsOptions) -> Self {
        Self::with_store(self.auth.clone(), self.store.clone(), options)
    }
}

/// A user who delegated writes for one application to `delegate`.
pub struct Grant {
    /// User who granted the delegation.
    pub user: EthAddress,
    /// Delegated key signing the writes.
    pub delegate: PrivateKeySigner,
    /// Application the delegation is bound to.
    pub app: EthAddress,
}

impl Grant {
    /// Grant between random parties.
    pub fn random() -> Self {
        Self {
            user: random_address(),
            delegate: PrivateKeySigner::random(),
            app: random_address(),
        }
    }

    /// Canonical user address.
    pub fn user_hex(&self) -> String {
        self.user.to_string()
    }

    /// Canonical application address.
    pub fn app_hex(&self) -> String {
        self.app.to_string()
    }

    /// Builds a write proof, signing the delegation with `auth`.
    pub async fn proof(&self, auth: &PrivateKeySigner, data: &str, nonce: u64) -> DelegatedProof {
        let auth_service_proof = DelegatedFs::issue_delegation_signature(
            &self.user.to_string(),
            &self.delegate.address().to_string(),
            &self.app.to_string(),
            auth,
            DelegationOutcome::Success,
        )
        .await
        .unwrap();
        DelegatedProof {
            nonce,
            application_address: self.app,
            auth_service_proof,
            application_delegate_data_signature: sign_data(data, nonce, &self.delegate)
                .await
                .unwrap(),
        }
    }

    /// Signs and submits a write of `data` at `nonce`.
    pub async fn write(
        &self,
        harness: &Harness,
        data: &str,
        nonce: u64,
    ) -> Result<(), DelegatedFsError> {
        let proof = self.proof(&harness.auth, data, nonce).await;
        harness.engine.set_record(&self.user_hex(), data, &proof).await
    }
}

/// Address of a freshly generated key.
pub fn random_address() -> EthAddress {
    PrivateKeySigner::random().address().into()
}

/// Stored nonce for the grant's pair.
pub async fn nonce_of(index: &dyn LocalIndex, grant: &Grant) -> i64 {
    index.get_nonce(&grant.user, &grant.app).await.unwrap()
}
