//! Delegation messages and the two-hop signature chain.
//!
//! The authorization service signs `user ‖ delegated ‖ application`; the
//! delegated key signs `nonce ‖ data`. A write is trusted when recovering the
//! delegated key from the data signature and then recovering the signer of the
//! resulting delegation message lands on the trusted service address.

use std::collections::BTreeSet;

use alloy_signer::Signer;

use crate::error::{DelegatedFsError, Result};
use crate::primitives::{recover_signer, EthAddress, EthSignature};
use crate::types::DelegatedProof;

/// Literal marker prefixed to failure-path delegation messages.
pub const FAILURE_MARKER: &str = "ERROR";

/// Which branch of the authorization workflow a delegation message attests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegationOutcome {
    /// The user granted the delegation.
    Success,
    /// The authorization was refused for the tagged reason.
    Failure(String),
}

/// The canonical text signed by the authorization service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationMessage {
    user: EthAddress,
    delegated: EthAddress,
    application: EthAddress,
    outcome: DelegationOutcome,
}

impl DelegationMessage {
    /// Builds a message over three pairwise distinct addresses.
    ///
    /// # Errors
    ///
    /// Returns [`DelegatedFsError::DuplicateAddress`] if any two addresses are
    /// equal.
    pub fn new(
        user: EthAddress,
        delegated: EthAddress,
        application: EthAddress,
        outcome: DelegationOutcome,
    ) -> Result<Self> {
        let distinct: BTreeSet<_> = [user, delegated, application].into_iter().collect();
        if distinct.len() != 3 {
            return Err(DelegatedFsError::DuplicateAddress);
        }
        Ok(Self {
            user,
            delegated,
            application,
            outcome,
        })
    }

    /// Success-path message for a granted delegation.
    ///
    /// # Errors
    ///
    /// See [`DelegationMessage::new`].
    pub fn success(
        user: EthAddress,
        delegated: EthAddress,
        application: EthAddress,
    ) -> Result<Self> {
        Self::new(user, delegated, application, DelegationOutcome::Success)
    }

    /// Outcome this message attests.
    #[must_use]
    pub const fn outcome(&self) -> &DelegationOutcome {
        &self.outcome
    }

    /// Renders the exact UTF-8 text that is signed.
    #[must_use]
    pub fn text(&self) -> String {
        let body = format!("{}{}{}", self.user, self.delegated, self.application);
        match &self.outcome {
            DelegationOutcome::Success => body,
            DelegationOutcome::Failure(tag) => format!("{FAILURE_MARKER}{body}{tag}"),
        }
    }
}

/// The message a delegated key signs for a write: decimal nonce then data.
#[must_use]
pub fn data_message(nonce: u64, data: &str) -> String {
    format!("{nonce}{data}")
}

/// Signs `nonce ‖ data` with a delegated key.
///
/// # Errors
///
/// Returns [`DelegatedFsError::Signing`] if the signer fails.
pub async fn sign_data<S>(data: &str, nonce: u64, signer: &S) -> Result<EthSignature>
where
    S: Signer + Send + Sync + ?Sized,
{
    let signature = signer
        .sign_message(data_message(nonce, data).as_bytes())
        .await?;
    Ok(signature.into())
}

/// Signs a delegation message with the authorization service key.
///
/// # Errors
///
/// Returns [`DelegatedFsError::Signing`] if the signer fails.
pub async fn sign_delegation<S>(message: &DelegationMessage, signer: &S) -> Result<EthSignature>
where
    S: Signer + Send + Sync + ?Sized,
{
    let signature = signer.sign_message(message.text().as_bytes()).await?;
    Ok(signature.into())
}

/// Checks the signature chain of a write.
///
/// # Errors
///
/// - [`DelegatedFsError::InvalidSignature`] if either signature is malformed.
/// - [`DelegatedFsError::DuplicateAddress`] if the recovered delegate equals the
///   user or application address.
/// - [`DelegatedFsError::UntrustedDelegation`] if the chain ends anywhere but
///   `trusted`.
pub fn verify_delegation(
    user: &EthAddress,
    data: &str,
    proof: &DelegatedProof,
    trusted: &EthAddress,
) -> Result<()> {
    let delegated = recover_signer(
        &data_message(proof.nonce, data),
        &proof.application_delegate_data_signature,
    )?;
    let message = DelegationMessage::success(*user, delegated, proof.application_address)?;
    let signer = recover_signer(&message.text(), &proof.auth_service_proof)?;
    if signer != *trusted {
        return Err(DelegatedFsError::UntrustedDelegation {
            recovered: signer.to_string(),
        });
    }
    Ok(())
}

/// Checks that a failure notice for a refused authorization was signed by
/// `trusted`.
///
/// # Errors
///
/// Same as [`verify_delegation`].
pub fn verify_failure_delegation(
    user: &EthAddress,
    delegated: &EthAddress,
    application: &EthAddress,
    tag: &str,
    signature: &EthSignature,
    trusted: &EthAddress,
) -> Result<()> {
    let message = DelegationMessage::new(
        *user,
        *delegated,
        *application,
        DelegationOutcome::Failure(tag.to_string()),
    )?;
    let signer = recover_signer(&message.text(), signature)?;
    if signer != *trusted {
        return Err(DelegatedFsError::UntrustedDelegation {
            recovered: signer.to_string(),
        });
    }
    Ok(())
}

/// Seam through which the engine checks write proofs.
pub trait ProofVerifier: Send + Sync {
    /// Accepts the proof or explains why the chain is untrusted.
    ///
    /// # Errors
    ///
    /// See [`verify_delegation`].
    fn verify(&self, user: &EthAddress, data: &str, proof: &DelegatedProof) -> Result<()>;
}

/// Verifies chains against a single trusted authorization service.
#[derive(Debug, Clone)]
pub struct DelegationVerifier {
    trusted: EthAddress,
}

impl DelegationVerifier {
    /// Creates a verifier trusting `trusted`.
    #[must_use]
    pub const fn new(trusted: EthAddress) -> Self {
        Self { trusted }
    }

    /// The trusted authorization service address.
    #[must_use]
    pub const fn trusted(&self) -> &EthAddress {
        &self.trusted
    }
}

impl ProofVerifier for DelegationVerifier {
    fn verify(&self, user: &EthAddress, data: &str, proof: &DelegatedProof) -> Result<()> {
        verify_delegation(user, data, proof, &self.trusted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::canonicalize_address;
    use alloy::signers::local::PrivateKeySigner;

    fn addr(signer: &PrivateKeySigner) -> EthAddress {
        signer.address().into()
    }

    struct Parties {
        auth: PrivateKeySigner,
        user: EthAddress,
        delegate: PrivateKeySigner,
        app: EthAddress,
    }

    fn parties() -> Parties {
        Parties {
            auth: PrivateKeySigner::random(),
            user: addr(&PrivateKeySigner::random()),
            delegate: PrivateKeySigner::random(),
            app: addr(&PrivateKeySigner::random()),
        }
    }

    async fn proof_for(p: &Parties, nonce: u64, data: &str) -> DelegatedProof {
        let message = DelegationMessage::success(p.user, addr(&p.delegate), p.app).unwrap();
        DelegatedProof {
            nonce,
            application_address: p.app,
            auth_service_proof: sign_delegation(&message, &p.auth).await.unwrap(),
            application_delegate_data_signature: sign_data(data, nonce, &p.delegate)
                .await
                .unwrap(),
        }
    }

    #[test]
    fn test_message_text_layout() {
        let user = canonicalize_address(&"1".repeat(40)).unwrap();
        let delegated = canonicalize_address(&"2".repeat(40)).unwrap();
        let app = canonicalize_address(&"3".repeat(40)).unwrap();

        let success = DelegationMessage::success(user, delegated, app).unwrap();
        assert_eq!(
            success.text(),
            format!("{}{}{}", "1".repeat(40), "2".repeat(40), "3".repeat(40))
        );

        let failure = DelegationMessage::new(
            user,
            delegated,
            app,
            DelegationOutcome::Failure("User rejected the request".to_string()),
        )
        .unwrap();
        assert_eq!(
            failure.text(),
            format!(
                "ERROR{}{}{}User rejected the request",
                "1".repeat(40),
                "2".repeat(40),
                "3".repeat(40)
            )
        );
        assert_ne!(success.text(), failure.text());
    }

    #[test]
    fn test_self_delegation_rejected() {
        let user = canonicalize_address(&"a".repeat(40)).unwrap();
        let delegated = canonicalize_address(&"b".repeat(40)).unwrap();
        assert_eq!(
            DelegationMessage::success(user, delegated, user).unwrap_err(),
            DelegatedFsError::DuplicateAddress
        );
        assert_eq!(
            DelegationMessage::success(user, user, delegated).unwrap_err(),
            DelegatedFsError::DuplicateAddress
        );
    }

    #[tokio::test]
    async fn test_verify_accepts_trusted_chain() {
        let p = parties();
        let proof = proof_for(&p, 0, "hello").await;
        verify_delegation(&p.user, "hello", &proof, &addr(&p.auth)).unwrap();
        DelegationVerifier::new(addr(&p.auth))
            .verify(&p.user, "hello", &proof)
            .unwrap();
    }

    #[tokio::test]
    async fn test_verify_rejects_other_service() {
        let p = parties();
        let proof = proof_for(&p, 0, "hello").await;
        let impostor = addr(&PrivateKeySigner::random());
        let err = verify_delegation(&p.user, "hello", &proof, &impostor).unwrap_err();
        assert_eq!(
            err,
            DelegatedFsError::UntrustedDelegation {
                recovered: addr(&p.auth).to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_tampered_data_is_untrusted() {
        let p = parties();
        let proof = proof_for(&p, 3, "hello").await;
        let err = verify_delegation(&p.user, "hellO", &proof, &addr(&p.auth)).unwrap_err();
        assert!(matches!(err, DelegatedFsError::UntrustedDelegation { .. }));
    }

    #[tokio::test]
    async fn test_nonce_is_part_of_signed_data() {
        let p = parties();
        let mut proof = proof_for(&p, 1, "hello").await;
        proof.nonce = 2;
        let err = verify_delegation(&p.user, "hello", &proof, &addr(&p.auth)).unwrap_err();
        assert!(matches!(err, DelegatedFsError::UntrustedDelegation { .. }));
    }

    #[tokio::test]
    async fn test_proof_for_other_user_is_untrusted() {
        let p = parties();
        let proof = proof_for(&p, 0, "hello").await;
        let other_user = addr(&PrivateKeySigner::random());
        let err = verify_delegation(&other_user, "hello", &proof, &addr(&p.auth)).unwrap_err();
        assert!(matches!(err, DelegatedFsError::UntrustedDelegation { .. }));
    }

    #[tokio::test]
    async fn test_failure_signature_does_not_verify_as_success() {
        let p = parties();
        let failure = DelegationMessage::new(
            p.user,
            addr(&p.delegate),
            p.app,
            DelegationOutcome::Failure("Invalid answer for the challenge".to_string()),
        )
        .unwrap();
        let failure_sig = sign_delegation(&failure, &p.auth).await.unwrap();

        verify_failure_delegation(
            &p.user,
            &addr(&p.delegate),
            &p.app,
            "Invalid answer for the challenge",
            &failure_sig,
            &addr(&p.auth),
        )
        .unwrap();

        let mut proof = proof_for(&p, 0, "hello").await;
        proof.auth_service_proof = failure_sig;
        let err = verify_delegation(&p.user, "hello", &proof, &addr(&p.auth)).unwrap_err();
        assert!(matches!(err, DelegatedFsError::UntrustedDelegation { .. }));

        let err = verify_failure_delegation(
            &p.user,
            &addr(&p.delegate),
            &p.app,
            "another reason",
            &failure_sig,
            &addr(&p.auth),
        )
        .unwrap_err();
        assert!(matches!(err, DelegatedFsError::UntrustedDelegation { .. }));
    }
}
