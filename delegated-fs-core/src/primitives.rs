//! Canonical address and signature types.
//!
//! Every address and signature entering the crate goes through
//! [`canonicalize_address`] or [`canonicalize_signature`]. The canonical text
//! form is lowercase hex without a `0x` prefix, which is what gets compared,
//! stored and concatenated into delegation messages.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{Address, Signature};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{DelegatedFsError, Result};

/// Length of a canonical address in hex characters.
pub const ADDRESS_HEX_LENGTH: usize = 40;

/// Length of a canonical signature in hex characters.
pub const SIGNATURE_HEX_LENGTH: usize = 130;

/// A 20-byte account identifier in canonical form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EthAddress(Address);

impl EthAddress {
    /// Returns the underlying `alloy` address.
    #[must_use]
    pub const fn inner(&self) -> Address {
        self.0
    }
}

impl From<Address> for EthAddress {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

impl fmt::Display for EthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0.as_slice()))
    }
}

impl FromStr for EthAddress {
    type Err = DelegatedFsError;

    fn from_str(s: &str) -> Result<Self> {
        canonicalize_address(s)
    }
}

impl Serialize for EthAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EthAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        canonicalize_address(&raw).map_err(de::Error::custom)
    }
}

/// A 65-byte `r ‖ s ‖ v` signature in canonical form.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EthSignature([u8; 65]);

impl EthSignature {
    /// Raw signature bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }
}

impl From<Signature> for EthSignature {
    fn from(signature: Signature) -> Self {
        Self(signature.as_bytes())
    }
}

impl fmt::Display for EthSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for EthSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EthSignature({self})")
    }
}

impl FromStr for EthSignature {
    type Err = DelegatedFsError;

    fn from_str(s: &str) -> Result<Self> {
        canonicalize_signature(s)
    }
}

impl Serialize for EthSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EthSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        canonicalize_signature(&raw).map_err(de::Error::custom)
    }
}

fn strip_hex_prefix(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

/// Strips an optional `0x` prefix and lowercases the address.
///
/// # Errors
///
/// Returns [`DelegatedFsError::InvalidAddress`] unless exactly 40 hex
/// characters remain.
pub fn canonicalize_address(value: &str) -> Result<EthAddress> {
    let invalid = || DelegatedFsError::InvalidAddress {
        value: value.to_string(),
    };
    let stripped = strip_hex_prefix(value);
    if stripped.len() != ADDRESS_HEX_LENGTH {
        return Err(invalid());
    }
    let mut bytes = [0u8; 20];
    hex::decode_to_slice(stripped, &mut bytes).map_err(|_| invalid())?;
    Ok(EthAddress(Address::from(bytes)))
}

/// Strips an optional `0x` prefix from a signature.
///
/// # Errors
///
/// Returns [`DelegatedFsError::InvalidSignature`] unless exactly 130 hex
/// characters remain.
pub fn canonicalize_signature(value: &str) -> Result<EthSignature> {
    let stripped = strip_hex_prefix(value);
    if stripped.len() != SIGNATURE_HEX_LENGTH {
        return Err(DelegatedFsError::InvalidSignature {
            reason: format!(
                "expected {SIGNATURE_HEX_LENGTH} hex characters, got {}",
                stripped.len()
            ),
        });
    }
    let mut bytes = [0u8; 65];
    hex::decode_to_slice(stripped, &mut bytes).map_err(|err| {
        DelegatedFsError::InvalidSignature {
            reason: err.to_string(),
        }
    })?;
    Ok(EthSignature(bytes))
}

/// Recovers the address that signed `message` as an EIP-191 personal message.
///
/// # Errors
///
/// Returns [`DelegatedFsError::InvalidSignature`] if the signature cannot be
/// parsed or does not recover to a public key.
pub fn recover_signer(message: &str, signature: &EthSignature) -> Result<EthAddress> {
    let parsed = Signature::from_raw(signature.as_bytes()).map_err(|err| {
        DelegatedFsError::InvalidSignature {
            reason: err.to_string(),
        }
    })?;
    parsed
        .recover_address_from_msg(message.as_bytes())
        .map(EthAddress)
        .map_err(|err| DelegatedFsError::InvalidSignature {
            reason: err.to_string(),
        })
}
