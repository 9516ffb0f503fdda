//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::{DelegatedFsError, Result};
use crate::primitives::{canonicalize_address, EthAddress};

/// Default ceiling on a stored payload, in Unicode scalar values (`char`s).
///
/// Characters outside the Basic Multilingual Plane count once, not twice as
/// they would in UTF-16 code units.
pub const DEFAULT_MAX_DATA_LENGTH: usize = 10_000;

/// Environment variable holding the trusted authorization service address.
pub const AUTH_SERVICE_ADDRESS_ENV: &str = "DELEGATED_FS_AUTH_SERVICE_ADDRESS";
/// Environment variable overriding [`DelegatedFsOptions::max_data_length`].
pub const MAX_DATA_LENGTH_ENV: &str = "DELEGATED_FS_MAX_DATA_LENGTH";
/// Environment variable overriding [`DelegatedFsOptions::verify_on_recover`].
pub const VERIFY_ON_RECOVER_ENV: &str = "DELEGATED_FS_VERIFY_ON_RECOVER";

/// Tunables of the storage engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DelegatedFsOptions {
    /// Payloads longer than this are rejected before any other check.
    pub max_data_length: usize,
    /// Whether recovery re-validates every record's delegation chain.
    pub verify_on_recover: bool,
}

impl Default for DelegatedFsOptions {
    fn default() -> Self {
        Self {
            max_data_length: DEFAULT_MAX_DATA_LENGTH,
            verify_on_recover: true,
        }
    }
}

/// Everything needed to construct an engine besides its adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// The only authorization service whose delegations are accepted.
    pub trusted_auth_service_address: EthAddress,
    /// Engine tunables.
    pub options: DelegatedFsOptions,
}

impl EngineConfig {
    /// Configuration with default options.
    #[must_use]
    pub fn new(trusted_auth_service_address: EthAddress) -> Self {
        Self {
            trusted_auth_service_address,
            options: DelegatedFsOptions::default(),
        }
    }

    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`DelegatedFsError::InvalidInput`] if the auth service address
    /// is missing or any variable is malformed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let address = lookup(AUTH_SERVICE_ADDRESS_ENV).ok_or_else(|| invalid(
            AUTH_SERVICE_ADDRESS_ENV,
            "must be set".to_string(),
        ))?;
        let trusted_auth_service_address = canonicalize_address(address.trim())
            .map_err(|err| invalid(AUTH_SERVICE_ADDRESS_ENV, err.to_string()))?;

        let mut options = DelegatedFsOptions::default();
        if let Some(raw) = lookup(MAX_DATA_LENGTH_ENV) {
            options.max_data_length = raw
                .trim()
                .parse()
                .map_err(|err| invalid(MAX_DATA_LENGTH_ENV, format!("{raw:?}: {err}")))?;
        }
        if let Some(raw) = lookup(VERIFY_ON_RECOVER_ENV) {
            options.verify_on_recover = parse_flag(&raw)
                .ok_or_else(|| invalid(VERIFY_ON_RECOVER_ENV, format!("{raw:?} is not a boolean")))?;
        }

        Ok(Self {
            trusted_auth_service_address,
            options,
        })
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn invalid(attribute: &str, reason: String) -> DelegatedFsError {
    DelegatedFsError::InvalidInput {
        attribute: attribute.to_string(),
        reason,
    }
}
