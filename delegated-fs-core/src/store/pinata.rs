//! Content store backed by a Pinata-compatible IPFS pinning service.
//!
//! Uploads go to the pinning API, downloads go through a read gateway. The
//! two are separate hosts, so they are configured separately.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::http_request::Request;
use super::ContentStore;
use crate::error::{DelegatedFsError, Result};

/// Default pinning API host.
pub const DEFAULT_PINATA_API_URL: &str = "https://api.pinata.cloud";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Connection settings for [`PinataStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinningConfig {
    /// Base URL of the pinning API.
    pub api_url: String,
    /// Base URL of the gateway blobs are read from.
    pub gateway_url: String,
    /// Bearer token sent with uploads.
    pub jwt: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retries on 429, 5xx, timeouts and connect errors.
    pub max_retries: u32,
    /// Permits `http://` URLs. Off by default; the JWT travels with uploads.
    pub allow_insecure: bool,
}

impl PinningConfig {
    /// Settings for `gateway_url` with the default API host and retry policy.
    #[must_use]
    pub fn new(gateway_url: impl Into<String>, jwt: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_PINATA_API_URL.to_string(),
            gateway_url: gateway_url.into(),
            jwt: jwt.into(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            allow_insecure: false,
        }
    }

    /// Overrides the pinning API host.
    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PinJsonRequest<'a> {
    pinata_content: Value,
    pinata_metadata: PinMetadata<'a>,
}

#[derive(Serialize)]
struct PinMetadata<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
struct PinJsonResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

/// [`ContentStore`] that pins JSON documents through the Pinata API.
pub struct PinataStore {
    config: PinningConfig,
    request: Request,
}

impl std::fmt::Debug for PinataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinataStore")
            .field("api_url", &self.config.api_url)
            .field("gateway_url", &self.config.gateway_url)
            .finish_non_exhaustive()
    }
}

impl PinataStore {
    /// Creates a store from `config`.
    #[must_use]
    pub fn new(config: PinningConfig) -> Self {
        let request = Request::new(config.timeout, config.max_retries, config.allow_insecure);
        Self { config, request }
    }

    fn pin_url(&self) -> String {
        format!(
            "{}/pinning/pinJSONToIPFS",
            self.config.api_url.trim_end_matches('/')
        )
    }

    fn gateway_url(&self, hash: &str) -> String {
        format!("{}/{hash}", self.config.gateway_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ContentStore for PinataStore {
    async fn upload(&self, key: &str, data: &str) -> Result<String> {
        // Pinata pins JSON values, not strings, so the payload is re-parsed.
        let content: Value = serde_json::from_str(data).map_err(|err| {
            DelegatedFsError::StorageUnavailable(format!("upload payload is not JSON: {err}"))
        })?;
        let body = PinJsonRequest {
            pinata_content: content,
            pinata_metadata: PinMetadata { name: key },
        };

        let url = self.pin_url();
        let builder = self
            .request
            .post(&url)?
            .bearer_auth(&self.config.jwt)
            .json(&body);
        let response = self.request.handle(builder).await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            log::warn!("pinning upload of {key} rejected with {status}");
            return Err(DelegatedFsError::StorageUnavailable(format!(
                "pinning rejected upload ({status}): {text}"
            )));
        }

        let parsed: PinJsonResponse = response.json().await.map_err(|err| {
            DelegatedFsError::StorageUnavailable(format!("invalid pinning response: {err}"))
        })?;
        log::debug!("pinned {key} as {}", parsed.ipfs_hash);
        Ok(parsed.ipfs_hash)
    }

    async fn download(&self, hash: &str) -> Result<String> {
        let url = self.gateway_url(hash);
        let builder = self.request.get(&url)?;
        let response = self.request.handle(builder).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DelegatedFsError::StorageUnavailable(format!(
                "gateway returned {status} for {hash}"
            )));
        }

        response.text().await.map_err(|err| {
            DelegatedFsError::StorageUnavailable(format!("failed reading {hash}: {err}"))
        })
    }
}
