use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::{Method, RequestBuilder, Response};

use crate::error::DelegatedFsError;

/// A thin wrapper on an HTTP client. Sets timeouts and the user-agent,
/// refuses plain HTTP unless allowed, and retries transient failures.
pub(super) struct Request {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
    allow_insecure: bool,
}

impl Request {
    pub(super) fn new(timeout: Duration, max_retries: u32, allow_insecure: bool) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
            max_retries,
            allow_insecure,
        }
    }

    /// Creates a request builder with defaults applied.
    pub(super) fn req(&self, method: Method, url: &str) -> Result<RequestBuilder, DelegatedFsError> {
        if !self.allow_insecure && !url.starts_with("https") {
            return Err(DelegatedFsError::StorageUnavailable(format!(
                "refusing non-https url {url}"
            )));
        }

        Ok(self
            .client
            .request(method, url)
            .timeout(self.timeout)
            .header(
                "User-Agent",
                format!("delegated-fs-core/{}", env!("CARGO_PKG_VERSION")),
            ))
    }

    pub(super) fn get(&self, url: &str) -> Result<RequestBuilder, DelegatedFsError> {
        self.req(Method::GET, url)
    }

    pub(super) fn post(&self, url: &str) -> Result<RequestBuilder, DelegatedFsError> {
        self.req(Method::POST, url)
    }

    /// Sends a request built by `get`/`post`, retrying 429, 5xx, timeouts and
    /// connect errors with exponential backoff.
    pub(super) async fn handle(
        &self,
        request_builder: RequestBuilder,
    ) -> Result<Response, DelegatedFsError> {
        let Some(template) = request_builder.try_clone() else {
            return execute_request_builder(request_builder)
                .await
                .map_err(Into::into);
        };

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(self.max_retries as usize);

        (|| async {
            let request_builder = template.try_clone().ok_or_else(|| {
                RequestHandleError::permanent(
                    "<unknown>".to_string(),
                    None,
                    "request cannot be retried because it is not cloneable".to_string(),
                )
            })?;
            execute_request_builder(request_builder).await
        })
        .retry(backoff)
        .when(RequestHandleError::is_retryable)
        .await
        .map_err(Into::into)
    }
}

#[derive(Debug)]
struct RequestHandleError {
    url: String,
    status: Option<u16>,
    error: String,
    retryable: bool,
}

impl RequestHandleError {
    const fn retryable(url: String, status: Option<u16>, error: String) -> Self {
        Self {
            url,
            status,
            error,
            retryable: true,
        }
    }

    const fn permanent(url: String, status: Option<u16>, error: String) -> Self {
        Self {
            url,
            status,
            error,
            retryable: false,
        }
    }

    const fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl From<RequestHandleError> for DelegatedFsError {
    fn from(value: RequestHandleError) -> Self {
        let status = value
            .status
            .map_or_else(String::new, |status| format!(" (status {status})"));
        Self::StorageUnavailable(format!("{}{status}: {}", value.url, value.error))
    }
}

async fn execute_request_builder(
    request_builder: RequestBuilder,
) -> Result<Response, RequestHandleError> {
    let (client, request) = request_builder.build_split();
    let request = request.map_err(|err| {
        RequestHandleError::permanent(
            err.url()
                .map_or_else(|| "<unknown>".to_string(), ToString::to_string),
            None,
            format!("request build failed: {err}"),
        )
    })?;
    let url = request.url().to_string();

    match client.execute(request).await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            if status == 429 || (500..600).contains(&status) {
                return Err(RequestHandleError::retryable(
                    url,
                    Some(status),
                    format!("request error with bad status code {status}"),
                ));
            }
            Ok(resp)
        }
        Err(err) => {
            if err.is_timeout() || err.is_connect() {
                return Err(RequestHandleError::retryable(
                    url,
                    None,
                    format!("request timeout/connect error: {err}"),
                ));
            }

            Err(RequestHandleError::permanent(
                url,
                None,
                format!("request failed: {err}"),
            ))
        }
    }
}
