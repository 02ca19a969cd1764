//! JSON-over-HTTP client with timeouts and retry.
//!
//! Shared by the catalog fetcher and the imagery gateway client. Transient
//! failures (connect errors, timeouts, 5xx, 429) are retried with exponential
//! backoff; anything else is returned on the first attempt.

use std::time::Duration;

use log::{debug, warn};
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::RetryPolicy;
use crate::error::NetworkError;

/// HTTP client for JSON endpoints.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    retry: RetryPolicy,
    request_timeout: Duration,
}

impl HttpClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::Request`] if the TLS backend cannot be
    /// initialised.
    pub fn new(request_timeout: Duration, retry: RetryPolicy) -> Result<Self, NetworkError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|source| NetworkError::Request {
                endpoint: "client builder".to_string(),
                source,
            })?;
        Ok(Self {
            client,
            retry,
            request_timeout,
        })
    }

    /// GET `url` and decode the JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError`] once retries are exhausted or on a
    /// non-transient failure.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, NetworkError> {
        self.execute(url, || self.client.get(url)).await
    }

    /// POST `body` as JSON to `url` and decode the JSON answer.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError`] once retries are exhausted or on a
    /// non-transient failure.
    pub async fn post_json<B, T>(&self, url: &str, body: &B) -> Result<T, NetworkError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(url, || self.client.post(url).json(body)).await
    }

    async fn execute<T, F>(&self, url: &str, build: F) -> Result<T, NetworkError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            match self.attempt(url, build()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "{e}; retrying in {delay:?} (attempt {attempt}/{})",
                        self.retry.max_retries
                    );
                    tokio::time::sleep(delay).await;
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        url: &str,
        request: RequestBuilder,
    ) -> Result<T, NetworkError> {
        debug!("HTTP {url}");
        let response = request
            .send()
            .await
            .map_err(|source| self.transport_error(url, source))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::Status {
                endpoint: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| self.transport_error(url, source))?;
        serde_json::from_slice(&body).map_err(|e| NetworkError::Decode {
            endpoint: url.to_string(),
            message: e.to_string(),
        })
    }

    fn transport_error(&self, url: &str, source: reqwest::Error) -> NetworkError {
        if source.is_timeout() {
            NetworkError::Timeout {
                endpoint: url.to_string(),
                after: self.request_timeout,
            }
        } else {
            NetworkError::Request {
                endpoint: url.to_string(),
                source,
            }
        }
    }
}

/// Joins `path` onto `base`, tolerating a trailing slash on the base.
#[must_use]
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
