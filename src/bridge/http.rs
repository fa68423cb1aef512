//! HTTP bridge variant.
//!
//! Talks to a remote Forge over `GET /api/samples/:id` with a bearer
//! token. Every call is gated by a circuit breaker: repeated failures
//! trip it and subsequent calls fail fast without touching the network.
//! A 404 is a successful round trip and never trips the breaker.

use async_trait::async_trait;
use std::time::Duration;

use super::circuit::{CircuitBreaker, CircuitBreakerConfig};
use super::{
    BatchFetch, BridgeError, BridgeResult, FetchOptions, SampleBridge, SampleDto,
    DEFAULT_FETCH_TIMEOUT,
};

/// Bridge variant backed by a remote Forge instance.
pub struct HttpBridge {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
    timeout: Duration,
    breaker: CircuitBreaker,
}

impl HttpBridge {
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self::with_breaker(base_url, api_token, CircuitBreakerConfig::default())
    }

    pub fn with_breaker(
        base_url: impl Into<String>,
        api_token: impl Into<String>,
        breaker: CircuitBreakerConfig,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_token: api_token.into(),
            timeout: DEFAULT_FETCH_TIMEOUT,
            breaker: CircuitBreaker::new(breaker),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Breaker state, exposed for health reporting.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    fn sample_url(&self, id: &str) -> String {
        format!(
            "{}/api/samples/{}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(id)
        )
    }

    async fn get_sample(&self, id: &str, opts: &FetchOptions) -> BridgeResult<SampleDto> {
        if !self.breaker.allow() {
            return Err(BridgeError::CircuitOpen);
        }

        let timeout = opts.timeout.unwrap_or(self.timeout);
        let response = self
            .client
            .get(self.sample_url(id))
            .bearer_auth(&self.api_token)
            .timeout(timeout)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                self.breaker.record_failure();
                return Err(BridgeError::ForgeUnavailable(err.to_string()));
            }
        };

        match response.status().as_u16() {
            200 => {
                self.breaker.record_success();
                let mut sample: SampleDto = response
                    .json()
                    .await
                    .map_err(|err| BridgeError::InvalidSample(err.to_string()))?;
                sample.source = "http".to_string();
                sample.validate()?;
                Ok(sample)
            }
            404 => {
                // Forge answered; the breaker only cares about transport
                // and server failures.
                self.breaker.record_success();
                Err(BridgeError::NotFound(id.to_string()))
            }
            status => {
                self.breaker.record_failure();
                Err(BridgeError::HttpError(status))
            }
        }
    }
}

#[async_trait]
impl SampleBridge for HttpBridge {
    async fn fetch_sample(&self, id: &str, opts: &FetchOptions) -> BridgeResult<SampleDto> {
        self.get_sample(id, opts).await
    }

    async fn fetch_samples(
        &self,
        ids: &[String],
        opts: &FetchOptions,
    ) -> BridgeResult<BatchFetch> {
        let mut batch = BatchFetch::default();
        for id in ids {
            match self.get_sample(id, opts).await {
                Ok(sample) => batch.samples.push(sample),
                Err(BridgeError::NotFound(_)) => batch.missing.push(id.clone()),
                Err(err) => return Err(err),
            }
        }
        Ok(batch)
    }

    async fn verify_exists(&self, id: &str) -> BridgeResult<bool> {
        match self.get_sample(id, &FetchOptions::default()).await {
            Ok(_) => Ok(true),
            Err(BridgeError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn fetch_version(&self, id: &str) -> BridgeResult<String> {
        Ok(self.get_sample(id, &FetchOptions::default()).await?.version)
    }
}
