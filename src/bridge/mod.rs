//! Bridge to the external Forge sample store.
//!
//! Sample content never lives in this service; the bridge fetches it by
//! id. Three interchangeable variants:
//!
//! - [`DirectBridge`]: in-process lookup against a [`SampleSource`]
//! - [`HttpBridge`]: remote Forge over HTTP, wrapped in a circuit breaker
//! - [`CachedBridge`]: TTL cache over any primary, with graceful batch
//!   degradation and bounded-concurrency warming

pub mod cached;
pub mod circuit;
pub mod direct;
pub mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::model::JsonMap;

pub use cached::CachedBridge;
pub use circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use direct::{DirectBridge, InMemorySampleSource, SampleSource};
pub use http::HttpBridge;

/// Default per-fetch timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Bridge errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Forge is unreachable or failing.
    #[error("forge unavailable: {0}")]
    ForgeUnavailable(String),

    /// The circuit breaker is open; the call was not attempted.
    #[error("circuit open")]
    CircuitOpen,

    /// Forge does not know this sample.
    #[error("sample not found: {0}")]
    NotFound(String),

    /// Forge answered with an unexpected HTTP status.
    #[error("http error: status {0}")]
    HttpError(u16),

    /// The returned document is missing required fields.
    #[error("invalid sample: {0}")]
    InvalidSample(String),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

/// Per-call fetch options.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Skip the cache layer even on a [`CachedBridge`].
    pub bypass_cache: bool,
    /// Override the per-fetch timeout.
    pub timeout: Option<Duration>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            bypass_cache: false,
            timeout: None,
        }
    }
}

impl FetchOptions {
    pub fn bypassing_cache() -> Self {
        Self {
            bypass_cache: true,
            ..Self::default()
        }
    }
}

/// A sample document as served by Forge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleDto {
    pub id: String,
    pub content: serde_json::Value,
    pub version: String,
    #[serde(default)]
    pub metadata: JsonMap,
    #[serde(default)]
    pub asset_urls: Vec<String>,
    /// Which backend produced the document.
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl SampleDto {
    /// `id`, `content`, and `version` are mandatory.
    pub fn validate(&self) -> BridgeResult<()> {
        if self.id.is_empty() {
            return Err(BridgeError::InvalidSample("missing id".into()));
        }
        if self.content.is_null() {
            return Err(BridgeError::InvalidSample("missing content".into()));
        }
        if self.version.is_empty() {
            return Err(BridgeError::InvalidSample("missing version".into()));
        }
        Ok(())
    }
}

/// Result of a batch fetch; `warning` is set when the primary failed and
/// only the cached subset could be served.
#[derive(Debug, Clone, Default)]
pub struct BatchFetch {
    pub samples: Vec<SampleDto>,
    /// Ids Forge reported as unknown.
    pub missing: Vec<String>,
    pub warning: Option<String>,
}

/// Pluggable access to the external sample store.
#[async_trait]
pub trait SampleBridge: Send + Sync {
    /// Fetch one sample.
    async fn fetch_sample(&self, id: &str, opts: &FetchOptions) -> BridgeResult<SampleDto>;

    /// Fetch many samples.
    async fn fetch_samples(&self, ids: &[String], opts: &FetchOptions)
        -> BridgeResult<BatchFetch>;

    /// Whether the sample exists in Forge.
    async fn verify_exists(&self, id: &str) -> BridgeResult<bool>;

    /// Current version tag of the sample.
    async fn fetch_version(&self, id: &str) -> BridgeResult<String>;
}
