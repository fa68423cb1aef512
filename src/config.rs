//! Service configuration.
//!
//! Everything is loaded from `ANVIL_*` environment variables over
//! sensible defaults; the binary calls [`ServiceConfig::from_env`] once
//! at startup and hands pieces to the subsystems that need them.

use std::env;
use std::time::Duration;

/// Which bridge variant talks to Forge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BridgeBackend {
    #[default]
    Direct,
    Http,
    Cached,
}

impl BridgeBackend {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "direct" => Some(BridgeBackend::Direct),
            "http" => Some(BridgeBackend::Http),
            "cached" => Some(BridgeBackend::Cached),
            _ => None,
        }
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Serve the HTTP API.
    pub api_enabled: bool,
    /// Bind address for the API server.
    pub bind_addr: String,
    /// Bridge variant used for sample access.
    pub bridge_backend: BridgeBackend,
    /// Primary variant wrapped by the cached bridge.
    pub bridge_primary_backend: BridgeBackend,
    /// Sample cache TTL.
    pub cache_ttl: Duration,
    /// Forge base URL for the HTTP bridge.
    pub http_base_url: String,
    /// Bearer token for the HTTP bridge.
    pub http_api_token: String,
    /// Per-request timeout for the HTTP bridge.
    pub http_timeout: Duration,
    /// Master secret for labeler pseudonyms; must be at least 32 bytes.
    pub pseudonym_secret: String,
    /// Default retention window for audit records, in days.
    pub retention_days_default: i64,
    /// Timeout-sweep cadence.
    pub timeout_worker_interval: Duration,
    /// Hold-down before a timed-out sample is eligible again, seconds.
    pub requeue_delay_secs: i64,
    /// Accept label submissions from `pending` assignments.
    pub permissive_submission: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_enabled: true,
            bind_addr: "0.0.0.0:8080".to_string(),
            bridge_backend: BridgeBackend::Direct,
            bridge_primary_backend: BridgeBackend::Direct,
            cache_ttl: Duration::from_millis(60_000),
            http_base_url: String::new(),
            http_api_token: String::new(),
            http_timeout: Duration::from_millis(5_000),
            // Development-only default; deployments override it.
            pseudonym_secret: "anvil-development-pseudonym-secret-0123456789".to_string(),
            retention_days_default: 2555,
            timeout_worker_interval: Duration::from_secs(300),
            requeue_delay_secs: 0,
            permissive_submission: false,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the environment over defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(enabled) = env_bool("ANVIL_API_ENABLED") {
            config.api_enabled = enabled;
        }
        if let Ok(addr) = env::var("ANVIL_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(backend) = env_str("ANVIL_SAMPLE_BRIDGE_BACKEND").and_then(|v| BridgeBackend::parse(&v))
        {
            config.bridge_backend = backend;
        }
        if let Some(backend) =
            env_str("ANVIL_SAMPLE_BRIDGE_PRIMARY_BACKEND").and_then(|v| BridgeBackend::parse(&v))
        {
            config.bridge_primary_backend = backend;
        }
        if let Some(ms) = env_u64("ANVIL_CACHE_TTL_MS") {
            config.cache_ttl = Duration::from_millis(ms);
        }
        if let Ok(url) = env::var("ANVIL_HTTP_BASE_URL") {
            config.http_base_url = url;
        }
        if let Ok(token) = env::var("ANVIL_HTTP_API_TOKEN") {
            config.http_api_token = token;
        }
        if let Some(ms) = env_u64("ANVIL_HTTP_TIMEOUT_MS") {
            config.http_timeout = Duration::from_millis(ms);
        }
        if let Ok(secret) = env::var("ANVIL_PSEUDONYM_SECRET") {
            config.pseudonym_secret = secret;
        }
        if let Some(days) = env_u64("ANVIL_RETENTION_DAYS_DEFAULT") {
            config.retention_days_default = days as i64;
        }
        if let Some(secs) = env_u64("ANVIL_TIMEOUT_WORKER_INTERVAL_SECS") {
            config.timeout_worker_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("ANVIL_REQUEUE_DELAY_SECS") {
            config.requeue_delay_secs = secs as i64;
        }
        if let Some(permissive) = env_bool("ANVIL_PERMISSIVE_SUBMISSION") {
            config.permissive_submission = permissive;
        }

        config
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    env::var(key).ok().and_then(|v| match v.as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    })
}
