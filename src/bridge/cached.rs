//! Caching bridge variant.
//!
//! A TTL cache in front of any primary bridge. Batch fetches degrade
//! gracefully: when the primary errors but some of the requested ids are
//! cached, the cached subset is returned with a warning instead of the
//! error. Warming prefetches with bounded concurrency and swallows
//! per-sample failures.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

use super::{
    BatchFetch, BridgeError, BridgeResult, FetchOptions, SampleBridge, SampleDto,
    DEFAULT_FETCH_TIMEOUT,
};
use crate::core::{TelemetryEvent, TelemetrySink};

/// Concurrent fetches during cache warming.
const WARM_CONCURRENCY: usize = 10;

/// Default cache capacity in entries.
const DEFAULT_CAPACITY: u64 = 10_000;

/// TTL cache over a primary [`SampleBridge`].
pub struct CachedBridge {
    primary: Arc<dyn SampleBridge>,
    cache: Cache<String, SampleDto>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl CachedBridge {
    pub fn new(
        primary: Arc<dyn SampleBridge>,
        ttl: Duration,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let cache = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(DEFAULT_CAPACITY)
            .build();
        Self {
            primary,
            cache,
            telemetry,
        }
    }

    fn emit(&self, name: &str, sample_id: &str) {
        self.telemetry
            .emit(TelemetryEvent::new([name]).tag("sample_id", sample_id));
    }

    /// Drop one entry.
    pub async fn invalidate(&self, id: &str) {
        self.cache.invalidate(id).await;
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    /// Prefetch `ids` with bounded concurrency and a per-fetch timeout.
    /// Failures are logged and otherwise silent; returns how many entries
    /// were cached.
    pub async fn warm_cache(&self, ids: &[String]) -> usize {
        let results = stream::iter(ids.to_vec())
            .map(|id| {
                let primary = Arc::clone(&self.primary);
                async move {
                    let fetched = tokio::time::timeout(
                        DEFAULT_FETCH_TIMEOUT,
                        primary.fetch_sample(&id, &FetchOptions::default()),
                    )
                    .await;
                    (id, fetched)
                }
            })
            .buffer_unordered(WARM_CONCURRENCY)
            .collect::<Vec<_>>()
            .await;

        let mut warmed = 0;
        for (id, fetched) in results {
            match fetched {
                Ok(Ok(sample)) => {
                    self.cache.insert(id, sample).await;
                    warmed += 1;
                }
                Ok(Err(err)) => {
                    tracing::debug!(sample_id = %id, %err, "cache warm fetch failed");
                }
                Err(_) => {
                    tracing::debug!(sample_id = %id, "cache warm fetch timed out");
                }
            }
        }
        warmed
    }
}

#[async_trait]
impl SampleBridge for CachedBridge {
    async fn fetch_sample(&self, id: &str, opts: &FetchOptions) -> BridgeResult<SampleDto> {
        if !opts.bypass_cache {
            if let Some(sample) = self.cache.get(id).await {
                self.emit("cache_hit", id);
                return Ok(sample);
            }
        }

        let sample = self.primary.fetch_sample(id, opts).await?;
        self.cache.insert(id.to_string(), sample.clone()).await;
        if !opts.bypass_cache {
            self.emit("cache_miss", id);
        }
        Ok(sample)
    }

    async fn fetch_samples(
        &self,
        ids: &[String],
        opts: &FetchOptions,
    ) -> BridgeResult<BatchFetch> {
        if opts.bypass_cache {
            let batch = self.primary.fetch_samples(ids, opts).await?;
            for sample in &batch.samples {
                self.cache.insert(sample.id.clone(), sample.clone()).await;
            }
            return Ok(batch);
        }

        let mut cached = Vec::new();
        let mut uncached = Vec::new();
        for id in ids {
            match self.cache.get(id).await {
                Some(sample) => {
                    self.emit("cache_hit", id);
                    cached.push(sample);
                }
                None => uncached.push(id.clone()),
            }
        }

        if uncached.is_empty() {
            return Ok(BatchFetch {
                samples: cached,
                missing: Vec::new(),
                warning: None,
            });
        }

        match self.primary.fetch_samples(&uncached, opts).await {
            Ok(mut batch) => {
                for sample in &batch.samples {
                    self.emit("cache_miss", &sample.id);
                    self.cache.insert(sample.id.clone(), sample.clone()).await;
                }
                batch.samples.extend(cached);
                batch
                    .samples
                    .sort_by(|a, b| a.id.cmp(&b.id));
                Ok(batch)
            }
            Err(err) if !cached.is_empty() => {
                // Serve what we have rather than failing the whole batch.
                tracing::warn!(%err, served = cached.len(), requested = ids.len(),
                    "primary fetch failed, serving cached subset");
                Ok(BatchFetch {
                    samples: cached,
                    missing: Vec::new(),
                    warning: Some(format!("primary fetch failed: {err}")),
                })
            }
            Err(err) => Err(err),
        }
    }

    async fn verify_exists(&self, id: &str) -> BridgeResult<bool> {
        if self.cache.get(id).await.is_some() {
            return Ok(true);
        }
        self.primary.verify_exists(id).await
    }

    async fn fetch_version(&self, id: &str) -> BridgeResult<String> {
        // Version checks always consult the primary; a cached document may
        // be a TTL behind.
        self.primary.fetch_version(id).await
    }
}
