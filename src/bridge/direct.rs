//! Direct (in-process) bridge variant.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{BatchFetch, BridgeError, BridgeResult, FetchOptions, SampleBridge, SampleDto};

/// In-process access to Forge's sample table.
///
/// Production deployments back this with the embedded Forge client; tests
/// and single-node setups use [`InMemorySampleSource`].
#[async_trait]
pub trait SampleSource: Send + Sync {
    /// Look a sample up; `Ok(None)` means Forge does not know the id,
    /// `Err` means the lookup itself failed.
    async fn get(&self, id: &str) -> Result<Option<SampleDto>, String>;
}

/// Map-backed sample source.
#[derive(Default)]
pub struct InMemorySampleSource {
    samples: DashMap<String, SampleDto>,
}

impl InMemorySampleSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, sample: SampleDto) {
        self.samples.insert(sample.id.clone(), sample);
    }

    pub fn remove(&self, id: &str) {
        self.samples.remove(id);
    }
}

#[async_trait]
impl SampleSource for InMemorySampleSource {
    async fn get(&self, id: &str) -> Result<Option<SampleDto>, String> {
        Ok(self.samples.get(id).map(|s| s.clone()))
    }
}

/// Bridge variant that queries the sample source in-process.
pub struct DirectBridge<S> {
    source: S,
}

impl<S: SampleSource> DirectBridge<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    async fn lookup(&self, id: &str) -> BridgeResult<SampleDto> {
        match self.source.get(id).await {
            Ok(Some(mut sample)) => {
                sample.source = "direct".to_string();
                sample.validate()?;
                Ok(sample)
            }
            Ok(None) => Err(BridgeError::NotFound(id.to_string())),
            Err(err) => Err(BridgeError::ForgeUnavailable(err)),
        }
    }
}

#[async_trait]
impl<S: SampleSource> SampleBridge for DirectBridge<S> {
    async fn fetch_sample(&self, id: &str, _opts: &FetchOptions) -> BridgeResult<SampleDto> {
        self.lookup(id).await
    }

    async fn fetch_samples(
        &self,
        ids: &[String],
        _opts: &FetchOptions,
    ) -> BridgeResult<BatchFetch> {
        let mut batch = BatchFetch::default();
        for id in ids {
            match self.lookup(id).await {
                Ok(sample) => batch.samples.push(sample),
                Err(BridgeError::NotFound(_)) => batch.missing.push(id.clone()),
                Err(err) => return Err(err),
            }
        }
        Ok(batch)
    }

    async fn verify_exists(&self, id: &str) -> BridgeResult<bool> {
        match self.lookup(id).await {
            Ok(_) => Ok(true),
            Err(BridgeError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn fetch_version(&self, id: &str) -> BridgeResult<String> {
        Ok(self.lookup(id).await?.version)
    }
}
