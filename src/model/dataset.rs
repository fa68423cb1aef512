//! Datasets: named sample collections with read-only slices.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A tenant-scoped, named collection of samples, optionally partitioned
/// into named slices (train/validation/holdout and the like).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub sample_ids: Vec<String>,
    /// Slice name → subset of `sample_ids`.
    #[serde(default)]
    pub slices: HashMap<String, Vec<String>>,
    pub created_at: DateTime<Utc>,
}

impl Dataset {
    pub fn new(
        tenant_id: impl Into<String>,
        name: impl Into<String>,
        sample_ids: Vec<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: super::new_id(),
            tenant_id: tenant_id.into(),
            name: name.into(),
            sample_ids,
            slices: HashMap::new(),
            created_at,
        }
    }

    pub fn with_slice(mut self, name: impl Into<String>, sample_ids: Vec<String>) -> Self {
        self.slices.insert(name.into(), sample_ids);
        self
    }

    pub fn slice(&self, name: &str) -> Option<&[String]> {
        self.slices.get(name).map(|s| s.as_slice())
    }
}
