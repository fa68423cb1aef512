//! Sample references.
//!
//! Canonical sample content lives in the external Forge store; the service
//! keeps a reference plus the local metadata the policy engine consumes.

use serde::{Deserialize, Serialize};

use super::JsonMap;

/// Named difficulty buckets with their conventional score mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLevel {
    Easy,
    Medium,
    Hard,
}

/// Sample difficulty: either a named bucket or a raw numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Difficulty {
    Level(DifficultyLevel),
    Score(f64),
}

impl Difficulty {
    /// Numeric difficulty used by expertise-weighted selection.
    pub fn score(&self) -> f64 {
        match self {
            Difficulty::Level(DifficultyLevel::Easy) => 0.3,
            Difficulty::Level(DifficultyLevel::Medium) => 0.5,
            Difficulty::Level(DifficultyLevel::Hard) => 0.8,
            Difficulty::Score(s) => *s,
        }
    }
}

/// A queue-scoped reference to a sample held in Forge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleRef {
    pub id: String,
    pub queue_id: String,
    pub tenant_id: String,
    /// Id of the sample in the external store.
    pub forge_sample_id: String,
    /// Difficulty bucket or score, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    /// Expertise domain the sample belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Anything else the registrar attached.
    #[serde(default)]
    pub metadata: JsonMap,
}

impl SampleRef {
    pub fn new(
        queue_id: impl Into<String>,
        tenant_id: impl Into<String>,
        forge_sample_id: impl Into<String>,
    ) -> Self {
        Self {
            id: super::new_id(),
            queue_id: queue_id.into(),
            tenant_id: tenant_id.into(),
            forge_sample_id: forge_sample_id.into(),
            difficulty: None,
            domain: None,
            metadata: JsonMap::new(),
        }
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = Some(difficulty);
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }
}
