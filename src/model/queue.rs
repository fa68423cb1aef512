//! Queues: the unit of work distribution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Queue lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    #[default]
    Active,
    Paused,
    Archived,
}

/// Declarative policy configuration stored on the queue.
///
/// The policy engine builds a live selection policy from this; `composite`
/// is a fold over its member configurations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyConfig {
    RoundRobin,
    Random,
    WeightedExpertise {
        min_threshold: f64,
    },
    Redundancy {
        labels_per_sample: u32,
        #[serde(default)]
        allow_same_labeler: bool,
    },
    Composite {
        policies: Vec<PolicyConfig>,
    },
}

impl Default for PolicyConfig {
    fn default() -> Self {
        PolicyConfig::Redundancy {
            labels_per_sample: 1,
            allow_same_labeler: false,
        }
    }
}

/// A named, tenant-scoped work queue bound to one schema version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Queue {
    pub id: String,
    pub tenant_id: String,
    /// Unique within the tenant.
    pub name: String,
    /// The schema version submissions validate against.
    pub schema_version_id: String,
    /// Forge module the queue's samples are drawn from.
    pub component_module: String,
    /// Selection policy configuration.
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub status: QueueStatus,
    /// Redundancy target: desired labels per sample.
    pub labels_per_sample: u32,
    /// Reservation lease length in seconds.
    pub timeout_seconds: i64,
    pub created_at: DateTime<Utc>,
}

impl Queue {
    /// Default lease length when a queue does not override it.
    pub const DEFAULT_TIMEOUT_SECONDS: i64 = 3600;

    pub fn new(
        tenant_id: impl Into<String>,
        name: impl Into<String>,
        schema_version_id: impl Into<String>,
        component_module: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: super::new_id(),
            tenant_id: tenant_id.into(),
            name: name.into(),
            schema_version_id: schema_version_id.into(),
            component_module: component_module.into(),
            policy: PolicyConfig::default(),
            status: QueueStatus::Active,
            labels_per_sample: 1,
            timeout_seconds: Self::DEFAULT_TIMEOUT_SECONDS,
            created_at,
        }
    }

    /// Set the redundancy target.
    pub fn with_labels_per_sample(mut self, k: u32) -> Self {
        self.labels_per_sample = k;
        self
    }

    /// Set the selection policy.
    pub fn with_policy(mut self, policy: PolicyConfig) -> Self {
        self.policy = policy;
        self
    }

    /// Set the lease length.
    pub fn with_timeout_seconds(mut self, seconds: i64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Whether the queue hands out work.
    pub fn accepts_assignments(&self) -> bool {
        self.status == QueueStatus::Active
    }
}
