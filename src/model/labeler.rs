//! Labeler identities.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The identity submitting annotations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Labeler {
    pub id: String,
    pub tenant_id: String,
    /// Identity-provider id, unique within the tenant.
    pub external_id: String,
    /// Deterministic export alias, derived from the tenant pseudonym
    /// secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pseudonym: Option<String>,
    /// Expertise weight per domain, each in `[0, 1]`.
    #[serde(default)]
    pub expertise: HashMap<String, f64>,
    /// Queues this labeler may not draw from.
    #[serde(default)]
    pub blocked_queues: Vec<String>,
    /// Admission cap on concurrently reserved assignments.
    pub max_concurrent_assignments: u32,
}

impl Labeler {
    pub const DEFAULT_MAX_CONCURRENT: u32 = 5;

    pub fn new(tenant_id: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            id: super::new_id(),
            tenant_id: tenant_id.into(),
            external_id: external_id.into(),
            pseudonym: None,
            expertise: HashMap::new(),
            blocked_queues: Vec::new(),
            max_concurrent_assignments: Self::DEFAULT_MAX_CONCURRENT,
        }
    }

    pub fn with_expertise(mut self, domain: impl Into<String>, weight: f64) -> Self {
        self.expertise.insert(domain.into(), weight);
        self
    }

    pub fn with_max_concurrent(mut self, cap: u32) -> Self {
        self.max_concurrent_assignments = cap;
        self
    }

    /// Highest expertise weight across domains; 0.0 when none are set.
    pub fn best_expertise(&self) -> f64 {
        self.expertise.values().copied().fold(0.0, f64::max)
    }

    /// Expertise for one domain; 0.0 when the labeler has no weight for it.
    pub fn expertise_for(&self, domain: Option<&str>) -> f64 {
        match domain {
            Some(d) => self.expertise.get(d).copied().unwrap_or(0.0),
            None => self.best_expertise(),
        }
    }

    pub fn is_blocked_from(&self, queue_id: &str) -> bool {
        self.blocked_queues.iter().any(|q| q == queue_id)
    }
}
