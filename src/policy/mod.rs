//! Pluggable sample-selection policies.
//!
//! The dispatcher hands a policy the requesting labeler and the eligible
//! candidate set; the policy picks the next sample or reports that none
//! fit. Policies are instantiated per queue from the queue's declarative
//! [`PolicyConfig`] and keep whatever state they need internally; nothing
//! global is mutated.

pub mod composite;
pub mod random;
pub mod redundancy;
pub mod round_robin;
pub mod weighted;

use std::collections::HashSet;
use thiserror::Error;

use crate::model::{Difficulty, Labeler, PolicyConfig};

pub use composite::CompositePolicy;
pub use random::RandomPolicy;
pub use redundancy::RedundancyPolicy;
pub use round_robin::RoundRobinPolicy;
pub use weighted::WeightedExpertisePolicy;

/// A sample eligible for assignment, with the state the policies need.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub sample_id: String,
    /// Live labels already collected for the sample.
    pub label_count: u32,
    /// Labelers with a live label on the sample.
    pub prior_labelers: HashSet<String>,
    pub difficulty: Option<Difficulty>,
    pub domain: Option<String>,
}

impl Candidate {
    pub fn new(sample_id: impl Into<String>) -> Self {
        Self {
            sample_id: sample_id.into(),
            label_count: 0,
            prior_labelers: HashSet::new(),
            difficulty: None,
            domain: None,
        }
    }
}

/// Outcome of a selection round.
#[derive(Debug, Clone)]
pub enum Selection {
    Chosen(Candidate),
    /// Nothing currently eligible; not an error.
    NoSamples,
}

/// Hard policy failures; these halt a composite chain.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyError {
    #[error("labeler below expertise threshold: {expertise} < {threshold}")]
    LabelerBelowThreshold { expertise: f64, threshold: f64 },

    #[error("invalid policy configuration: {0}")]
    InvalidConfig(String),
}

pub type PolicyResult<T> = Result<T, PolicyError>;

/// A selection policy over the candidate list.
pub trait SelectionPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Pick the next sample for `labeler` out of `candidates`.
    fn select(&self, labeler: &Labeler, candidates: &[Candidate]) -> PolicyResult<Selection>;
}

/// Build a live policy from a queue's configuration.
pub fn build_policy(config: &PolicyConfig) -> Box<dyn SelectionPolicy> {
    match config {
        PolicyConfig::RoundRobin => Box::new(RoundRobinPolicy::new()),
        PolicyConfig::Random => Box::new(RandomPolicy::new()),
        PolicyConfig::WeightedExpertise { min_threshold } => {
            Box::new(WeightedExpertisePolicy::new(*min_threshold))
        }
        PolicyConfig::Redundancy {
            labels_per_sample,
            allow_same_labeler,
        } => Box::new(RedundancyPolicy::new(*labels_per_sample, *allow_same_labeler)),
        PolicyConfig::Composite { policies } => {
            Box::new(CompositePolicy::new(policies.iter().map(build_policy).collect()))
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Candidate;

    pub fn candidates(ids: &[&str]) -> Vec<Candidate> {
        ids.iter().map(|id| Candidate::new(*id)).collect()
    }
}
