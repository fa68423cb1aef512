//! Composite policy: a fold over an ordered policy chain.

use super::{Candidate, PolicyResult, Selection, SelectionPolicy};
use crate::model::Labeler;

/// Tries member policies in order.
///
/// The first successful selection wins. A member reporting `NoSamples`
/// falls through to the next; a hard error halts the chain and is
/// returned as-is. An empty chain selects nothing.
pub struct CompositePolicy {
    policies: Vec<Box<dyn SelectionPolicy>>,
}

impl CompositePolicy {
    pub fn new(policies: Vec<Box<dyn SelectionPolicy>>) -> Self {
        Self { policies }
    }
}

impl SelectionPolicy for CompositePolicy {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn select(&self, labeler: &Labeler, candidates: &[Candidate]) -> PolicyResult<Selection> {
        for policy in &self.policies {
            match policy.select(labeler, candidates)? {
                Selection::Chosen(candidate) => return Ok(Selection::Chosen(candidate)),
                Selection::NoSamples => continue,
            }
        }
        Ok(Selection::NoSamples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::test_support::candidates;
    use crate::policy::{PolicyError, RedundancyPolicy, RoundRobinPolicy, WeightedExpertisePolicy};

    #[test]
    fn falls_through_no_samples_to_the_next_policy() {
        // Redundancy with k=0 never selects; round-robin picks up.
        let chain = CompositePolicy::new(vec![
            Box::new(RedundancyPolicy::new(0, true)),
            Box::new(RoundRobinPolicy::new()),
        ]);
        let labeler = Labeler::new("t-1", "alice");
        let pool = candidates(&["s-1", "s-2"]);

        match chain.select(&labeler, &pool).unwrap() {
            Selection::Chosen(c) => assert_eq!(c.sample_id, "s-1"),
            Selection::NoSamples => panic!("round robin should have chosen"),
        }
    }

    #[test]
    fn first_success_wins() {
        let chain = CompositePolicy::new(vec![
            Box::new(RedundancyPolicy::new(2, true)),
            Box::new(RoundRobinPolicy::new()),
        ]);
        let labeler = Labeler::new("t-1", "alice");
        let pool = candidates(&["s-1", "s-2"]);

        // Redundancy picks the least-labeled (first) candidate; round
        // robin is never consulted.
        for _ in 0..3 {
            match chain.select(&labeler, &pool).unwrap() {
                Selection::Chosen(c) => assert_eq!(c.sample_id, "s-1"),
                Selection::NoSamples => panic!("expected a choice"),
            }
        }
    }

    #[test]
    fn hard_errors_halt_the_chain() {
        let chain = CompositePolicy::new(vec![
            Box::new(WeightedExpertisePolicy::new(0.9)),
            Box::new(RoundRobinPolicy::new()),
        ]);
        let labeler = Labeler::new("t-1", "novice");
        let pool = candidates(&["s-1"]);

        let err = chain.select(&labeler, &pool).unwrap_err();
        assert!(matches!(err, PolicyError::LabelerBelowThreshold { .. }));
    }

    #[test]
    fn empty_chain_selects_nothing() {
        let chain = CompositePolicy::new(vec![]);
        let labeler = Labeler::new("t-1", "alice");
        assert!(matches!(
            chain.select(&labeler, &candidates(&["s-1"])).unwrap(),
            Selection::NoSamples
        ));
    }
}
