//! Round-robin selection.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::{Candidate, PolicyResult, Selection, SelectionPolicy};
use crate::model::Labeler;

/// Cycles through the candidate list; the cursor advances on every
/// successful choice.
#[derive(Debug, Default)]
pub struct RoundRobinPolicy {
    cursor: AtomicUsize,
}

impl RoundRobinPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SelectionPolicy for RoundRobinPolicy {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn select(&self, _labeler: &Labeler, candidates: &[Candidate]) -> PolicyResult<Selection> {
        if candidates.is_empty() {
            return Ok(Selection::NoSamples);
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % candidates.len();
        Ok(Selection::Chosen(candidates[index].clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::test_support::candidates;

    fn chosen_id(selection: Selection) -> String {
        match selection {
            Selection::Chosen(c) => c.sample_id,
            Selection::NoSamples => panic!("expected a choice"),
        }
    }

    #[test]
    fn cycles_through_candidates() {
        let policy = RoundRobinPolicy::new();
        let labeler = Labeler::new("t-1", "alice");
        let pool = candidates(&["s-1", "s-2", "s-3"]);

        let picks: Vec<String> = (0..4)
            .map(|_| chosen_id(policy.select(&labeler, &pool).unwrap()))
            .collect();
        assert_eq!(picks, ["s-1", "s-2", "s-3", "s-1"]);
    }

    #[test]
    fn empty_pool_is_no_samples() {
        let policy = RoundRobinPolicy::new();
        let labeler = Labeler::new("t-1", "alice");
        assert!(matches!(
            policy.select(&labeler, &[]).unwrap(),
            Selection::NoSamples
        ));
    }
}
