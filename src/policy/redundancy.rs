//! Redundancy-driven selection.

use super::{Candidate, PolicyResult, Selection, SelectionPolicy};
use crate::model::Labeler;

/// Fills samples up to the redundancy target `k`, least-labeled first.
///
/// With `allow_same_labeler = false` (the default posture), candidates the
/// requesting labeler already has a live label on are excluded.
#[derive(Debug)]
pub struct RedundancyPolicy {
    labels_per_sample: u32,
    allow_same_labeler: bool,
}

impl RedundancyPolicy {
    pub fn new(labels_per_sample: u32, allow_same_labeler: bool) -> Self {
        Self {
            labels_per_sample,
            allow_same_labeler,
        }
    }
}

impl SelectionPolicy for RedundancyPolicy {
    fn name(&self) -> &'static str {
        "redundancy"
    }

    fn select(&self, labeler: &Labeler, candidates: &[Candidate]) -> PolicyResult<Selection> {
        let eligible = candidates
            .iter()
            .filter(|c| c.label_count < self.labels_per_sample)
            .filter(|c| self.allow_same_labeler || !c.prior_labelers.contains(&labeler.id))
            .min_by_key(|c| c.label_count);

        Ok(match eligible {
            Some(candidate) => Selection::Chosen(candidate.clone()),
            None => Selection::NoSamples,
        })
    }
}
