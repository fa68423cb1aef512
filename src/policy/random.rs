//! Uniform random selection.

use rand::Rng;

use super::{Candidate, PolicyResult, Selection, SelectionPolicy};
use crate::model::Labeler;

/// Picks uniformly at random from the candidate list.
#[derive(Debug, Default)]
pub struct RandomPolicy;

impl RandomPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl SelectionPolicy for RandomPolicy {
    fn name(&self) -> &'static str {
        "random"
    }

    fn select(&self, _labeler: &Labeler, candidates: &[Candidate]) -> PolicyResult<Selection> {
        if candidates.is_empty() {
            return Ok(Selection::NoSamples);
        }
        let index = rand::thread_rng().gen_range(0..candidates.len());
        Ok(Selection::Chosen(candidates[index].clone()))
    }
}
