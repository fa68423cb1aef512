//! Expertise-weighted selection.

use super::{Candidate, PolicyError, PolicyResult, Selection, SelectionPolicy};
use crate::model::Labeler;

/// Difficulty assumed for candidates that declare none.
const DEFAULT_DIFFICULTY: f64 = 0.5;

/// Matches labelers to samples by expertise.
///
/// A labeler whose best domain weight is below `min_threshold` is rejected
/// outright; otherwise the candidate maximizing
/// `expertise(domain) - difficulty` wins.
#[derive(Debug)]
pub struct WeightedExpertisePolicy {
    min_threshold: f64,
}

impl WeightedExpertisePolicy {
    pub fn new(min_threshold: f64) -> Self {
        Self { min_threshold }
    }

    fn score(&self, labeler: &Labeler, candidate: &Candidate) -> f64 {
        let expertise = labeler.expertise_for(candidate.domain.as_deref());
        let difficulty = candidate
            .difficulty
            .map(|d| d.score())
            .unwrap_or(DEFAULT_DIFFICULTY);
        expertise - difficulty
    }
}

impl SelectionPolicy for WeightedExpertisePolicy {
    fn name(&self) -> &'static str {
        "weighted_expertise"
    }

    fn select(&self, labeler: &Labeler, candidates: &[Candidate]) -> PolicyResult<Selection> {
        let expertise = labeler.best_expertise();
        if expertise < self.min_threshold {
            return Err(PolicyError::LabelerBelowThreshold {
                expertise,
                threshold: self.min_threshold,
            });
        }

        let best = candidates.iter().max_by(|a, b| {
            self.score(labeler, a)
                .partial_cmp(&self.score(labeler, b))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(match best {
            Some(candidate) => Selection::Chosen(candidate.clone()),
            None => Selection::NoSamples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Difficulty, DifficultyLevel};

    fn candidate(id: &str, domain: &str, difficulty: DifficultyLevel) -> Candidate {
        let mut c = Candidate::new(id);
        c.domain = Some(domain.to_string());
        c.difficulty = Some(Difficulty::Level(difficulty));
        c
    }

    #[test]
    fn rejects_labelers_below_threshold() {
        let policy = WeightedExpertisePolicy::new(0.7);
        let labeler = Labeler::new("t-1", "novice").with_expertise("radiology", 0.4);

        let err = policy
            .select(&labeler, &[candidate("s-1", "radiology", DifficultyLevel::Easy)])
            .unwrap_err();
        assert_eq!(
            err,
            PolicyError::LabelerBelowThreshold {
                expertise: 0.4,
                threshold: 0.7
            }
        );
    }

    #[test]
    fn prefers_the_best_expertise_to_difficulty_margin() {
        let policy = WeightedExpertisePolicy::new(0.1);
        let labeler = Labeler::new("t-1", "expert")
            .with_expertise("radiology", 0.9)
            .with_expertise("pathology", 0.3);

        let pool = vec![
            // margin 0.9 - 0.8 = 0.1
            candidate("s-hard-rad", "radiology", DifficultyLevel::Hard),
            // margin 0.9 - 0.3 = 0.6  <- winner
            candidate("s-easy-rad", "radiology", DifficultyLevel::Easy),
            // margin 0.3 - 0.3 = 0.0
            candidate("s-easy-path", "pathology", DifficultyLevel::Easy),
        ];

        match policy.select(&labeler, &pool).unwrap() {
            Selection::Chosen(c) => assert_eq!(c.sample_id, "s-easy-rad"),
            Selection::NoSamples => panic!("expected a choice"),
        }
    }

    #[test]
    fn unknown_domains_score_zero_expertise() {
        let policy = WeightedExpertisePolicy::new(0.1);
        let labeler = Labeler::new("t-1", "expert").with_expertise("radiology", 0.9);

        let pool = vec![
            candidate("s-unknown", "astrology", DifficultyLevel::Easy),
            candidate("s-known", "radiology", DifficultyLevel::Hard),
        ];

        // 0.9 - 0.8 = 0.1 beats 0.0 - 0.3 = -0.3.
        match policy.select(&labeler, &pool).unwrap() {
            Selection::Chosen(c) => assert_eq!(c.sample_id, "s-known"),
            Selection::NoSamples => panic!("expected a choice"),
        }
    }

    #[test]
    fn empty_pool_is_no_samples() {
        let policy = WeightedExpertisePolicy::new(0.0);
        let labeler = Labeler::new("t-1", "anyone");
        assert!(matches!(
            policy.select(&labeler, &[]).unwrap(),
            Selection::NoSamples
        ));
    }
}
