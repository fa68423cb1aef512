//! Krippendorff's alpha, coincidence-matrix form, nominal distance.

use std::collections::BTreeMap;

use super::{AgreementError, AgreementResult, Observation};

/// Compute Krippendorff's alpha over possibly-sparse observations.
///
/// Each sample with `m >= 2` present values contributes
/// `count_i * (count_i - 1) / (m - 1)` to the coincidence diagonal and
/// `count_i * count_j / (m - 1)` off-diagonal. Observed disagreement is
/// the off-diagonal mass; expected disagreement comes from the category
/// marginals; `alpha = 1 - D_o / D_e`, with `D_e = 0` yielding 1.0.
pub fn compute_krippendorff(observations: &[Observation]) -> AgreementResult<f64> {
    // sample -> category -> count. A rater absent on a sample simply
    // contributes nothing; that is the sparse case this metric exists for.
    let mut by_sample: BTreeMap<&str, BTreeMap<&str, f64>> = BTreeMap::new();
    for obs in observations {
        *by_sample
            .entry(obs.sample_id.as_str())
            .or_default()
            .entry(obs.value.as_str())
            .or_default() += 1.0;
    }

    // Coincidence matrix, keyed (category, category).
    let mut coincidence: BTreeMap<(&str, &str), f64> = BTreeMap::new();
    let mut pairable_units = 0usize;
    for counts in by_sample.values() {
        let m: f64 = counts.values().sum();
        if m < 2.0 {
            continue;
        }
        pairable_units += 1;
        for (cat_a, count_a) in counts {
            for (cat_b, count_b) in counts {
                let weight = if cat_a == cat_b {
                    count_a * (count_a - 1.0) / (m - 1.0)
                } else {
                    count_a * count_b / (m - 1.0)
                };
                *coincidence.entry((cat_a, cat_b)).or_default() += weight;
            }
        }
    }

    if pairable_units == 0 {
        return Err(AgreementError::NotEnoughData);
    }

    let mut marginals: BTreeMap<&str, f64> = BTreeMap::new();
    for ((cat_a, _), weight) in &coincidence {
        *marginals.entry(*cat_a).or_default() += weight;
    }
    let total: f64 = marginals.values().sum();

    let observed_disagreement: f64 = coincidence
        .iter()
        .filter(|((a, b), _)| a != b)
        .map(|(_, weight)| weight)
        .sum();

    let expected_disagreement: f64 = marginals
        .iter()
        .flat_map(|(cat_a, n_a)| {
            marginals.iter().filter_map(move |(cat_b, n_b)| {
                (cat_a != cat_b).then(|| n_a * n_b / (total - 1.0))
            })
        })
        .sum();

    if expected_disagreement.abs() < f64::EPSILON {
        return Ok(1.0);
    }
    Ok(1.0 - observed_disagreement / expected_disagreement)
}
