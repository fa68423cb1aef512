//! Fleiss' kappa for three or more raters.

use std::collections::{BTreeMap, BTreeSet};

use super::{AgreementError, AgreementResult, Observation};

/// Compute Fleiss' kappa over an `n x k` matrix of samples by raters.
///
/// Only complete cases enter the matrix: samples missing a rating from
/// any rater are dropped (Krippendorff's alpha is the sparse-capable
/// metric). Per-sample agreement is
/// `P_i = (sum_j n_ij^2 - k) / (k (k - 1))`; kappa is
/// `(P_bar - P_bar_e) / (1 - P_bar_e)` with `P_bar_e = sum_j p_j^2`.
pub fn compute_fleiss(observations: &[Observation]) -> AgreementResult<f64> {
    let raters: BTreeSet<&str> = observations.iter().map(|o| o.rater_id.as_str()).collect();
    let k = raters.len();
    if k < 2 {
        return Err(AgreementError::NotEnoughData);
    }

    // sample -> rater -> value, last observation wins.
    let mut by_sample: BTreeMap<&str, BTreeMap<&str, &str>> = BTreeMap::new();
    for obs in observations {
        by_sample
            .entry(obs.sample_id.as_str())
            .or_default()
            .insert(obs.rater_id.as_str(), obs.value.as_str());
    }

    let complete: Vec<&BTreeMap<&str, &str>> = by_sample
        .values()
        .filter(|ratings| ratings.len() == k)
        .collect();
    let n = complete.len();
    if n == 0 {
        return Err(AgreementError::NotEnoughData);
    }

    let mut category_totals: BTreeMap<&str, usize> = BTreeMap::new();
    let mut p_sum = 0.0;
    for ratings in &complete {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for value in ratings.values() {
            *counts.entry(*value).or_default() += 1;
            *category_totals.entry(*value).or_default() += 1;
        }
        let sum_sq: usize = counts.values().map(|c| c * c).sum();
        p_sum += (sum_sq as f64 - k as f64) / (k as f64 * (k as f64 - 1.0));
    }

    let p_bar = p_sum / n as f64;
    let total = (n * k) as f64;
    let p_bar_e: f64 = category_totals
        .values()
        .map(|count| {
            let p = *count as f64 / total;
            p * p
        })
        .sum();

    if (1.0 - p_bar_e).abs() < f64::EPSILON {
        return Ok(1.0);
    }
    Ok((p_bar - p_bar_e) / (1.0 - p_bar_e))
}
