//! Cohen's kappa for two raters.

use std::collections::{BTreeMap, BTreeSet};

use super::{AgreementError, AgreementResult, Observation};

/// Compute Cohen's kappa over the two raters' paired values.
///
/// `kappa = (p_o - p_e) / (1 - p_e)` where `p_o` is the observed
/// proportion of agreeing samples and `p_e` the chance agreement from the
/// raters' per-category marginals. Requires exactly two raters sharing at
/// least one sample. `p_e = 1` (both raters constant on the same
/// category) yields 1.0.
pub fn compute_cohen(observations: &[Observation]) -> AgreementResult<f64> {
    // rater -> sample -> value; a rater's later observation of the same
    // sample wins.
    let mut by_rater: BTreeMap<&str, BTreeMap<&str, &str>> = BTreeMap::new();
    for obs in observations {
        by_rater
            .entry(obs.rater_id.as_str())
            .or_default()
            .insert(obs.sample_id.as_str(), obs.value.as_str());
    }

    if by_rater.len() != 2 {
        return Err(AgreementError::RequiresExactlyTwoRaters(by_rater.len()));
    }

    let mut raters = by_rater.values();
    let first = raters.next().ok_or(AgreementError::NotEnoughData)?;
    let second = raters.next().ok_or(AgreementError::NotEnoughData)?;

    let common: Vec<&str> = first
        .keys()
        .filter(|sample| second.contains_key(**sample))
        .copied()
        .collect();
    if common.is_empty() {
        return Err(AgreementError::NoCommonSamples);
    }

    let n = common.len() as f64;
    let mut agreements = 0usize;
    let mut first_marginals: BTreeMap<&str, usize> = BTreeMap::new();
    let mut second_marginals: BTreeMap<&str, usize> = BTreeMap::new();

    for sample in &common {
        let a = first[sample];
        let b = second[sample];
        if a == b {
            agreements += 1;
        }
        *first_marginals.entry(a).or_default() += 1;
        *second_marginals.entry(b).or_default() += 1;
    }

    let p_o = agreements as f64 / n;

    let categories: BTreeSet<&str> = first_marginals
        .keys()
        .chain(second_marginals.keys())
        .copied()
        .collect();
    let p_e: f64 = categories
        .iter()
        .map(|category| {
            let a = *first_marginals.get(category).unwrap_or(&0) as f64 / n;
            let b = *second_marginals.get(category).unwrap_or(&0) as f64 / n;
            a * b
        })
        .sum();

    if (1.0 - p_e).abs() < f64::EPSILON {
        return Ok(1.0);
    }
    Ok((p_o - p_e) / (1.0 - p_e))
}
