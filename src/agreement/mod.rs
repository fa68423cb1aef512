//! Inter-rater agreement.
//!
//! Pure math over rater × sample observations extracted from labels.
//! Auto-selection picks Cohen's kappa for exactly two raters and Fleiss'
//! kappa for three or more; Krippendorff's alpha handles sparse matrices
//! and is chosen explicitly. Scores are never clamped: anti-correlated
//! raters legitimately produce negative values.

pub mod cohen;
pub mod fleiss;
pub mod krippendorff;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::Label;

pub use cohen::compute_cohen;
pub use fleiss::compute_fleiss;
pub use krippendorff::compute_krippendorff;

/// Agreement metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementMetric {
    Cohen,
    Fleiss,
    /// Nominal distance only.
    Krippendorff,
}

/// Agreement computation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgreementError {
    #[error("cohen's kappa requires exactly two raters, got {0}")]
    RequiresExactlyTwoRaters(usize),

    #[error("the two raters share no samples")]
    NoCommonSamples,

    #[error("not enough data to compute agreement")]
    NotEnoughData,
}

pub type AgreementResult<T> = Result<T, AgreementError>;

/// One rater's categorical value for one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub sample_id: String,
    pub rater_id: String,
    pub value: String,
}

/// Computed agreement plus the context it was computed over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgreementScore {
    pub metric: AgreementMetric,
    pub score: f64,
    pub raters: usize,
    pub samples: usize,
}

/// Extract categorical observations from labels.
///
/// When `field` is given, labels lacking it are skipped; otherwise each
/// label contributes its first payload key (payload maps iterate in key
/// order, so "first" is deterministic). Values are compared as strings.
pub fn observations_from_labels(labels: &[Label], field: Option<&str>) -> Vec<Observation> {
    labels
        .iter()
        .filter(|label| label.is_live())
        .filter_map(|label| {
            let value = match field {
                Some(name) => label.payload.get(name)?,
                None => label.payload.values().next()?,
            };
            Some(Observation {
                sample_id: label.sample_id.clone(),
                rater_id: label.labeler_id.clone(),
                value: stringify(value),
            })
        })
        .collect()
}

/// Compute agreement over labels, selecting the metric automatically when
/// none is requested.
pub fn compute(
    labels: &[Label],
    field: Option<&str>,
    metric: Option<AgreementMetric>,
) -> AgreementResult<AgreementScore> {
    let observations = observations_from_labels(labels, field);
    compute_observations(&observations, metric)
}

/// Compute agreement over pre-extracted observations.
pub fn compute_observations(
    observations: &[Observation],
    metric: Option<AgreementMetric>,
) -> AgreementResult<AgreementScore> {
    let raters = distinct_raters(observations);
    let samples = distinct_samples(observations);

    let metric = match metric {
        Some(metric) => metric,
        None => match raters {
            0 | 1 => return Err(AgreementError::NotEnoughData),
            2 => AgreementMetric::Cohen,
            _ => AgreementMetric::Fleiss,
        },
    };

    let score = match metric {
        AgreementMetric::Cohen => compute_cohen(observations)?,
        AgreementMetric::Fleiss => compute_fleiss(observations)?,
        AgreementMetric::Krippendorff => compute_krippendorff(observations)?,
    };

    Ok(AgreementScore {
        metric,
        score,
        raters,
        samples,
    })
}

fn distinct_raters(observations: &[Observation]) -> usize {
    let mut raters: Vec<&str> = observations.iter().map(|o| o.rater_id.as_str()).collect();
    raters.sort_unstable();
    raters.dedup();
    raters.len()
}

fn distinct_samples(observations: &[Observation]) -> usize {
    let mut samples: Vec<&str> = observations.iter().map(|o| o.sample_id.as_str()).collect();
    samples.sort_unstable();
    samples.dedup();
    samples.len()
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Observation list builder used across the agreement tests.
#[cfg(test)]
pub(crate) fn obs(triples: &[(&str, &str, &str)]) -> Vec<Observation> {
    triples
        .iter()
        .map(|(sample, rater, value)| Observation {
            sample_id: sample.to_string(),
            rater_id: rater.to_string(),
            value: value.to_string(),
        })
        .collect()
}
