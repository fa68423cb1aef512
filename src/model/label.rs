//! Submitted labels.
//!
//! A label is created once and is immutable afterwards, except for
//! retention-driven field redaction and the soft-delete tombstone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::JsonMap;

/// One labeler's validated annotation of one sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub assignment_id: String,
    pub queue_id: String,
    pub sample_id: String,
    pub labeler_id: String,
    pub tenant_id: String,
    /// The schema version the payload was validated against.
    pub schema_version_id: String,
    /// Accepted payload, keyed by field name.
    pub payload: JsonMap,
    /// Pointer to out-of-band content (large annotations).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_ref: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Seconds between reservation and submission, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labeling_time_seconds: Option<f64>,
    /// Soft-delete tombstone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Label {
    /// A label still counted toward redundancy and agreement.
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}
