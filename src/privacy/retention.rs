//! Retention window arithmetic.
//!
//! Field metadata declares a retention window in days; once the window has
//! elapsed relative to the label's submission time, the retention worker
//! redacts or deletes per its configured strategy.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::schema::FieldMetadata;

/// What the retention worker does to a label with expired fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionStrategy {
    /// Null out just the expired fields.
    #[default]
    FieldRedaction,
    /// Strip the whole payload, keep the label row and metadata.
    SoftDelete,
    /// Destroy the row. Breaks export reproducibility; opt-in only.
    HardDelete,
}

/// When a field's value expires; `None` for indefinite retention.
pub fn expiration_date(
    metadata: &FieldMetadata,
    submitted_at: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    metadata
        .retention_days
        .map(|days| submitted_at + Duration::days(i64::from(days)))
}

/// True iff the field's retention window has elapsed at `now`.
/// Indefinite retention never expires.
pub fn is_expired(metadata: &FieldMetadata, submitted_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    match expiration_date(metadata, submitted_at) {
        Some(expires_at) => now >= expires_at,
        None => false,
    }
}
