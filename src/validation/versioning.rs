//! Schema-version freeze semantics.
//!
//! A version is frozen the moment the first label is written against it.
//! Freezing is a one-way door: `frozen_at` is set once and never cleared.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::SchemaVersion;

/// Versioning errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersioningError {
    #[error("schema version {0} is already frozen")]
    AlreadyFrozen(String),

    #[error("schema version {0} is immutable")]
    Immutable(String),
}

pub type VersioningResult<T> = Result<T, VersioningError>;

/// Explicitly freeze a version. Freezing an already-frozen version is an
/// error; callers that want idempotence use [`freeze_on_first_write`].
pub fn freeze(version: &mut SchemaVersion, now: DateTime<Utc>) -> VersioningResult<()> {
    if version.frozen_at.is_some() {
        return Err(VersioningError::AlreadyFrozen(version.id.clone()));
    }
    version.frozen_at = Some(now);
    Ok(())
}

/// Freeze a version if it is not frozen yet. Invoked by label submission;
/// returns whether this call performed the freeze.
pub fn freeze_on_first_write(version: &mut SchemaVersion, now: DateTime<Utc>) -> bool {
    if version.frozen_at.is_none() {
        version.frozen_at = Some(now);
        true
    } else {
        false
    }
}

/// Guard for definition edits: only unfrozen, unreferenced versions may
/// change.
pub fn ensure_mutable(version: &SchemaVersion) -> VersioningResult<()> {
    if version.is_mutable() {
        Ok(())
    } else {
        Err(VersioningError::Immutable(version.id.clone()))
    }
}
