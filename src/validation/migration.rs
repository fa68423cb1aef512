//! Forward payload migrations between schema versions.
//!
//! A migration is a registered transform that rewrites a payload from one
//! version's shape to the next. The engine batches labels out of the
//! store, applies the transform, validates the result against the target
//! definition, and reports per-label failures without aborting the run.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use super::fields::validate_payload;
use crate::model::JsonMap;
use crate::store::{Store, StoreError};

/// Default number of labels pulled per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// A payload rewrite from one schema version to the next.
pub trait PayloadTransform: Send + Sync {
    /// Registry name; schema versions reference it via
    /// `transform_from_previous`.
    fn name(&self) -> &str;

    /// Rewrite a payload into the target version's shape.
    fn apply(&self, payload: &JsonMap) -> Result<JsonMap, String>;
}

/// Migration errors that abort the whole run (per-label failures do not).
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("no transform registered under {0:?}")]
    TransformNotRegistered(String),

    #[error("target version {0} declares no transform_from_previous")]
    NoTransformDeclared(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type MigrationResult<T> = Result<T, MigrationError>;

/// One label that failed to migrate.
#[derive(Debug, Clone)]
pub struct MigrationItemError {
    pub label_id: String,
    pub message: String,
}

/// Outcome of a migration run.
#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    pub migrated: usize,
    pub failed: usize,
    pub errors: Vec<MigrationItemError>,
    /// True when the run counted without writing.
    pub dry_run: bool,
}

/// Holds registered transforms and drives batched migrations.
pub struct MigrationEngine {
    transforms: HashMap<String, Arc<dyn PayloadTransform>>,
    batch_size: usize,
}

impl Default for MigrationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationEngine {
    pub fn new() -> Self {
        Self {
            transforms: HashMap::new(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Register a transform under its name.
    pub fn register(&mut self, transform: Arc<dyn PayloadTransform>) {
        self.transforms
            .insert(transform.name().to_string(), transform);
    }

    /// Migrate every live label on `from_version_id` to
    /// `to_version_id`. The target version must declare the transform to
    /// apply. `dry_run` counts successes and failures without writing.
    pub async fn migrate(
        &self,
        store: &dyn Store,
        tenant_id: &str,
        from_version_id: &str,
        to_version_id: &str,
        dry_run: bool,
    ) -> MigrationResult<MigrationReport> {
        let target = store.get_schema_version(to_version_id, tenant_id).await?;
        let transform_name = target
            .transform_from_previous
            .clone()
            .ok_or_else(|| MigrationError::NoTransformDeclared(to_version_id.to_string()))?;
        let transform = self
            .transforms
            .get(&transform_name)
            .cloned()
            .ok_or(MigrationError::TransformNotRegistered(transform_name))?;

        let mut report = MigrationReport {
            dry_run,
            ..MigrationReport::default()
        };

        let mut offset = 0;
        loop {
            let batch = store
                .list_version_labels(from_version_id, tenant_id, offset, self.batch_size)
                .await?;
            if batch.is_empty() {
                break;
            }
            // Dry runs never write, so the window has to move past the
            // labels already examined; live runs re-home labels onto the
            // target version, shrinking the source listing instead.
            if dry_run {
                offset += batch.len();
            }

            for label in batch {
                let outcome = transform
                    .apply(&label.payload)
                    .and_then(|migrated| {
                        validate_payload(&target.definition, &migrated)
                            .map(|_| migrated)
                            .map_err(|errors| {
                                errors
                                    .iter()
                                    .map(|e| format!("{}: {}", e.field, e.message))
                                    .collect::<Vec<_>>()
                                    .join("; ")
                            })
                    });

                match outcome {
                    Ok(migrated) => {
                        if !dry_run {
                            store
                                .rewrite_label_payload(
                                    &label.id,
                                    tenant_id,
                                    migrated,
                                    Some(to_version_id.to_string()),
                                )
                                .await?;
                        }
                        report.migrated += 1;
                    }
                    Err(message) => {
                        report.failed += 1;
                        report.errors.push(MigrationItemError {
                            label_id: label.id.clone(),
                            message,
                        });
                        // Failed labels stay on the source version; step
                        // past them so live runs make progress too.
                        if !dry_run {
                            offset += 1;
                        }
                    }
                }
            }
        }

        tracing::info!(
            from = from_version_id,
            to = to_version_id,
            migrated = report.migrated,
            failed = report.failed,
            dry_run,
            "schema migration finished"
        );
        Ok(report)
    }
}
