//! Retention enforcement.
//!
//! Two duties: purge audit records past the configured cutoff, and
//! process labels whose field-level retention windows have elapsed. The
//! label strategy is configurable; dry runs count what would happen
//! without touching anything.

use chrono::Duration as ChronoDuration;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::Clock;
use crate::model::{JsonMap, SchemaVersion};
use crate::privacy::retention::{is_expired, RetentionStrategy};
use crate::store::Store;

/// Audit cutoff default: roughly seven years.
pub const DEFAULT_AUDIT_CUTOFF_DAYS: i64 = 2555;

/// Retention worker tuning.
#[derive(Debug, Clone)]
pub struct RetentionWorkerConfig {
    /// Audit records older than this many days are deleted.
    pub audit_cutoff_days: i64,
    /// What happens to labels with expired fields.
    pub strategy: RetentionStrategy,
    /// Count without acting.
    pub dry_run: bool,
}

impl Default for RetentionWorkerConfig {
    fn default() -> Self {
        Self {
            audit_cutoff_days: DEFAULT_AUDIT_CUTOFF_DAYS,
            strategy: RetentionStrategy::FieldRedaction,
            dry_run: false,
        }
    }
}

/// Counters from one retention pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub audit_deleted: usize,
    pub labels_processed: usize,
    pub fields_redacted: usize,
    pub failed: usize,
}

/// Applies retention policy across the whole store.
pub struct RetentionWorker {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    config: RetentionWorkerConfig,
}

impl RetentionWorker {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        config: RetentionWorkerConfig,
    ) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// One full retention pass.
    pub async fn run_once(&self) -> RetentionReport {
        let now = self.clock.now();
        let mut report = RetentionReport::default();

        if !self.config.dry_run {
            let cutoff = now - ChronoDuration::days(self.config.audit_cutoff_days);
            match self.store.delete_audit_older_than(cutoff).await {
                Ok(deleted) => report.audit_deleted = deleted,
                Err(err) => {
                    tracing::warn!(%err, "audit retention sweep failed");
                    report.failed += 1;
                }
            }
        }

        let labels = match self.store.scan_labels().await {
            Ok(labels) => labels,
            Err(err) => {
                tracing::error!(%err, "retention sweep could not scan labels");
                report.failed += 1;
                return report;
            }
        };

        let mut versions: HashMap<String, SchemaVersion> = HashMap::new();

        for label in labels {
            if !label.is_live() {
                continue;
            }

            let version = match versions.get(&label.schema_version_id) {
                Some(version) => version.clone(),
                None => {
                    match self
                        .store
                        .get_schema_version(&label.schema_version_id, &label.tenant_id)
                        .await
                    {
                        Ok(version) => {
                            versions.insert(label.schema_version_id.clone(), version.clone());
                            version
                        }
                        Err(err) => {
                            tracing::warn!(%err, label_id = %label.id,
                                "retention sweep could not load schema version");
                            report.failed += 1;
                            continue;
                        }
                    }
                }
            };

            let expired_fields: Vec<&str> = version
                .definition
                .iter()
                .filter(|field| label.payload.contains_key(&field.name))
                .filter(|field| is_expired(&field.metadata, label.submitted_at, now))
                .map(|field| field.name.as_str())
                .collect();

            if expired_fields.is_empty() {
                continue;
            }
            report.labels_processed += 1;

            if self.config.dry_run {
                report.fields_redacted += expired_fields.len();
                continue;
            }

            let outcome = match self.config.strategy {
                RetentionStrategy::FieldRedaction => {
                    let mut payload = label.payload.clone();
                    for field in &expired_fields {
                        payload.insert(field.to_string(), serde_json::Value::Null);
                    }
                    report.fields_redacted += expired_fields.len();
                    self.store
                        .rewrite_label_payload(&label.id, &label.tenant_id, payload, None)
                        .await
                        .map(|_| ())
                }
                RetentionStrategy::SoftDelete => {
                    let stripped = self
                        .store
                        .rewrite_label_payload(&label.id, &label.tenant_id, JsonMap::new(), None)
                        .await;
                    match stripped {
                        Ok(_) => self
                            .store
                            .tombstone_label(&label.id, &label.tenant_id, now)
                            .await
                            .map(|_| ()),
                        Err(err) => Err(err),
                    }
                }
                RetentionStrategy::HardDelete => {
                    self.store.delete_label(&label.id, &label.tenant_id).await
                }
            };

            if let Err(err) = outcome {
                tracing::warn!(%err, label_id = %label.id, "retention action failed");
                report.failed += 1;
            }
        }

        tracing::info!(?report, dry_run = self.config.dry_run, "retention pass completed");
        report
    }

    /// Run retention passes on an interval.
    pub fn spawn(self: Arc<Self>, interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }
}
