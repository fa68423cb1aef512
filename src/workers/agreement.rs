//! Scheduled agreement recomputation.
//!
//! Finds samples with enough labels for agreement to mean anything,
//! recomputes per sample in chunks, and reports scores through telemetry.
//! Enqueueing is idempotent per queue inside a configurable window so a
//! misfiring scheduler cannot pile up duplicate batch jobs.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::agreement::{self, AgreementError};
use crate::core::{Clock, TelemetryEvent, TelemetrySink};
use crate::model::Label;
use crate::store::Store;

/// Key used in the enqueue window when no queue is given.
const ALL_QUEUES_KEY: &str = "*";

/// Recompute worker tuning.
#[derive(Debug, Clone)]
pub struct AgreementRecomputeConfig {
    /// Samples processed per chunk.
    pub chunk_size: usize,
    /// Window inside which re-enqueueing the same queue is a no-op.
    pub window: ChronoDuration,
    /// Labels required before a sample is worth recomputing.
    pub min_labels: usize,
}

impl Default for AgreementRecomputeConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            window: ChronoDuration::hours(24),
            min_labels: 2,
        }
    }
}

/// Outcome of an enqueue request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    /// The queue was already enqueued inside the idempotence window.
    AlreadyEnqueued,
}

/// Counters from one recompute run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecomputeReport {
    pub samples: usize,
    pub computed: usize,
    pub failed: usize,
}

/// Batch recomputation of per-sample agreement.
pub struct AgreementRecomputeWorker {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    telemetry: Arc<dyn TelemetrySink>,
    config: AgreementRecomputeConfig,
    enqueued: DashMap<String, DateTime<Utc>>,
}

impl AgreementRecomputeWorker {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        telemetry: Arc<dyn TelemetrySink>,
        config: AgreementRecomputeConfig,
    ) -> Self {
        Self {
            store,
            clock,
            telemetry,
            config,
            enqueued: DashMap::new(),
        }
    }

    /// Idempotent enqueue for `(queue_id)`: inside the window, repeat
    /// requests are no-ops.
    pub fn enqueue(&self, queue_id: Option<&str>) -> EnqueueOutcome {
        let key = queue_id.unwrap_or(ALL_QUEUES_KEY).to_string();
        let now = self.clock.now();

        let mut outcome = EnqueueOutcome::Enqueued;
        self.enqueued
            .entry(key)
            .and_modify(|last| {
                if now - *last < self.config.window {
                    outcome = EnqueueOutcome::AlreadyEnqueued;
                } else {
                    *last = now;
                }
            })
            .or_insert(now);
        outcome
    }

    /// Recompute agreement for every qualifying sample, optionally
    /// restricted to one queue.
    pub async fn run_once(&self, queue_id: Option<&str>) -> RecomputeReport {
        let mut report = RecomputeReport::default();

        let sample_ids = match self
            .store
            .samples_with_min_labels(self.config.min_labels, queue_id)
            .await
        {
            Ok(ids) => ids,
            Err(err) => {
                tracing::error!(%err, "agreement recompute could not list samples");
                report.failed += 1;
                return report;
            }
        };
        report.samples = sample_ids.len();

        let labels = match self.store.scan_labels().await {
            Ok(labels) => labels,
            Err(err) => {
                tracing::error!(%err, "agreement recompute could not scan labels");
                report.failed += 1;
                return report;
            }
        };

        let mut by_sample: HashMap<&str, Vec<&Label>> = HashMap::new();
        for label in &labels {
            if !label.is_live() {
                continue;
            }
            if let Some(queue_id) = queue_id {
                if label.queue_id != queue_id {
                    continue;
                }
            }
            by_sample
                .entry(label.sample_id.as_str())
                .or_default()
                .push(label);
        }

        for chunk in sample_ids.chunks(self.config.chunk_size.max(1)) {
            for sample_id in chunk {
                let Some(sample_labels) = by_sample.get(sample_id.as_str()) else {
                    continue;
                };
                let owned: Vec<Label> =
                    sample_labels.iter().map(|label| (*label).clone()).collect();

                match agreement::compute(&owned, None, None) {
                    Ok(score) => {
                        report.computed += 1;
                        self.telemetry.emit(
                            TelemetryEvent::new(["agreement_recompute", "sample"])
                                .tag("sample_id", sample_id.clone())
                                .tag("metric", format!("{:?}", score.metric).to_lowercase())
                                .measure("score", score.score)
                                .measure("raters", score.raters as f64),
                        );
                    }
                    // A sample can drop below the bar between listing and
                    // computing; that is data, not a failure.
                    Err(AgreementError::NotEnoughData) => {}
                    Err(err) => {
                        tracing::warn!(%err, %sample_id, "agreement recompute failed");
                        report.failed += 1;
                    }
                }
            }
        }

        self.telemetry.emit(
            TelemetryEvent::new(["agreement_recompute", "completed"])
                .measure("samples", report.samples as f64)
                .measure("computed", report.computed as f64)
                .measure("failed", report.failed as f64),
        );
        report
    }

    /// Run nightly-style recomputes on an interval; each tick honors the
    /// idempotence window.
    pub fn spawn(self: Arc<Self>, interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if self.enqueue(None) == EnqueueOutcome::Enqueued {
                    self.run_once(None).await;
                }
            }
        })
    }
}
