//! Reservation timeout sweeps.
//!
//! Finds reserved assignments whose deadline has passed and walks each
//! through `reserved -> timed_out -> requeued`, bumping the requeue
//! counter and stamping the delay window. Sweeps are idempotent under
//! overlap: a concurrent sweep losing the optimistic lock just skips the
//! row.

use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;

use crate::core::{Clock, TelemetryEvent, TelemetrySink};
use crate::model::AssignmentStatus;
use crate::store::{Store, StoreError};

/// Timeout worker tuning.
#[derive(Debug, Clone)]
pub struct TimeoutWorkerConfig {
    /// Sweep cadence.
    pub interval: Duration,
    /// Hold-down before a timed-out sample is eligible again.
    pub requeue_delay: ChronoDuration,
}

impl Default for TimeoutWorkerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            requeue_delay: ChronoDuration::zero(),
        }
    }
}

/// Counters from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeoutSweepReport {
    pub timed_out: usize,
    pub requeued: usize,
    pub failed: usize,
}

/// Sweeps expired reservations back into circulation.
pub struct TimeoutWorker {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    telemetry: Arc<dyn TelemetrySink>,
    config: TimeoutWorkerConfig,
}

impl TimeoutWorker {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        telemetry: Arc<dyn TelemetrySink>,
        config: TimeoutWorkerConfig,
    ) -> Self {
        Self {
            store,
            clock,
            telemetry,
            config,
        }
    }

    /// One sweep over every expired reservation.
    pub async fn run_once(&self) -> TimeoutSweepReport {
        let now = self.clock.now();
        let mut report = TimeoutSweepReport::default();

        let expired = match self.store.find_expired_assignments(now).await {
            Ok(expired) => expired,
            Err(err) => {
                tracing::error!(%err, "timeout sweep could not list expired assignments");
                report.failed += 1;
                return report;
            }
        };

        for assignment in expired {
            let mut timing_out = assignment;
            timing_out.status = AssignmentStatus::TimedOut;

            let timed_out = match self.store.update_assignment(timing_out).await {
                Ok(updated) => updated,
                // Another sweep (or a submission) got there first; the
                // at-least-once contract makes that a non-event.
                Err(StoreError::StaleVersion(_)) => continue,
                Err(err) => {
                    tracing::warn!(%err, "timeout transition failed");
                    report.failed += 1;
                    continue;
                }
            };
            report.timed_out += 1;

            let mut requeueing = timed_out;
            requeueing.status = AssignmentStatus::Requeued;
            requeueing.requeue_attempts += 1;
            requeueing.requeue_delay_until = Some(now + self.config.requeue_delay);

            match self.store.update_assignment(requeueing).await {
                Ok(_) => report.requeued += 1,
                Err(err) => {
                    tracing::warn!(%err, "requeue transition failed");
                    report.failed += 1;
                }
            }
        }

        self.telemetry.emit(
            TelemetryEvent::new(["timeout_checker", "completed"])
                .measure("timed_out", report.timed_out as f64)
                .measure("requeued", report.requeued as f64)
                .measure("failed", report.failed as f64),
        );
        tracing::debug!(?report, "timeout sweep completed");
        report
    }

    /// Run sweeps on the configured interval until the task is aborted.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }
}
