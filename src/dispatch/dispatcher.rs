//! The assignment dispatcher.

use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::{DispatchError, DispatchResult};
use crate::core::{Clock, TelemetryEvent, TelemetrySink};
use crate::model::{
    Assignment, AssignmentStatus, AuditAction, AuditRecord, JsonMap, Label, Labeler, Queue,
};
use crate::policy::{build_policy, Candidate, Selection, SelectionPolicy};
use crate::store::{Store, StoreError};
use crate::tenant::ensure_isolation;
use crate::validation::validate_payload;

/// Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Bounded retries when an optimistic reserve loses the race.
    pub max_reserve_attempts: u32,
    /// Accept submissions from `pending` assignments as well as
    /// `reserved` ones.
    pub permissive_submission: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_reserve_attempts: 3,
            permissive_submission: false,
        }
    }
}

/// Policy-driven assignment of samples to labelers.
pub struct Dispatcher {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    telemetry: Arc<dyn TelemetrySink>,
    config: DispatcherConfig,
    /// Live policy instance per queue; round-robin cursors and the like
    /// live here.
    policies: DashMap<String, Arc<dyn SelectionPolicy>>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        telemetry: Arc<dyn TelemetrySink>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            clock,
            telemetry,
            config,
            policies: DashMap::new(),
        }
    }

    /// Lease the next sample for `labeler_id` out of `queue_id`.
    pub async fn fetch_next(
        &self,
        queue_id: &str,
        labeler_id: &str,
        tenant_id: &str,
    ) -> DispatchResult<Assignment> {
        let queue = self.store.get_queue(queue_id, tenant_id).await?;
        let labeler = self.store.get_labeler(labeler_id, tenant_id).await?;
        ensure_isolation(&queue, &labeler.tenant_id)?;

        if !queue.accepts_assignments() {
            return Err(DispatchError::NoSamples);
        }
        if labeler.is_blocked_from(&queue.id) {
            return Err(DispatchError::Forbidden(
                "labeler is blocklisted from this queue".into(),
            ));
        }
        let active = self
            .store
            .count_active_assignments(&labeler.id, tenant_id)
            .await?;
        if active >= labeler.max_concurrent_assignments {
            return Err(DispatchError::Forbidden(format!(
                "labeler has {active} active assignments (cap {})",
                labeler.max_concurrent_assignments
            )));
        }

        for attempt in 0..self.config.max_reserve_attempts {
            let candidates = self.build_candidates(&queue, &labeler).await?;
            let policy = self.policy_for(&queue);
            let chosen = match policy.select(&labeler, &candidates)? {
                Selection::Chosen(candidate) => candidate,
                Selection::NoSamples => return Err(DispatchError::NoSamples),
            };

            match self.reserve(&queue, &labeler, &chosen.sample_id).await {
                Ok(assignment) => {
                    self.audit_assignment(&assignment, &labeler.id, AuditAction::Created)
                        .await;
                    self.telemetry.emit(
                        TelemetryEvent::new(["assignment", "created"])
                            .tag("queue_id", &queue.id)
                            .tag("sample_id", &assignment.sample_id)
                            .tag("labeler_id", &labeler.id)
                            .measure("attempt", f64::from(attempt + 1)),
                    );
                    return Ok(assignment);
                }
                Err(DispatchError::Store(
                    StoreError::StaleVersion(_) | StoreError::Conflict(_),
                )) => {
                    // Lost the race; back off briefly, rebuild the
                    // candidate set, and try again.
                    tracing::debug!(
                        queue_id,
                        labeler_id,
                        attempt,
                        "reservation lost optimistic race, retrying"
                    );
                    tokio::time::sleep(retry_backoff(attempt)).await;
                    continue;
                }
                Err(err) => return Err(err),
            }
        }

        // The caller sees an empty queue, not a concurrency artifact.
        Err(DispatchError::NoSamples)
    }

    /// Validate and persist a label for a reserved assignment.
    pub async fn submit_label(
        &self,
        assignment_id: &str,
        labeler_id: &str,
        tenant_id: &str,
        payload: JsonMap,
    ) -> DispatchResult<Label> {
        for _ in 0..self.config.max_reserve_attempts {
            let assignment = self.store.get_assignment(assignment_id, tenant_id).await?;

            if assignment.labeler_id.as_deref() != Some(labeler_id) {
                return Err(DispatchError::Forbidden(
                    "assignment is reserved by another labeler".into(),
                ));
            }
            let submittable = assignment.status == AssignmentStatus::Reserved
                || (self.config.permissive_submission
                    && assignment.status == AssignmentStatus::Pending);
            if !submittable {
                return Err(DispatchError::Forbidden(format!(
                    "assignment is not open for submission (status {:?})",
                    assignment.status
                )));
            }
            let now = self.clock.now();
            if assignment.is_expired(now) {
                return Err(DispatchError::Expired);
            }

            let queue = self.store.get_queue(&assignment.queue_id, tenant_id).await?;
            let version = self
                .store
                .get_schema_version(&queue.schema_version_id, tenant_id)
                .await?;

            validate_payload(&version.definition, &payload).map_err(DispatchError::Validation)?;

            let label = Label {
                id: crate::model::new_id(),
                assignment_id: assignment.id.clone(),
                queue_id: queue.id.clone(),
                sample_id: assignment.sample_id.clone(),
                labeler_id: labeler_id.to_string(),
                tenant_id: tenant_id.to_string(),
                schema_version_id: version.id.clone(),
                payload: payload.clone(),
                blob_ref: None,
                submitted_at: now,
                created_at: now,
                labeling_time_seconds: assignment
                    .reserved_at
                    .map(|at| (now - at).num_milliseconds() as f64 / 1000.0),
                deleted_at: None,
            };

            let mut completing = assignment;
            completing.status = AssignmentStatus::Completed;

            match self.store.submit_label(label, completing).await {
                Ok(label) => {
                    self.telemetry.emit(
                        TelemetryEvent::new(["label", "submitted"])
                            .tag("queue_id", &label.queue_id)
                            .tag("sample_id", &label.sample_id)
                            .tag("labeler_id", labeler_id),
                    );
                    self.store
                        .append_audit(AuditRecord::new(
                            tenant_id,
                            "label",
                            &label.id,
                            AuditAction::Created,
                            labeler_id,
                            now,
                        ))
                        .await
                        .ok();
                    return Ok(label);
                }
                // A timeout sweep may have raced us; reload and re-check.
                Err(StoreError::StaleVersion(_)) => continue,
                Err(err) => return Err(err.into()),
            }
        }

        Err(DispatchError::Expired)
    }

    /// Labeler-initiated skip: release the reservation and requeue the
    /// sample for anyone eligible.
    pub async fn skip(
        &self,
        assignment_id: &str,
        labeler_id: &str,
        tenant_id: &str,
        reason: impl Into<String>,
    ) -> DispatchResult<Assignment> {
        let assignment = self.store.get_assignment(assignment_id, tenant_id).await?;

        if assignment.labeler_id.as_deref() != Some(labeler_id) {
            return Err(DispatchError::Forbidden(
                "assignment is reserved by another labeler".into(),
            ));
        }
        if assignment.status != AssignmentStatus::Reserved {
            return Err(DispatchError::Forbidden(format!(
                "only reserved assignments can be skipped (status {:?})",
                assignment.status
            )));
        }

        let reason = reason.into();
        let now = self.clock.now();

        let mut skipping = assignment.clone();
        skipping.status = AssignmentStatus::Skipped;
        skipping.skip_reason = Some(reason.clone());
        let skipped = self.store.update_assignment(skipping).await?;

        // Fresh pending slot so any eligible labeler can pick the sample
        // up.
        let replacement = Assignment::pending(
            &assignment.queue_id,
            &assignment.sample_id,
            tenant_id,
            assignment.timeout_seconds,
            now,
        );
        self.store.create_assignment(replacement).await?;

        self.audit_assignment(&skipped, labeler_id, AuditAction::Updated)
            .await;
        self.telemetry.emit(
            TelemetryEvent::new(["assignment", "skipped"])
                .tag("queue_id", &skipped.queue_id)
                .tag("sample_id", &skipped.sample_id)
                .tag("reason", reason),
        );
        Ok(skipped)
    }

    /// Eligible candidates: samples under the queue's redundancy target
    /// counting live labels plus active reservations, excluding samples
    /// this labeler currently holds.
    async fn build_candidates(
        &self,
        queue: &Queue,
        labeler: &Labeler,
    ) -> DispatchResult<Vec<Candidate>> {
        let samples = self
            .store
            .list_queue_samples(&queue.id, &queue.tenant_id)
            .await?;
        let assignments = self
            .store
            .list_queue_assignments(&queue.id, &queue.tenant_id)
            .await?;
        let labels = self
            .store
            .list_queue_labels(&queue.id, &queue.tenant_id, 0, usize::MAX)
            .await?;

        let now = self.clock.now();

        let mut label_counts: HashMap<&str, u32> = HashMap::new();
        let mut prior_labelers: HashMap<&str, HashSet<String>> = HashMap::new();
        for label in &labels {
            *label_counts.entry(label.sample_id.as_str()).or_default() += 1;
            prior_labelers
                .entry(label.sample_id.as_str())
                .or_default()
                .insert(label.labeler_id.clone());
        }

        let mut reserved_counts: HashMap<&str, u32> = HashMap::new();
        let mut held_by_labeler: HashSet<&str> = HashSet::new();
        for assignment in &assignments {
            if assignment.status == AssignmentStatus::Reserved {
                *reserved_counts
                    .entry(assignment.sample_id.as_str())
                    .or_default() += 1;
                if assignment.labeler_id.as_deref() == Some(labeler.id.as_str()) {
                    held_by_labeler.insert(assignment.sample_id.as_str());
                }
            }
            // Requeued slots sit out their delay window.
            if assignment.status == AssignmentStatus::Requeued
                && !assignment.requeue_delay_elapsed(now)
            {
                held_by_labeler.insert(assignment.sample_id.as_str());
            }
        }

        let candidates = samples
            .iter()
            .filter(|sample| {
                let labeled = label_counts.get(sample.id.as_str()).copied().unwrap_or(0);
                let reserved = reserved_counts.get(sample.id.as_str()).copied().unwrap_or(0);
                labeled + reserved < queue.labels_per_sample
                    && !held_by_labeler.contains(sample.id.as_str())
            })
            .map(|sample| {
                let mut candidate = Candidate::new(&sample.id);
                candidate.label_count =
                    label_counts.get(sample.id.as_str()).copied().unwrap_or(0);
                candidate.prior_labelers = prior_labelers
                    .get(sample.id.as_str())
                    .cloned()
                    .unwrap_or_default();
                candidate.difficulty = sample.difficulty;
                candidate.domain = sample.domain.clone();
                candidate
            })
            .collect();

        Ok(candidates)
    }

    /// Reserve the chosen sample: transition an existing open slot under
    /// the optimistic lock, or create a fresh reserved assignment.
    async fn reserve(
        &self,
        queue: &Queue,
        labeler: &Labeler,
        sample_id: &str,
    ) -> DispatchResult<Assignment> {
        let now = self.clock.now();
        let assignments = self
            .store
            .list_queue_assignments(&queue.id, &queue.tenant_id)
            .await?;

        let open_slot = assignments.into_iter().find(|a| {
            a.sample_id == sample_id
                && (a.status == AssignmentStatus::Pending
                    || (a.status == AssignmentStatus::Requeued && a.requeue_delay_elapsed(now)))
        });

        match open_slot {
            Some(mut slot) => {
                slot.reserve(&labeler.id, now);
                Ok(self.store.update_assignment(slot).await?)
            }
            None => {
                let assignment = Assignment::reserved(
                    &queue.id,
                    sample_id,
                    &queue.tenant_id,
                    &labeler.id,
                    queue.timeout_seconds,
                    now,
                );
                Ok(self.store.create_assignment(assignment).await?)
            }
        }
    }

    fn policy_for(&self, queue: &Queue) -> Arc<dyn SelectionPolicy> {
        self.policies
            .entry(queue.id.clone())
            .or_insert_with(|| Arc::from(build_policy(&queue.policy)))
            .clone()
    }

    async fn audit_assignment(&self, assignment: &Assignment, actor: &str, action: AuditAction) {
        let record = AuditRecord::new(
            &assignment.tenant_id,
            "assignment",
            &assignment.id,
            action,
            actor,
            self.clock.now(),
        );
        if let Err(err) = self.store.append_audit(record).await {
            tracing::warn!(%err, assignment_id = %assignment.id, "audit append failed");
        }
    }
}

/// Exponential backoff with jitter for lost reservation races.
fn retry_backoff(attempt: u32) -> std::time::Duration {
    use rand::Rng;
    let base = 10u64 << attempt.min(4);
    let jitter = rand::thread_rng().gen_range(0..10);
    std::time::Duration::from_millis(base + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FixedClock, MemorySink};
    use crate::model::{FieldDef, FieldType, PolicyConfig, Queue, SampleRef, SchemaVersion};
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<FixedClock>,
        sink: Arc<MemorySink>,
        dispatcher: Dispatcher,
        queue: Queue,
    }

    async fn fixture(labels_per_sample: u32) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        ));
        let sink = Arc::new(MemorySink::new());

        let version = SchemaVersion::new(
            "q-pending",
            "t-1",
            1,
            vec![
                FieldDef::new("sentiment", FieldType::Select)
                    .required()
                    .with_options(["positive", "negative", "neutral"]),
                FieldDef::new("confidence", FieldType::Range).with_bounds(1.0, 5.0),
            ],
        );
        let version = store.put_schema_version(version).await.unwrap();

        let queue = Queue::new("t-1", "reviews", &version.id, "forge.reviews", clock.now())
            .with_labels_per_sample(labels_per_sample)
            .with_policy(PolicyConfig::Redundancy {
                labels_per_sample,
                allow_same_labeler: false,
            })
            .with_timeout_seconds(600);
        let queue = store.put_queue(queue).await.unwrap();

        for id in ["s-1", "s-2"] {
            let mut sample = SampleRef::new(&queue.id, "t-1", format!("forge-{id}"));
            sample.id = id.to_string();
            store.put_sample(sample).await.unwrap();
        }

        let dispatcher = Dispatcher::new(
            store.clone(),
            clock.clone(),
            sink.clone(),
            DispatcherConfig::default(),
        );

        Fixture {
            store,
            clock,
            sink,
            dispatcher,
            queue,
        }
    }

    async fn add_labeler(fixture: &Fixture, id: &str) -> Labeler {
        let mut labeler = Labeler::new("t-1", format!("ext-{id}"));
        labeler.id = id.to_string();
        fixture.store.put_labeler(labeler.clone()).await.unwrap();
        labeler
    }

    fn sentiment_payload(value: &str) -> JsonMap {
        let mut payload = JsonMap::new();
        payload.insert("sentiment".to_string(), json!(value));
        payload
    }

    #[tokio::test]
    async fn fetch_next_reserves_a_sample() {
        let fx = fixture(1).await;
        add_labeler(&fx, "l-1").await;

        let assignment = fx
            .dispatcher
            .fetch_next(&fx.queue.id, "l-1", "t-1")
            .await
            .unwrap();

        assert_eq!(assignment.status, AssignmentStatus::Reserved);
        assert_eq!(assignment.labeler_id.as_deref(), Some("l-1"));
        assert_eq!(
            assignment.deadline,
            Some(fx.clock.now() + Duration::seconds(600))
        );
        assert_eq!(fx.sink.events_named("assignment.created").len(), 1);

        let audit = fx.store.list_audit("t-1").await.unwrap();
        assert!(audit
            .iter()
            .any(|r| r.entity_type == "assignment" && r.action == AuditAction::Created));
    }

    #[tokio::test]
    async fn a_labeler_never_gets_the_same_sample_twice_concurrently() {
        let fx = fixture(2).await;
        add_labeler(&fx, "l-1").await;

        let first = fx
            .dispatcher
            .fetch_next(&fx.queue.id, "l-1", "t-1")
            .await
            .unwrap();
        let second = fx
            .dispatcher
            .fetch_next(&fx.queue.id, "l-1", "t-1")
            .await
            .unwrap();

        assert_ne!(first.sample_id, second.sample_id);
    }

    #[tokio::test]
    async fn saturated_queue_reports_no_samples() {
        let fx = fixture(1).await;
        add_labeler(&fx, "l-1").await;
        add_labeler(&fx, "l-2").await;
        add_labeler(&fx, "l-3").await;

        fx.dispatcher
            .fetch_next(&fx.queue.id, "l-1", "t-1")
            .await
            .unwrap();
        fx.dispatcher
            .fetch_next(&fx.queue.id, "l-2", "t-1")
            .await
            .unwrap();

        // Both samples are reserved; k = 1 leaves nothing.
        let err = fx
            .dispatcher
            .fetch_next(&fx.queue.id, "l-3", "t-1")
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::NoSamples);
    }

    #[tokio::test]
    async fn concurrency_cap_is_enforced() {
        let fx = fixture(2).await;
        let mut labeler = Labeler::new("t-1", "ext-l-1").with_max_concurrent(1);
        labeler.id = "l-1".to_string();
        fx.store.put_labeler(labeler).await.unwrap();

        fx.dispatcher
            .fetch_next(&fx.queue.id, "l-1", "t-1")
            .await
            .unwrap();
        let err = fx
            .dispatcher
            .fetch_next(&fx.queue.id, "l-1", "t-1")
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Forbidden(_)));
    }

    #[tokio::test]
    async fn blocklisted_labelers_are_rejected() {
        let fx = fixture(1).await;
        let mut labeler = Labeler::new("t-1", "ext-l-1");
        labeler.id = "l-1".to_string();
        labeler.blocked_queues.push(fx.queue.id.clone());
        fx.store.put_labeler(labeler).await.unwrap();

        let err = fx
            .dispatcher
            .fetch_next(&fx.queue.id, "l-1", "t-1")
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Forbidden(_)));
    }

    #[tokio::test]
    async fn submit_label_completes_the_assignment() {
        let fx = fixture(1).await;
        add_labeler(&fx, "l-1").await;

        let assignment = fx
            .dispatcher
            .fetch_next(&fx.queue.id, "l-1", "t-1")
            .await
            .unwrap();
        fx.clock.advance(Duration::seconds(30));

        let label = fx
            .dispatcher
            .submit_label(&assignment.id, "l-1", "t-1", sentiment_payload("positive"))
            .await
            .unwrap();

        assert_eq!(label.labeling_time_seconds, Some(30.0));
        let stored = fx
            .store
            .get_assignment(&assignment.id, "t-1")
            .await
            .unwrap();
        assert_eq!(stored.status, AssignmentStatus::Completed);

        let version = fx
            .store
            .get_schema_version(&fx.queue.schema_version_id, "t-1")
            .await
            .unwrap();
        assert!(version.frozen_at.is_some());
        assert_eq!(version.label_count, 1);
    }

    #[tokio::test]
    async fn invalid_payloads_return_the_full_error_list() {
        let fx = fixture(1).await;
        add_labeler(&fx, "l-1").await;

        let assignment = fx
            .dispatcher
            .fetch_next(&fx.queue.id, "l-1", "t-1")
            .await
            .unwrap();

        let mut payload = JsonMap::new();
        payload.insert("sentiment".to_string(), json!("ecstatic"));
        payload.insert("confidence".to_string(), json!(9));

        let err = fx
            .dispatcher
            .submit_label(&assignment.id, "l-1", "t-1", payload)
            .await
            .unwrap_err();
        match err {
            DispatchError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn expired_reservations_reject_submission() {
        let fx = fixture(1).await;
        add_labeler(&fx, "l-1").await;

        let assignment = fx
            .dispatcher
            .fetch_next(&fx.queue.id, "l-1", "t-1")
            .await
            .unwrap();
        fx.clock.advance(Duration::seconds(601));

        let err = fx
            .dispatcher
            .submit_label(&assignment.id, "l-1", "t-1", sentiment_payload("neutral"))
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::Expired);
    }

    #[tokio::test]
    async fn foreign_reservations_reject_submission() {
        let fx = fixture(2).await;
        add_labeler(&fx, "l-1").await;
        add_labeler(&fx, "l-2").await;

        let assignment = fx
            .dispatcher
            .fetch_next(&fx.queue.id, "l-1", "t-1")
            .await
            .unwrap();

        let err = fx
            .dispatcher
            .submit_label(&assignment.id, "l-2", "t-1", sentiment_payload("neutral"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Forbidden(_)));
    }

    #[tokio::test]
    async fn skip_requeues_the_sample_for_others() {
        let fx = fixture(1).await;
        add_labeler(&fx, "l-1").await;
        add_labeler(&fx, "l-2").await;

        let assignment = fx
            .dispatcher
            .fetch_next(&fx.queue.id, "l-1", "t-1")
            .await
            .unwrap();
        let skipped = fx
            .dispatcher
            .skip(&assignment.id, "l-1", "t-1", "content unreadable")
            .await
            .unwrap();

        assert_eq!(skipped.status, AssignmentStatus::Skipped);
        assert_eq!(skipped.skip_reason.as_deref(), Some("content unreadable"));

        // The sample is available again, through the fresh pending slot.
        let next = fx
            .dispatcher
            .fetch_next(&fx.queue.id, "l-2", "t-1")
            .await
            .unwrap();
        assert_eq!(next.sample_id, skipped.sample_id);
        assert_eq!(next.status, AssignmentStatus::Reserved);
    }

    #[tokio::test]
    async fn redundancy_excludes_prior_labelers_after_completion() {
        let fx = fixture(2).await;
        add_labeler(&fx, "l-1").await;

        let assignment = fx
            .dispatcher
            .fetch_next(&fx.queue.id, "l-1", "t-1")
            .await
            .unwrap();
        let first_sample = assignment.sample_id.clone();
        fx.dispatcher
            .submit_label(&assignment.id, "l-1", "t-1", sentiment_payload("positive"))
            .await
            .unwrap();

        // k = 2 leaves the sample open, but not for the same labeler.
        let second = fx
            .dispatcher
            .fetch_next(&fx.queue.id, "l-1", "t-1")
            .await
            .unwrap();
        assert_ne!(second.sample_id, first_sample);
    }
}
