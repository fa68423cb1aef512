//! Agreement fixtures computed over labels as they come out of the store.

use chrono::{TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;

use anvil::agreement::{self, AgreementMetric};
use anvil::model::{
    Assignment, AssignmentStatus, FieldDef, FieldType, JsonMap, Label, Queue, SchemaVersion,
};
use anvil::store::{MemoryStore, Store};

struct Harness {
    store: Arc<MemoryStore>,
    queue: Queue,
}

async fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();

    let version = SchemaVersion::new(
        "q-pending",
        "tenant-a",
        1,
        vec![FieldDef::new("category", FieldType::Select).with_options(["a", "b"])],
    );
    let version = store.put_schema_version(version).await.unwrap();
    let queue = Queue::new("tenant-a", "agreement", &version.id, "forge.agreement", now)
        .with_labels_per_sample(4);
    let queue = store.put_queue(queue).await.unwrap();

    Harness { store, queue }
}

async fn label(h: &Harness, sample: &str, rater: &str, value: &str) {
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
    let assignment = Assignment::reserved(&h.queue.id, sample, "tenant-a", rater, 600, now);
    let assignment = h.store.create_assignment(assignment).await.unwrap();

    let mut payload = JsonMap::new();
    payload.insert("category".into(), json!(value));
    let label = Label {
        id: format!("lb-{sample}-{rater}"),
        assignment_id: assignment.id.clone(),
        queue_id: h.queue.id.clone(),
        sample_id: sample.to_string(),
        labeler_id: rater.to_string(),
        tenant_id: "tenant-a".to_string(),
        schema_version_id: h.queue.schema_version_id.clone(),
        payload,
        blob_ref: None,
        submitted_at: now,
        created_at: now,
        labeling_time_seconds: None,
        deleted_at: None,
    };
    let mut completing = assignment;
    completing.status = AssignmentStatus::Completed;
    h.store.submit_label(label, completing).await.unwrap();
}

async fn queue_labels(h: &Harness) -> Vec<Label> {
    h.store
        .list_queue_labels(&h.queue.id, "tenant-a", 0, usize::MAX)
        .await
        .unwrap()
}

#[tokio::test]
async fn cohen_perfect_agreement_is_one() {
    let h = harness().await;
    label(&h, "s1", "L1", "a").await;
    label(&h, "s1", "L2", "a").await;
    label(&h, "s2", "L1", "b").await;
    label(&h, "s2", "L2", "b").await;

    let score = agreement::compute(&queue_labels(&h).await, None, None).unwrap();
    assert_eq!(score.metric, AgreementMetric::Cohen);
    assert!((score.score - 1.0).abs() < 1e-9);
    assert_eq!(score.raters, 2);
    assert_eq!(score.samples, 2);
}

#[tokio::test]
async fn cohen_anti_correlated_raters_score_low() {
    let h = harness().await;
    label(&h, "s1", "L1", "a").await;
    label(&h, "s1", "L2", "b").await;
    label(&h, "s2", "L1", "b").await;
    label(&h, "s2", "L2", "a").await;

    let score = agreement::compute(&queue_labels(&h).await, None, None).unwrap();
    assert!(score.score < 0.3);
    // Anti-correlation is negative and must not be clamped to zero.
    assert!(score.score < 0.0);
}

#[tokio::test]
async fn krippendorff_handles_a_missing_rater() {
    let h = harness().await;
    // Five labels over three samples; L2 never saw s2.
    label(&h, "s1", "L1", "a").await;
    label(&h, "s1", "L2", "a").await;
    label(&h, "s2", "L1", "b").await;
    label(&h, "s3", "L1", "b").await;
    label(&h, "s3", "L2", "b").await;

    let score = agreement::compute(
        &queue_labels(&h).await,
        None,
        Some(AgreementMetric::Krippendorff),
    )
    .unwrap();
    assert!(score.score.is_finite());
    assert!((-1.0..=1.0).contains(&score.score));
}

#[tokio::test]
async fn three_raters_select_fleiss() {
    let h = harness().await;
    for sample in ["s1", "s2"] {
        for rater in ["L1", "L2", "L3"] {
            label(&h, sample, rater, "a").await;
        }
    }

    let score = agreement::compute(&queue_labels(&h).await, None, None).unwrap();
    assert_eq!(score.metric, AgreementMetric::Fleiss);
    assert!((score.score - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn tombstoned_labels_do_not_count() {
    let h = harness().await;
    label(&h, "s1", "L1", "a").await;
    label(&h, "s1", "L2", "b").await;

    h.store
        .tombstone_label("lb-s1-L2", "tenant-a", Utc::now())
        .await
        .unwrap();

    let labels = queue_labels(&h).await;
    assert_eq!(labels.len(), 1);
    assert!(agreement::compute(&labels, None, None).is_err());
}
