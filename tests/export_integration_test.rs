//! Export pipeline: redaction modes, pseudonymization, limits, and
//! failure cleanup.

use chrono::{TimeZone, Utc};
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anvil::core::{Clock, FixedClock};
use anvil::export::{ExportError, ExportFormat, ExportOptions, Exporter};
use anvil::model::schema::{FieldDef, FieldMetadata, FieldType, PiiLevel};
use anvil::model::{Assignment, AssignmentStatus, JsonMap, Label, Labeler, Queue, SchemaVersion};
use anvil::privacy::{PseudonymGenerator, RedactionMode};
use anvil::store::{MemoryStore, Store};

struct Harness {
    store: Arc<MemoryStore>,
    clock: Arc<FixedClock>,
    queue: Queue,
}

async fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
    ));

    let version = SchemaVersion::new(
        "q-pending",
        "tenant-a",
        1,
        vec![
            FieldDef::new("verdict", FieldType::Select).with_options(["ok", "bad"]),
            FieldDef::new("reviewer_notes", FieldType::Text).with_metadata(FieldMetadata {
                pii: PiiLevel::Likely,
                ..FieldMetadata::default()
            }),
        ],
    );
    let version = store.put_schema_version(version).await.unwrap();
    let queue = Queue::new("tenant-a", "exports", &version.id, "forge.exports", clock.now())
        .with_labels_per_sample(4);
    let queue = store.put_queue(queue).await.unwrap();

    Harness {
        store,
        clock,
        queue,
    }
}

async fn add_labeler(h: &Harness, id: &str) {
    let generator = PseudonymGenerator::new(b"0123456789abcdef0123456789abcdef").unwrap();
    let mut labeler = Labeler::new("tenant-a", format!("{id}@example.com"));
    labeler.id = id.to_string();
    labeler.pseudonym = Some(generator.generate(&labeler.external_id, "tenant-a"));
    h.store.put_labeler(labeler).await.unwrap();
}

async fn label(h: &Harness, sample: &str, rater: &str, notes: &str) {
    let now = h.clock.now();
    let assignment = Assignment::reserved(&h.queue.id, sample, "tenant-a", rater, 600, now);
    let assignment = h.store.create_assignment(assignment).await.unwrap();

    let mut payload = JsonMap::new();
    payload.insert("verdict".into(), json!("ok"));
    payload.insert("reviewer_notes".into(), json!(notes));
    let label = Label {
        id: anvil::model::new_id(),
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
        labeling_time_seconds: Some(8.0),
        deleted_at: None,
    };
    let mut completing = assignment;
    completing.status = AssignmentStatus::Completed;
    h.store.submit_label(label, completing).await.unwrap();
}

fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("anvil-export-{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn jsonl_rows(path: &PathBuf) -> Vec<serde_json::Value> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn automatic_redaction_strips_likely_pii_fields() {
    let h = harness().await;
    add_labeler(&h, "L1").await;
    label(&h, "s1", "L1", "patient said hello").await;

    let dir = scratch_dir();
    let output = dir.join("out.jsonl");
    let exporter = Exporter::new(h.store.clone(), h.clock.clone());

    exporter
        .export(
            &h.queue.id,
            "tenant-a",
            &ExportOptions::new(&output, ExportFormat::Jsonl)
                .with_redaction(RedactionMode::Automatic),
        )
        .await
        .unwrap();

    let rows = jsonl_rows(&output);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["payload"]["verdict"], "ok");
    assert_eq!(rows[0]["payload"]["reviewer_notes"], serde_json::Value::Null);

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn raw_mode_keeps_everything() {
    let h = harness().await;
    add_labeler(&h, "L1").await;
    label(&h, "s1", "L1", "notes stay").await;

    let dir = scratch_dir();
    let output = dir.join("raw.jsonl");
    let exporter = Exporter::new(h.store.clone(), h.clock.clone());
    exporter
        .export(
            &h.queue.id,
            "tenant-a",
            &ExportOptions::new(&output, ExportFormat::Jsonl),
        )
        .await
        .unwrap();

    let rows = jsonl_rows(&output);
    assert_eq!(rows[0]["payload"]["reviewer_notes"], "notes stay");

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn pseudonyms_replace_labeler_ids() {
    let h = harness().await;
    add_labeler(&h, "L1").await;
    label(&h, "s1", "L1", "x").await;

    let dir = scratch_dir();
    let output = dir.join("pseudo.jsonl");
    let exporter = Exporter::new(h.store.clone(), h.clock.clone());
    exporter
        .export(
            &h.queue.id,
            "tenant-a",
            &ExportOptions::new(&output, ExportFormat::Jsonl).with_pseudonyms(),
        )
        .await
        .unwrap();

    let rows = jsonl_rows(&output);
    let rendered = rows[0]["labeler_id"].as_str().unwrap();
    assert!(rendered.starts_with("labeler_"));
    assert_ne!(rendered, "L1");

    // Deterministic across exports.
    let output2 = dir.join("pseudo2.jsonl");
    exporter
        .export(
            &h.queue.id,
            "tenant-a",
            &ExportOptions::new(&output2, ExportFormat::Jsonl).with_pseudonyms(),
        )
        .await
        .unwrap();
    assert_eq!(jsonl_rows(&output2)[0]["labeler_id"].as_str().unwrap(), rendered);

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn missing_pseudonyms_fail_the_export_cleanly() {
    let h = harness().await;
    // Labeler without a pseudonym.
    let mut labeler = Labeler::new("tenant-a", "bare@example.com");
    labeler.id = "L1".to_string();
    h.store.put_labeler(labeler).await.unwrap();
    label(&h, "s1", "L1", "x").await;

    let dir = scratch_dir();
    let output = dir.join("fail.jsonl");
    let exporter = Exporter::new(h.store.clone(), h.clock.clone());

    let err = exporter
        .export(
            &h.queue.id,
            "tenant-a",
            &ExportOptions::new(&output, ExportFormat::Jsonl).with_pseudonyms(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::MissingPseudonym(_)));

    // No artifact, no leftover temp file.
    assert!(!output.exists());
    assert!(fs::read_dir(&dir).unwrap().next().is_none());

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn limit_and_offset_page_the_export() {
    let h = harness().await;
    for rater in ["L1", "L2", "L3"] {
        add_labeler(&h, rater).await;
        label(&h, "s1", rater, "x").await;
    }

    let dir = scratch_dir();
    let exporter = Exporter::new(h.store.clone(), h.clock.clone());

    let output = dir.join("limited.jsonl");
    let manifest = exporter
        .export(
            &h.queue.id,
            "tenant-a",
            &ExportOptions::new(&output, ExportFormat::Jsonl).with_limit(2),
        )
        .await
        .unwrap();
    assert_eq!(manifest.row_count, 2);

    let mut offset_options = ExportOptions::new(dir.join("offset.jsonl"), ExportFormat::Jsonl);
    offset_options.offset = 2;
    let manifest = exporter
        .export(&h.queue.id, "tenant-a", &offset_options)
        .await
        .unwrap();
    assert_eq!(manifest.row_count, 1);

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn csv_includes_metadata_columns_when_asked() {
    let h = harness().await;
    add_labeler(&h, "L1").await;
    label(&h, "s1", "L1", "x").await;

    let dir = scratch_dir();
    let output = dir.join("meta.csv");
    let mut options = ExportOptions::new(&output, ExportFormat::Csv);
    options.include_metadata = true;

    let exporter = Exporter::new(h.store.clone(), h.clock.clone());
    exporter.export(&h.queue.id, "tenant-a", &options).await.unwrap();

    let csv = fs::read_to_string(&output).unwrap();
    let header = csv.lines().next().unwrap();
    assert_eq!(
        header,
        "sample_id,labeler_id,reviewer_notes,verdict,labeling_time_seconds,created_at,valid"
    );
    let row = csv.lines().nth(1).unwrap();
    assert!(row.ends_with(",true"));
    assert!(row.contains(",8,"));

    fs::remove_dir_all(&dir).unwrap();
}
