//! End-to-end labeling flow: queue setup, leasing, submission, agreement,
//! and export.

use chrono::{TimeZone, Utc};
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anvil::agreement::{self, AgreementMetric};
use anvil::core::{Clock, FixedClock, MemorySink};
use anvil::dispatch::{DispatchError, Dispatcher, DispatcherConfig};
use anvil::export::{ExportFormat, ExportOptions, Exporter, Manifest};
use anvil::model::{FieldDef, FieldType, JsonMap, Labeler, PolicyConfig, Queue, SampleRef, SchemaVersion};
use anvil::store::{MemoryStore, Store};

struct Harness {
    store: Arc<MemoryStore>,
    clock: Arc<FixedClock>,
    dispatcher: Dispatcher,
    queue: Queue,
}

async fn harness(labels_per_sample: u32) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
    ));

    let version = SchemaVersion::new(
        "q-pending",
        "tenant-a",
        1,
        vec![
            FieldDef::new("sentiment", FieldType::Select)
                .required()
                .with_options(["positive", "negative", "neutral"]),
            FieldDef::new("confidence", FieldType::Range).with_bounds(1.0, 5.0),
        ],
    );
    let version = store.put_schema_version(version).await.unwrap();

    let queue = Queue::new(
        "tenant-a",
        "sentiment-reviews",
        &version.id,
        "forge.reviews",
        clock.now(),
    )
    .with_labels_per_sample(labels_per_sample)
    .with_policy(PolicyConfig::Redundancy {
        labels_per_sample,
        allow_same_labeler: false,
    })
    .with_timeout_seconds(600);
    let queue = store.put_queue(queue).await.unwrap();

    for id in ["s1", "s2"] {
        let mut sample = SampleRef::new(&queue.id, "tenant-a", format!("forge-{id}"));
        sample.id = id.to_string();
        store.put_sample(sample).await.unwrap();
    }

    for id in ["L1", "L2"] {
        let mut labeler = Labeler::new("tenant-a", format!("{id}@example.com"));
        labeler.id = id.to_string();
        labeler.pseudonym = Some(format!("labeler_{:016x}", id.len() as u64));
        store.put_labeler(labeler).await.unwrap();
    }

    let dispatcher = Dispatcher::new(
        store.clone(),
        clock.clone(),
        Arc::new(MemorySink::new()),
        DispatcherConfig::default(),
    );

    Harness {
        store,
        clock,
        dispatcher,
        queue,
    }
}

fn sentiment(value: &str, confidence: i64) -> JsonMap {
    let mut payload = JsonMap::new();
    payload.insert("sentiment".into(), json!(value));
    payload.insert("confidence".into(), json!(confidence));
    payload
}

fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("anvil-e2e-{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[tokio::test]
async fn sentiment_queue_end_to_end() {
    let h = harness(2).await;

    // Both labelers label both samples.
    for labeler in ["L1", "L2"] {
        for _ in 0..2 {
            let assignment = h
                .dispatcher
                .fetch_next(&h.queue.id, labeler, "tenant-a")
                .await
                .unwrap();
            h.clock.advance(chrono::Duration::seconds(5));
            h.dispatcher
                .submit_label(
                    &assignment.id,
                    labeler,
                    "tenant-a",
                    sentiment("positive", 4),
                )
                .await
                .unwrap();
        }
    }

    // Queue is exhausted at k = 2.
    let err = h
        .dispatcher
        .fetch_next(&h.queue.id, "L1", "tenant-a")
        .await
        .unwrap_err();
    assert_eq!(err, DispatchError::NoSamples);

    // Two raters -> Cohen, and the score is a sane agreement value.
    let labels = h
        .store
        .list_queue_labels(&h.queue.id, "tenant-a", 0, usize::MAX)
        .await
        .unwrap();
    assert_eq!(labels.len(), 4);
    let score = agreement::compute(&labels, Some("sentiment"), None).unwrap();
    assert_eq!(score.metric, AgreementMetric::Cohen);
    assert!((-1.0..=1.0).contains(&score.score));

    // Both export formats succeed and order rows deterministically.
    let dir = scratch_dir();
    let exporter = Exporter::new(h.store.clone(), h.clock.clone());

    let jsonl_path = dir.join("labels.jsonl");
    let manifest = exporter
        .export(
            &h.queue.id,
            "tenant-a",
            &ExportOptions::new(&jsonl_path, ExportFormat::Jsonl),
        )
        .await
        .unwrap();
    assert_eq!(manifest.row_count, 4);

    let content = fs::read_to_string(&jsonl_path).unwrap();
    assert!(!content.ends_with("\n\n"));
    let keys: Vec<(String, String, String)> = content
        .lines()
        .map(|line| {
            let row: serde_json::Value = serde_json::from_str(line).unwrap();
            (
                row["sample_id"].as_str().unwrap().to_string(),
                row["labeler_id"].as_str().unwrap().to_string(),
                row["submitted_at"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);

    let csv_path = dir.join("labels.csv");
    exporter
        .export(
            &h.queue.id,
            "tenant-a",
            &ExportOptions::new(&csv_path, ExportFormat::Csv),
        )
        .await
        .unwrap();
    let csv = fs::read_to_string(&csv_path).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("sample_id,labeler_id,confidence,sentiment"));
    let data_keys: Vec<(String, String)> = lines
        .map(|line| {
            let mut cells = line.split(',');
            (
                cells.next().unwrap().to_string(),
                cells.next().unwrap().to_string(),
            )
        })
        .collect();
    assert_eq!(data_keys.len(), 4);
    let mut sorted = data_keys.clone();
    sorted.sort();
    assert_eq!(data_keys, sorted);

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn invalid_select_value_is_rejected_with_field_errors() {
    let h = harness(1).await;

    let assignment = h
        .dispatcher
        .fetch_next(&h.queue.id, "L1", "tenant-a")
        .await
        .unwrap();

    let mut payload = JsonMap::new();
    payload.insert("sentiment".into(), json!("invalid"));

    let err = h
        .dispatcher
        .submit_label(&assignment.id, "L1", "tenant-a", payload)
        .await
        .unwrap_err();
    match err {
        DispatchError::Validation(errors) => {
            assert!(errors.iter().any(|e| e.field == "sentiment"));
        }
        other => panic!("expected a validation failure, got {other:?}"),
    }

    // Nothing was written.
    let labels = h
        .store
        .list_queue_labels(&h.queue.id, "tenant-a", 0, usize::MAX)
        .await
        .unwrap();
    assert!(labels.is_empty());

    // A valid retry on the same reservation succeeds.
    h.dispatcher
        .submit_label(&assignment.id, "L1", "tenant-a", sentiment("negative", 2))
        .await
        .unwrap();
}

#[tokio::test]
async fn manifest_round_trips_and_hash_matches_the_file() {
    let h = harness(1).await;

    let assignment = h
        .dispatcher
        .fetch_next(&h.queue.id, "L1", "tenant-a")
        .await
        .unwrap();
    h.dispatcher
        .submit_label(&assignment.id, "L1", "tenant-a", sentiment("neutral", 3))
        .await
        .unwrap();

    let dir = scratch_dir();
    let output = dir.join("out.jsonl");
    let exporter = Exporter::new(h.store.clone(), h.clock.clone());
    let manifest = exporter
        .export(
            &h.queue.id,
            "tenant-a",
            &ExportOptions::new(&output, ExportFormat::Jsonl),
        )
        .await
        .unwrap();

    // The manifest next to the artifact round-trips to the same value.
    let manifest_path = Manifest::manifest_path(&manifest.output_path);
    let saved = Manifest::from_json(&fs::read_to_string(manifest_path).unwrap()).unwrap();
    assert_eq!(saved, manifest);

    // And its hash is the hash of the artifact's bytes.
    use sha2::{Digest, Sha256};
    let bytes = fs::read(&output).unwrap();
    let expected = hex::encode(Sha256::digest(&bytes));
    assert_eq!(saved.sha256_hash, expected);

    fs::remove_dir_all(&dir).unwrap();
}
