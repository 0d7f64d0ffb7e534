use super::manifest::{DatasetSource, Partition};
use super::record::{Label, Payload, RawRecord};
use super::store::{DatasetStore, IngestSource};
use crate::logic::error::{ErrorKind, PipelineError};
use crate::logic::testutil::{config, labeled_records, write_source};
use tempfile::tempdir;
use std::fs;

#[test]
fn test_ingest_then_load_matches_manifest_count() {
    let dir = tempdir().unwrap();
    let store = DatasetStore::new(&config(dir.path()));
    let source = write_source(dir.path(), "sigs.jsonl", &labeled_records(6, 4, 64));

    let version = store.ingest(&IngestSource::new(&source)).unwrap();
    assert_eq!(version.record_count, 10);
    assert_eq!(version.name, "sigs");
    assert!(version.id.starts_with("ds-"));
    assert_eq!(version.summary.watermarked, 6);
    assert_eq!(version.summary.unmarked, 4);
    assert_eq!(version.summary.signals, 10);

    let stream = store.load(&version.id).unwrap();
    let records = stream.collect_all().unwrap();
    assert_eq!(records.len() as u64, version.record_count);
    assert_eq!(records[0].id, "sig-000");

    // restartable: a second pass yields the same sequence
    let again: Vec<_> = stream.iter().unwrap().map(|r| r.unwrap().id).collect();
    assert_eq!(again.len(), 10);
    assert_eq!(again[9], "sig-009");

    assert!(store.verify(&version.id).unwrap());
}

#[test]
fn test_reingest_identical_content_conflicts() {
    let dir = tempdir().unwrap();
    let store = DatasetStore::new(&config(dir.path()));
    let records = labeled_records(2, 2, 16);
    let first = write_source(dir.path(), "a.jsonl", &records);
    let second = write_source(dir.path(), "b.jsonl", &records);

    let version = store.ingest(&IngestSource::new(&first)).unwrap();
    let result = store.ingest(&IngestSource::new(&second).named("other-name"));

    match result {
        Err(PipelineError::VersionConflict { kind, id }) => {
            assert_eq!(kind, "dataset");
            assert_eq!(id, version.id);
        }
        other => panic!("Expected VersionConflict, got {:?}", other),
    }

    // original manifest untouched
    assert_eq!(store.manifest(&version.id).unwrap().name, "a");
    assert_eq!(store.list().unwrap().len(), 1);
}

#[test]
fn test_reject_empty_source() {
    let dir = tempdir().unwrap();
    let store = DatasetStore::new(&config(dir.path()));
    let path = dir.path().join("empty.jsonl");
    fs::write(&path, "\n\n").unwrap();

    let result = store.ingest(&IngestSource::new(&path));
    assert!(matches!(result, Err(PipelineError::Ingest(_))));
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn test_reject_malformed_line() {
    let dir = tempdir().unwrap();
    let store = DatasetStore::new(&config(dir.path()));
    let good = serde_json::to_string(&labeled_records(1, 0, 8)[0]).unwrap();
    let path = dir.path().join("bad.jsonl");
    fs::write(&path, format!("{}\n{{\"id\":\"x\",\"payload\":{{\"kind\":\"audio\"}}}}\n", good)).unwrap();

    match store.ingest(&IngestSource::new(&path)) {
        Err(PipelineError::Ingest(msg)) => assert!(msg.starts_with("line 2"), "{}", msg),
        other => panic!("Expected Ingest error, got {:?}", other),
    }
}

#[test]
fn test_reject_duplicate_ids_and_empty_ids() {
    let dir = tempdir().unwrap();
    let store = DatasetStore::new(&config(dir.path()));

    let mut records = labeled_records(2, 0, 8);
    records[1].id = records[0].id.clone();
    let dup = write_source(dir.path(), "dup.jsonl", &records);
    assert!(matches!(
        store.ingest(&IngestSource::new(&dup)),
        Err(PipelineError::Ingest(_))
    ));

    let blank = RawRecord::new("  ", Payload::Signal { samples: vec![1.0] }, None);
    let blank_path = write_source(dir.path(), "blank.jsonl", &[blank]);
    assert!(matches!(
        store.ingest(&IngestSource::new(&blank_path)),
        Err(PipelineError::Ingest(_))
    ));
}

#[test]
fn test_missing_source_file_is_ingest_error() {
    let dir = tempdir().unwrap();
    let store = DatasetStore::new(&config(dir.path()));
    let result = store.ingest(&IngestSource::new(dir.path().join("nope.jsonl")));
    assert!(matches!(result, Err(PipelineError::Ingest(_))));
}

#[test]
fn test_tagged_payload_schema() {
    let json = r#"{"id":"img-1","payload":{"kind":"image","width":2,"height":1,"pixels":[0,255]},"label":{"watermarked":true}}"#;
    let record: RawRecord = serde_json::from_str(json).unwrap();
    assert_eq!(
        record.payload,
        Payload::Image {
            width: 2,
            height: 1,
            pixels: vec![0, 255]
        }
    );
    assert_eq!(record.label, Some(Label::watermarked(true)));

    let unlabeled = r#"{"id":"s","payload":{"kind":"stroke","x":[0,1],"y":[1,0]}}"#;
    let record: RawRecord = serde_json::from_str(unlabeled).unwrap();
    assert!(record.label.is_none());
}

#[test]
fn test_split_is_deterministic_and_records_parent() {
    let dir = tempdir().unwrap();
    let store = DatasetStore::new(&config(dir.path()));
    let source = write_source(dir.path(), "sigs.jsonl", &labeled_records(6, 4, 16));
    let parent = store.ingest(&IngestSource::new(&source)).unwrap();

    let (train, holdout) = store.split(&parent.id, 0.3, 11).unwrap();
    assert_eq!(train.record_count, 7);
    assert_eq!(holdout.record_count, 3);
    assert_eq!(
        holdout.source,
        DatasetSource::Derived {
            parent: parent.id.clone(),
            partition: Partition::Holdout
        }
    );

    // Same seed, same partition: content ids collide with the stored ones
    let other_root = tempdir().unwrap();
    let other = DatasetStore::new(&config(other_root.path()));
    let parent2 = other.ingest(&IngestSource::new(&source)).unwrap();
    let (train2, holdout2) = other.split(&parent2.id, 0.3, 11).unwrap();
    assert_eq!(train.id, train2.id);
    assert_eq!(holdout.id, holdout2.id);

    // Re-splitting into the same store never overwrites
    assert!(matches!(
        store.split(&parent.id, 0.3, 11),
        Err(PipelineError::VersionConflict { .. })
    ));
}

#[test]
fn test_split_rejects_bad_ratio() {
    let dir = tempdir().unwrap();
    let store = DatasetStore::new(&config(dir.path()));
    let source = write_source(dir.path(), "s.jsonl", &labeled_records(2, 2, 8));
    let parent = store.ingest(&IngestSource::new(&source)).unwrap();

    assert!(matches!(store.split(&parent.id, 0.0, 1), Err(PipelineError::Ingest(_))));
    assert!(matches!(store.split(&parent.id, 1.0, 1), Err(PipelineError::Ingest(_))));
}

#[test]
fn test_unknown_version_not_found() {
    let dir = tempdir().unwrap();
    let store = DatasetStore::new(&config(dir.path()));
    assert!(matches!(
        store.load("ds-0000000000000000"),
        Err(PipelineError::NotFound { .. })
    ));
    assert!(!store.exists("ds-0000000000000000"));
}

#[test]
fn test_reject_out_of_range_samples() {
    let dir = tempdir().unwrap();
    let store = DatasetStore::new(&config(dir.path()));
    let mut lines: Vec<String> = labeled_records(2, 2, 8)
        .iter()
        .map(|r| serde_json::to_string(r).unwrap())
        .collect();
    // 1e39 overflows f32 to inf on parse
    lines.push(r#"{"id":"huge","payload":{"kind":"signal","samples":[1.0,1e39,2.0]}}"#.to_string());
    lines.push(r#"{"id":"pen","payload":{"kind":"stroke","x":[0.0,1.0],"y":[0.0,-1e40]}}"#.to_string());
    let path = dir.path().join("overflow.jsonl");
    fs::write(&path, lines.join("\n")).unwrap();

    match store.ingest(&IngestSource::new(&path)) {
        Err(PipelineError::Ingest(msg)) => {
            assert!(msg.starts_with("line 5"), "{}", msg);
            assert!(msg.contains("samples[1]"), "{}", msg);
        }
        other => panic!("Expected Ingest error, got {:?}", other),
    }
    assert!(store.list().unwrap().is_empty());

    let stroke = RawRecord::new(
        "pen",
        Payload::Stroke {
            x: vec![0.0, 1.0],
            y: vec![0.0, f32::NEG_INFINITY],
        },
        None,
    );
    assert!(stroke.validate().unwrap_err().contains("y[1]"));
}

#[test]
fn test_ingested_values_round_trip() {
    let dir = tempdir().unwrap();
    let store = DatasetStore::new(&config(dir.path()));
    let mut records = labeled_records(1, 1, 8);
    records.push(RawRecord::new(
        "extremes",
        Payload::Signal {
            samples: vec![3.0e38, -3.0e38, 1.0e-30, 0.0],
        },
        None,
    ));
    let source = write_source(dir.path(), "extremes.jsonl", &records);

    let version = store.ingest(&IngestSource::new(&source)).unwrap();
    assert_eq!(store.load(&version.id).unwrap().collect_all().unwrap(), records);
}

#[test]
fn test_corrupt_manifest_is_serialization_error() {
    let dir = tempdir().unwrap();
    let cfg = config(dir.path());
    let store = DatasetStore::new(&cfg);
    let source = write_source(dir.path(), "s.jsonl", &labeled_records(1, 1, 8));
    let version = store.ingest(&IngestSource::new(&source)).unwrap();

    fs::write(
        cfg.datasets_dir().join(&version.id).join("manifest.json"),
        b"{\"id\": 3",
    )
    .unwrap();

    let err = store.manifest(&version.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Serialization);
    assert_eq!(err.kind().exit_code(), 61);
}

#[test]
fn test_malformed_ids_never_leave_the_store() {
    let dir = tempdir().unwrap();
    let cfg = config(dir.path());
    let store = DatasetStore::new(&cfg);

    // a manifest outside the datasets dir must not be reachable
    fs::create_dir_all(cfg.root().join("escape")).unwrap();
    fs::write(cfg.root().join("escape").join("manifest.json"), b"{}").unwrap();

    for id in ["../escape", "ds-../../escape", "fs-0123456789abcdef", ""] {
        assert!(!store.exists(id));
        assert!(matches!(
            store.manifest(id),
            Err(PipelineError::NotFound { .. })
        ));
    }
}
