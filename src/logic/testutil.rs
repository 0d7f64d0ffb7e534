//! Shared fixtures for unit tests

use std::fs;
use std::path::{Path, PathBuf};

use crate::logic::config::PipelineConfig;
use crate::logic::features::{FeatureSet, FeatureStore, TransformSpec};
use crate::logic::dataset::{DatasetStore, DatasetVersion, IngestSource, Label, Payload, RawRecord};

pub fn config(root: &Path) -> PipelineConfig {
    PipelineConfig::new(root).with_seed(7).with_workers(2)
}

/// Deterministic synthetic signal; watermarked samples carry a fixed
/// high-frequency component on top of the carrier.
pub fn signal(index: usize, len: usize, watermarked: bool) -> Vec<f32> {
    let phase = index as f32 * 0.37;
    (0..len)
        .map(|i| {
            let t = i as f32;
            let carrier = (t * 0.05 + phase).sin();
            let mark = if watermarked { 0.6 * (t * 0.9).sin() } else { 0.0 };
            carrier + mark
        })
        .collect()
}

pub fn signal_record(index: usize, len: usize, watermarked: bool) -> RawRecord {
    RawRecord::new(
        format!("sig-{:03}", index),
        Payload::Signal {
            samples: signal(index, len, watermarked),
        },
        Some(Label::watermarked(watermarked).with_timestamp(1_700_000_000 + index as i64 * 60)),
    )
}

/// `marked` watermarked records followed by `unmarked` clean ones
pub fn labeled_records(marked: usize, unmarked: usize, len: usize) -> Vec<RawRecord> {
    (0..marked + unmarked)
        .map(|i| signal_record(i, len, i < marked))
        .collect()
}

pub fn write_source(dir: &Path, name: &str, records: &[RawRecord]) -> PathBuf {
    let path = dir.join(name);
    let lines: Vec<String> = records
        .iter()
        .map(|r| serde_json::to_string(r).unwrap())
        .collect();
    fs::write(&path, lines.join("\n") + "\n").unwrap();
    path
}

/// Write `records` to a source file and ingest it
pub fn ingest(cfg: &PipelineConfig, name: &str, records: &[RawRecord]) -> DatasetVersion {
    let source = write_source(cfg.root(), &format!("{}.jsonl", name), records);
    DatasetStore::new(cfg)
        .ingest(&IngestSource::new(source))
        .unwrap()
}

/// Ingest `records` and extract them with `spec`
pub fn extract(
    cfg: &PipelineConfig,
    name: &str,
    records: &[RawRecord],
    spec: &TransformSpec,
) -> FeatureSet {
    let dataset = ingest(cfg, name, records);
    FeatureStore::new(cfg).extract(&dataset.id, spec).unwrap()
}
