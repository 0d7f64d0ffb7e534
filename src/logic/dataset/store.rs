//! Dataset Store - immutable, content-addressed dataset versions
//!
//! Layout: `{root}/datasets/{ds-id}/{manifest.json, records.jsonl}`

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::constants::{MANIFEST_FILE, RECORDS_FILE};
use crate::logic::config::PipelineConfig;
use crate::logic::error::{PipelineError, PipelineResult};
use crate::logic::storage::{self, StagedDir};

use super::manifest::{
    DatasetSource, DatasetSummary, DatasetVersion, Partition, DATASET_FORMAT_VERSION,
};
use super::record::RawRecord;

/// JSONL source to ingest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSource {
    pub path: PathBuf,

    /// Human readable name; defaults to the file stem
    #[serde(default)]
    pub name: Option<String>,
}

impl IngestSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            name: None,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "dataset".to_string())
        })
    }
}

pub struct DatasetStore {
    root: PathBuf,
}

impl DatasetStore {
    pub fn new(cfg: &PipelineConfig) -> Self {
        Self {
            root: cfg.datasets_dir(),
        }
    }

    fn version_dir(&self, id: &str) -> PipelineResult<PathBuf> {
        storage::artifact_path(&self.root, "ds", "dataset", id)
    }

    // ========================================================================
    // INGEST
    // ========================================================================

    /// Ingest a JSONL source as a new immutable dataset version
    pub fn ingest(&self, source: &IngestSource) -> PipelineResult<DatasetVersion> {
        log::info!("Ingesting dataset from {}", source.path.display());

        let records = parse_source(&source.path)?;
        let version = self.commit(
            &source.display_name(),
            DatasetSource::File {
                path: source.path.display().to_string(),
            },
            &records,
        )?;

        log::info!(
            "Ingested {} records as {} ({} watermarked, {} unmarked, {} unlabeled)",
            version.record_count,
            version.id,
            version.summary.watermarked,
            version.summary.unmarked,
            version.summary.unlabeled
        );
        Ok(version)
    }

    /// Write records + manifest under their content id. Never overwrites.
    fn commit(
        &self,
        name: &str,
        source: DatasetSource,
        records: &[RawRecord],
    ) -> PipelineResult<DatasetVersion> {
        let mut bytes = Vec::new();
        for record in records {
            serde_json::to_writer(&mut bytes, record)?;
            bytes.push(b'\n');
        }

        let id = storage::content_id("ds", &bytes);
        let target = self.version_dir(&id)?;
        if target.exists() {
            return Err(PipelineError::VersionConflict { kind: "dataset", id });
        }

        let version = DatasetVersion {
            format_version: DATASET_FORMAT_VERSION,
            id: id.clone(),
            name: name.to_string(),
            source,
            record_count: records.len() as u64,
            checksum: storage::sha256_hex(&bytes),
            summary: DatasetSummary::from_records(records),
            created_at: Utc::now(),
        };

        let staged = StagedDir::new(&self.root)?;
        fs::write(staged.file(RECORDS_FILE), &bytes)?;
        storage::write_json(&staged.file(MANIFEST_FILE), &version)?;

        staged.commit(&target).map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                PipelineError::VersionConflict {
                    kind: "dataset",
                    id: id.clone(),
                }
            } else {
                PipelineError::Io(e)
            }
        })?;

        Ok(version)
    }

    // ========================================================================
    // READ
    // ========================================================================

    pub fn exists(&self, id: &str) -> bool {
        self.version_dir(id)
            .map(|dir| dir.join(MANIFEST_FILE).is_file())
            .unwrap_or(false)
    }

    pub fn manifest(&self, id: &str) -> PipelineResult<DatasetVersion> {
        let path = self.version_dir(id)?.join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(PipelineError::not_found("dataset", id));
        }
        storage::read_json(&path)
    }

    /// Lazy, restartable view over the stored records
    pub fn load(&self, id: &str) -> PipelineResult<RecordStream> {
        let version = self.manifest(id)?;
        let path = self.version_dir(id)?.join(RECORDS_FILE);
        if !path.is_file() {
            return Err(PipelineError::not_found("dataset records", id));
        }
        Ok(RecordStream {
            path,
            record_count: version.record_count,
        })
    }

    /// Check the stored records still match the manifest checksum
    pub fn verify(&self, id: &str) -> PipelineResult<bool> {
        let version = self.manifest(id)?;
        let checksum = storage::file_checksum(&self.version_dir(id)?.join(RECORDS_FILE))?;
        Ok(checksum == version.checksum)
    }

    pub fn list(&self) -> PipelineResult<Vec<DatasetVersion>> {
        storage::list_ids(&self.root)?
            .iter()
            .filter(|id| self.exists(id))
            .map(|id| self.manifest(id))
            .collect()
    }

    // ========================================================================
    // DERIVED VERSIONS
    // ========================================================================

    /// Deterministically partition a version into train/holdout versions
    pub fn split(
        &self,
        id: &str,
        holdout_ratio: f64,
        seed: u64,
    ) -> PipelineResult<(DatasetVersion, DatasetVersion)> {
        if !(holdout_ratio > 0.0 && holdout_ratio < 1.0) {
            return Err(PipelineError::Ingest(format!(
                "holdout ratio must be in (0, 1), got {}",
                holdout_ratio
            )));
        }

        let parent = self.manifest(id)?;
        let records = self.load(id)?.collect_all()?;
        if records.len() < 2 {
            return Err(PipelineError::Ingest(format!(
                "dataset {} has {} records, cannot split",
                id,
                records.len()
            )));
        }

        let n = records.len();
        let holdout_n = ((n as f64 * holdout_ratio).round() as usize).clamp(1, n - 1);

        let mut order: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        order.shuffle(&mut rng);

        let mut holdout_idx = order[..holdout_n].to_vec();
        let mut train_idx = order[holdout_n..].to_vec();
        holdout_idx.sort_unstable();
        train_idx.sort_unstable();

        let pick = |idx: &[usize]| -> Vec<RawRecord> {
            idx.iter().map(|&i| records[i].clone()).collect()
        };

        let train = self.commit(
            &format!("{}/train", parent.name),
            DatasetSource::Derived {
                parent: parent.id.clone(),
                partition: Partition::Train,
            },
            &pick(&train_idx),
        )?;
        let holdout = self.commit(
            &format!("{}/holdout", parent.name),
            DatasetSource::Derived {
                parent: parent.id.clone(),
                partition: Partition::Holdout,
            },
            &pick(&holdout_idx),
        )?;

        log::info!(
            "Split {} into {} ({} records) and {} ({} records)",
            parent.id,
            train.id,
            train.record_count,
            holdout.id,
            holdout.record_count
        );
        Ok((train, holdout))
    }
}

// ============================================================================
// SOURCE PARSING
// ============================================================================

/// Parse and validate a JSONL source. Any malformed line fails the ingest.
fn parse_source(path: &Path) -> PipelineResult<Vec<RawRecord>> {
    let file = File::open(path).map_err(|e| {
        PipelineError::Ingest(format!("cannot open {}: {}", path.display(), e))
    })?;

    let mut records = Vec::new();
    let mut seen = HashSet::new();

    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|e| PipelineError::Ingest(format!("line {}: {}", line_no, e)))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record: RawRecord = serde_json::from_str(trimmed)
            .map_err(|e| PipelineError::Ingest(format!("line {}: {}", line_no, e)))?;
        record
            .validate()
            .map_err(|e| PipelineError::Ingest(format!("line {}: {}", line_no, e)))?;

        if !seen.insert(record.id.clone()) {
            return Err(PipelineError::Ingest(format!(
                "line {}: duplicate record id {}",
                line_no, record.id
            )));
        }
        records.push(record);
    }

    if records.is_empty() {
        return Err(PipelineError::Ingest(format!(
            "{} contains no records",
            path.display()
        )));
    }

    Ok(records)
}

// ============================================================================
// RECORD STREAM
// ============================================================================

/// Handle over a stored version; every `iter()` starts from the first record
#[derive(Debug, Clone)]
pub struct RecordStream {
    path: PathBuf,
    record_count: u64,
}

impl RecordStream {
    pub fn len(&self) -> u64 {
        self.record_count
    }

    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    pub fn iter(&self) -> PipelineResult<RecordIter> {
        let file = File::open(&self.path)?;
        Ok(RecordIter {
            lines: BufReader::new(file).lines(),
        })
    }

    pub fn collect_all(&self) -> PipelineResult<Vec<RawRecord>> {
        self.iter()?.collect()
    }
}

pub struct RecordIter {
    lines: Lines<BufReader<File>>,
}

impl Iterator for RecordIter {
    type Item = PipelineResult<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(serde_json::from_str(&line).map_err(PipelineError::from));
        }
    }
}
