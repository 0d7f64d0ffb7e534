//! Feature Store - extraction and storage of versioned feature sets
//!
//! Layout: `{root}/features/{fs-id}/{manifest.json, features.jsonl}`

use std::fs;
use std::path::PathBuf;
use std::thread;

use chrono::Utc;

use crate::constants::{FEATURES_FILE, MANIFEST_FILE};
use crate::logic::config::PipelineConfig;
use crate::logic::dataset::{DatasetStore, RawRecord};
use crate::logic::error::{PipelineError, PipelineResult};
use crate::logic::storage::{self, StagedDir};

use super::series;
use super::transform::TransformSpec;
use super::vector::{
    Exclusion, FeatureEntry, FeatureSet, FeatureSetManifest, FEATURE_SET_FORMAT_VERSION,
};

pub struct FeatureStore {
    root: PathBuf,
    datasets: DatasetStore,
    seed: u64,
    workers: usize,
}

impl FeatureStore {
    pub fn new(cfg: &PipelineConfig) -> Self {
        Self {
            root: cfg.features_dir(),
            datasets: DatasetStore::new(cfg),
            seed: cfg.seed,
            workers: cfg.workers.max(1),
        }
    }

    fn set_dir(&self, id: &str) -> PipelineResult<PathBuf> {
        storage::artifact_path(&self.root, "fs", "feature set", id)
    }

    /// Content id over (dataset, full transform, augmentation seed)
    fn feature_set_id(&self, dataset_id: &str, spec: &TransformSpec) -> PipelineResult<String> {
        let mut key = Vec::new();
        key.extend_from_slice(dataset_id.as_bytes());
        key.push(0);
        key.extend_from_slice(spec.transform_version().as_bytes());
        key.push(0);
        key.extend_from_slice(&serde_json::to_vec(spec)?);
        if spec.augment {
            key.push(0);
            key.extend_from_slice(&self.seed.to_le_bytes());
        }
        Ok(storage::content_id("fs", &key))
    }

    // ========================================================================
    // EXTRACT
    // ========================================================================

    /// Derive a feature set from a dataset version.
    ///
    /// Idempotent: an existing feature set with the same id is verified and
    /// returned as-is.
    pub fn extract(&self, dataset_id: &str, spec: &TransformSpec) -> PipelineResult<FeatureSet> {
        spec.validate()?;
        let dataset = self.datasets.manifest(dataset_id)?;
        let id = self.feature_set_id(&dataset.id, spec)?;

        if self.exists(&id) {
            if !self.verify(&id)? {
                log::error!("Stored feature set {} fails its checksum", id);
                return Err(PipelineError::VersionConflict {
                    kind: "feature set",
                    id,
                });
            }
            log::info!("Feature set {} already extracted, reusing", id);
            return self.load(&id);
        }

        log::info!(
            "Extracting features from {} ({} records, transform {}, {} workers)",
            dataset.id,
            dataset.record_count,
            spec.transform_version(),
            self.workers
        );

        let records = self.datasets.load(&dataset.id)?.collect_all()?;
        let outcomes = self.extract_parallel(&records, spec)?;

        let mut entries = Vec::new();
        let mut exclusions = Vec::new();
        for (record, outcome) in records.iter().zip(outcomes) {
            match outcome {
                Ok(mut produced) => entries.append(&mut produced),
                Err(e) => {
                    log::warn!("Excluding record {}: {}", record.id, e);
                    exclusions.push(Exclusion {
                        record_id: record.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if entries.is_empty() {
            return Err(PipelineError::FeatureShape {
                record_id: None,
                reason: format!(
                    "all {} records of {} were excluded",
                    records.len(),
                    dataset.id
                ),
            });
        }

        let mut bytes = Vec::new();
        for entry in &entries {
            serde_json::to_writer(&mut bytes, entry)?;
            bytes.push(b'\n');
        }

        let manifest = FeatureSetManifest {
            format_version: FEATURE_SET_FORMAT_VERSION,
            id: id.clone(),
            dataset_id: dataset.id.clone(),
            transform: spec.clone(),
            transform_version: spec.transform_version(),
            shape: spec.shape(),
            entry_count: entries.len() as u64,
            excluded: exclusions.len() as u64,
            exclusions,
            augment_seed: spec.augment.then_some(self.seed),
            checksum: storage::sha256_hex(&bytes),
            created_at: Utc::now(),
        };

        let staged = StagedDir::new(&self.root)?;
        fs::write(staged.file(FEATURES_FILE), &bytes)?;
        storage::write_json(&staged.file(MANIFEST_FILE), &manifest)?;
        staged.commit(&self.set_dir(&id)?)?;

        log::info!(
            "Extracted {} entries into {} ({} excluded)",
            manifest.entry_count,
            manifest.id,
            manifest.excluded
        );
        Ok(FeatureSet { manifest, entries })
    }

    /// Per-record extraction over scoped worker threads, results in record order
    fn extract_parallel(
        &self,
        records: &[RawRecord],
        spec: &TransformSpec,
    ) -> PipelineResult<Vec<PipelineResult<Vec<FeatureEntry>>>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let chunk_size = records.len().div_ceil(self.workers);
        let seed = self.seed;

        thread::scope(|scope| {
            let handles: Vec<_> = records
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|record| extract_record(record, spec, seed))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            let mut outcomes = Vec::with_capacity(records.len());
            for handle in handles {
                let chunk = handle.join().map_err(|_| PipelineError::FeatureShape {
                    record_id: None,
                    reason: "extraction worker panicked".to_string(),
                })?;
                outcomes.extend(chunk);
            }
            Ok(outcomes)
        })
    }

    // ========================================================================
    // READ
    // ========================================================================

    pub fn exists(&self, id: &str) -> bool {
        self.set_dir(id)
            .map(|dir| dir.join(MANIFEST_FILE).is_file())
            .unwrap_or(false)
    }

    pub fn manifest(&self, id: &str) -> PipelineResult<FeatureSetManifest> {
        let path = self.set_dir(id)?.join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(PipelineError::not_found("feature set", id));
        }
        storage::read_json(&path)
    }

    pub fn load(&self, id: &str) -> PipelineResult<FeatureSet> {
        let manifest = self.manifest(id)?;
        let path = self.set_dir(id)?.join(FEATURES_FILE);
        if !path.is_file() {
            return Err(PipelineError::not_found("feature entries", id));
        }

        let data = fs::read_to_string(&path)?;
        let entries = data
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str::<FeatureEntry>(l))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FeatureSet { manifest, entries })
    }

    /// Check the stored entries still match the manifest checksum
    pub fn verify(&self, id: &str) -> PipelineResult<bool> {
        let manifest = self.manifest(id)?;
        let path = self.set_dir(id)?.join(FEATURES_FILE);
        if !path.is_file() {
            return Ok(false);
        }
        Ok(storage::file_checksum(&path)? == manifest.checksum)
    }

    pub fn list(&self) -> PipelineResult<Vec<FeatureSetManifest>> {
        storage::list_ids(&self.root)?
            .iter()
            .filter(|id| self.exists(id))
            .map(|id| self.manifest(id))
            .collect()
    }
}

// ============================================================================
// PER-RECORD EXTRACTION
// ============================================================================

/// All entries produced by one record, or the reason it is excluded
pub fn extract_record(
    record: &RawRecord,
    spec: &TransformSpec,
    seed: u64,
) -> PipelineResult<Vec<FeatureEntry>> {
    let series = series::base_series(record, spec.raster_size)?;
    let windows = series::windows(&series, spec.crop, spec.stride);

    let mut rng = spec.augment.then(|| series::augment_rng(seed, &record.id));
    let mut entries = Vec::with_capacity(windows.len() * if spec.augment { 2 } else { 1 });

    for (index, window) in windows.iter().enumerate() {
        let values = series::window_tensor(window, spec);
        if values.len() != spec.feature_dim() {
            return Err(PipelineError::shape(
                &record.id,
                format!("tensor has {} values, expected {}", values.len(), spec.feature_dim()),
            ));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::shape(&record.id, "tensor has non-finite values"));
        }

        if let Some(rng) = rng.as_mut() {
            let jittered = series::jitter(&values, rng);
            entries.push(FeatureEntry {
                record_id: record.id.clone(),
                window: index,
                augmented: false,
                values,
                label: record.label,
            });
            entries.push(FeatureEntry {
                record_id: record.id.clone(),
                window: index,
                augmented: true,
                values: jittered,
                label: record.label,
            });
        } else {
            entries.push(FeatureEntry {
                record_id: record.id.clone(),
                window: index,
                augmented: false,
                values,
                label: record.label,
            });
        }
    }

    Ok(entries)
}
