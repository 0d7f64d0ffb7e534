//! Model Store - trains and persists immutable model artifacts
//!
//! Layout: `{root}/models/{md-id}/{manifest.json, model.json}`

use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;

use crate::constants::{MANIFEST_FILE, MODEL_FILE};
use crate::logic::config::PipelineConfig;
use crate::logic::error::{PipelineError, PipelineResult};
use crate::logic::features::FeatureSet;
use crate::logic::storage::{self, StagedDir};

use super::trainer;
use super::types::{
    Hyperparameters, ModelArtifact, ModelManifest, ModelParams, Role, TrainingMetrics,
    MODEL_FORMAT_VERSION,
};

/// Everything that determines a model, i.e. the artifact minus its id and
/// creation time
#[derive(Serialize)]
struct ModelContent<'a> {
    format_version: u8,
    role: Role,
    dataset_id: &'a str,
    feature_set_id: &'a str,
    transform_version: &'a str,
    feature_dim: usize,
    hyperparameters: &'a Hyperparameters,
    params: &'a ModelParams,
    metrics: &'a TrainingMetrics,
}

pub struct ModelStore {
    root: PathBuf,
    seed: u64,
}

impl ModelStore {
    pub fn new(cfg: &PipelineConfig) -> Self {
        Self {
            root: cfg.models_dir(),
            seed: cfg.seed,
        }
    }

    fn model_dir(&self, id: &str) -> PipelineResult<PathBuf> {
        storage::artifact_path(&self.root, "md", "model", id)
    }

    // ========================================================================
    // TRAIN
    // ========================================================================

    /// Fit a model on `feature_set` and persist it.
    ///
    /// Nothing is written unless training completes (or stops early). An
    /// identical rerun resolves to the stored artifact.
    pub fn train(
        &self,
        feature_set: &FeatureSet,
        role: Role,
        hyperparameters: &Hyperparameters,
    ) -> PipelineResult<ModelArtifact> {
        let seed = hyperparameters.seed.unwrap_or(self.seed);
        log::info!(
            "Training {} on {} ({} entries, dim {}, seed {})",
            role,
            feature_set.id(),
            feature_set.len(),
            feature_set.feature_dim(),
            seed
        );

        let outcome = trainer::fit(feature_set, role, hyperparameters, seed).map_err(|e| {
            log::error!("Training {} on {} failed: {}", role, feature_set.id(), e);
            e
        })?;

        let content = ModelContent {
            format_version: MODEL_FORMAT_VERSION,
            role,
            dataset_id: feature_set.dataset_id(),
            feature_set_id: feature_set.id(),
            transform_version: feature_set.transform_version(),
            feature_dim: feature_set.feature_dim(),
            hyperparameters,
            params: &outcome.params,
            metrics: &outcome.metrics,
        };
        let id = storage::content_id("md", &serde_json::to_vec(&content)?);

        if self.exists(&id) {
            log::info!("Model {} already stored, reusing", id);
            return self.load(&id);
        }

        let artifact = ModelArtifact {
            format_version: MODEL_FORMAT_VERSION,
            id: id.clone(),
            role,
            dataset_id: feature_set.dataset_id().to_string(),
            feature_set_id: feature_set.id().to_string(),
            transform_version: feature_set.transform_version().to_string(),
            feature_dim: feature_set.feature_dim(),
            hyperparameters: hyperparameters.clone(),
            params: outcome.params,
            metrics: outcome.metrics,
            created_at: Utc::now(),
        };

        let bytes = serde_json::to_vec_pretty(&artifact)?;
        let manifest = ModelManifest::from_artifact(&artifact, storage::sha256_hex(&bytes));

        let staged = StagedDir::new(&self.root)?;
        fs::write(staged.file(MODEL_FILE), &bytes)?;
        storage::write_json(&staged.file(MANIFEST_FILE), &manifest)?;
        staged.commit(&self.model_dir(&id)?)?;

        log::info!(
            "Stored model {} ({} epochs, {} iterations, final loss {:.6}{})",
            id,
            artifact.metrics.epochs_run,
            artifact.metrics.iterations,
            artifact.metrics.final_loss,
            if artifact.metrics.stopped_early {
                ", stopped early"
            } else {
                ""
            }
        );
        Ok(artifact)
    }

    // ========================================================================
    // READ
    // ========================================================================

    pub fn exists(&self, id: &str) -> bool {
        self.model_dir(id)
            .map(|dir| dir.join(MANIFEST_FILE).is_file())
            .unwrap_or(false)
    }

    pub fn manifest(&self, id: &str) -> PipelineResult<ModelManifest> {
        let path = self.model_dir(id)?.join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(PipelineError::not_found("model", id));
        }
        storage::read_json(&path)
    }

    pub fn load(&self, id: &str) -> PipelineResult<ModelArtifact> {
        self.manifest(id)?;
        let path = self.model_dir(id)?.join(MODEL_FILE);
        if !path.is_file() {
            return Err(PipelineError::not_found("model artifact", id));
        }
        storage::read_json(&path)
    }

    pub fn verify(&self, id: &str) -> PipelineResult<bool> {
        let manifest = self.manifest(id)?;
        let path = self.model_dir(id)?.join(MODEL_FILE);
        if !path.is_file() {
            return Ok(false);
        }
        Ok(storage::file_checksum(&path)? == manifest.checksum)
    }

    pub fn list(&self) -> PipelineResult<Vec<ModelManifest>> {
        storage::list_ids(&self.root)?
            .iter()
            .filter(|id| self.exists(id))
            .map(|id| self.manifest(id))
            .collect()
    }
}
