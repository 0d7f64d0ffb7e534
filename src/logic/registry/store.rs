//! Artifact Registry - records and resolves provenance chains
//!
//! Layout: `{root}/registry/{md-id}.json`
//!
//! An entry is published in one step after the whole chain has been checked,
//! so a model is either fully registered or not at all. An existing entry is
//! never replaced.

use std::io;
use std::path::PathBuf;

use chrono::Utc;
use parking_lot::Mutex;

use crate::logic::config::PipelineConfig;
use crate::logic::dataset::DatasetStore;
use crate::logic::error::{PipelineError, PipelineResult};
use crate::logic::evaluation::ReportStore;
use crate::logic::features::FeatureStore;
use crate::logic::model::ModelStore;
use crate::logic::storage;

use super::entry::{ProvenanceChain, RegistryEntry};

/// Serializes check-then-write of registry entries within the process
static REGISTER_LOCK: Mutex<()> = Mutex::new(());

pub struct Registry {
    dir: PathBuf,
    datasets: DatasetStore,
    features: FeatureStore,
    models: ModelStore,
    reports: ReportStore,
}

impl Registry {
    pub fn new(cfg: &PipelineConfig) -> Self {
        Self {
            dir: cfg.registry_dir(),
            datasets: DatasetStore::new(cfg),
            features: FeatureStore::new(cfg),
            models: ModelStore::new(cfg),
            reports: ReportStore::new(cfg),
        }
    }

    fn entry_path(&self, model_id: &str) -> PipelineResult<PathBuf> {
        storage::artifact_path(&self.dir, "md", "registry entry", model_id)?;
        Ok(self.dir.join(format!("{}.json", model_id)))
    }

    pub fn is_registered(&self, model_id: &str) -> bool {
        self.entry_path(model_id)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    // ========================================================================
    // REGISTER
    // ========================================================================

    /// Record a (dataset, feature set, model, report) tuple.
    ///
    /// Every id must exist and link to the next: the feature set derives
    /// from the dataset, the model was trained on the feature set and the
    /// report evaluates the model.
    pub fn register(
        &self,
        dataset_id: &str,
        feature_set_id: &str,
        model_id: &str,
        report_id: &str,
    ) -> PipelineResult<RegistryEntry> {
        let dataset = self.datasets.manifest(dataset_id)?;
        let feature_set = self.features.manifest(feature_set_id)?;
        let model = self.models.manifest(model_id)?;
        let report = self.reports.manifest(report_id)?;

        if feature_set.dataset_id != dataset.id {
            return Err(PipelineError::broken(
                model_id,
                "feature set",
                &feature_set.id,
                format!("derives from {}, not {}", feature_set.dataset_id, dataset.id),
            ));
        }
        if model.feature_set_id != feature_set.id {
            return Err(PipelineError::broken(
                model_id,
                "model",
                &model.id,
                format!("was trained on {}, not {}", model.feature_set_id, feature_set.id),
            ));
        }
        if report.model_id != model.id {
            return Err(PipelineError::broken(
                model_id,
                "report",
                &report.id,
                format!("evaluates {}, not {}", report.model_id, model.id),
            ));
        }

        let entry = RegistryEntry {
            model_id: model.id.clone(),
            dataset_id: dataset.id.clone(),
            feature_set_id: feature_set.id.clone(),
            report_id: report.id.clone(),
            report_feature_set_id: report.feature_set_id.clone(),
            role: model.role,
            transform_version: model.transform_version.clone(),
            registered_at: Utc::now(),
        };

        let conflict = || PipelineError::VersionConflict {
            kind: "registry entry",
            id: entry.model_id.clone(),
        };

        let _guard = REGISTER_LOCK.lock();
        let path = self.entry_path(&entry.model_id)?;
        if path.exists() {
            return Err(conflict());
        }
        // another process may register the same model between the check and here
        storage::write_file_new(&path, &serde_json::to_vec_pretty(&entry)?).map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                conflict()
            } else {
                PipelineError::Io(e)
            }
        })?;

        log::info!(
            "Registered {} ({} → {} → {} → {})",
            entry.model_id,
            entry.dataset_id,
            entry.feature_set_id,
            entry.model_id,
            entry.report_id
        );
        Ok(entry)
    }

    // ========================================================================
    // RESOLVE
    // ========================================================================

    pub fn entry(&self, model_id: &str) -> PipelineResult<RegistryEntry> {
        let path = self.entry_path(model_id)?;
        if !path.is_file() {
            return Err(PipelineError::not_found("registry entry", model_id));
        }
        storage::read_json(&path)
    }

    /// Load and verify every artifact behind a registered model
    pub fn resolve(&self, model_id: &str) -> PipelineResult<ProvenanceChain> {
        let entry = self.entry(model_id)?;
        let broken = |kind: &'static str, id: &str, reason: &str| {
            log::error!("Provenance of {} broken: {} {} {}", model_id, kind, id, reason);
            PipelineError::broken(model_id, kind, id, reason)
        };

        let dataset = self
            .datasets
            .manifest(&entry.dataset_id)
            .map_err(|_| broken("dataset", &entry.dataset_id, "is missing"))?;
        if !self.datasets.verify(&entry.dataset_id).unwrap_or(false) {
            return Err(broken("dataset", &entry.dataset_id, "fails checksum verification"));
        }

        let feature_set = self
            .features
            .manifest(&entry.feature_set_id)
            .map_err(|_| broken("feature set", &entry.feature_set_id, "is missing"))?;
        if !self.features.verify(&entry.feature_set_id).unwrap_or(false) {
            return Err(broken(
                "feature set",
                &entry.feature_set_id,
                "fails checksum verification",
            ));
        }

        let model = self
            .models
            .manifest(&entry.model_id)
            .map_err(|_| broken("model", &entry.model_id, "is missing"))?;
        if !self.models.verify(&entry.model_id).unwrap_or(false) {
            return Err(broken("model", &entry.model_id, "fails checksum verification"));
        }

        let report = self
            .reports
            .manifest(&entry.report_id)
            .map_err(|_| broken("report", &entry.report_id, "is missing"))?;
        if !self.reports.verify(&entry.report_id).unwrap_or(false) {
            return Err(broken("report", &entry.report_id, "fails checksum verification"));
        }

        if entry.report_feature_set_id != entry.feature_set_id
            && !self.features.exists(&entry.report_feature_set_id)
        {
            return Err(broken(
                "feature set",
                &entry.report_feature_set_id,
                "is missing",
            ));
        }

        log::info!("Resolved provenance of {}", model_id);
        Ok(ProvenanceChain {
            entry,
            dataset,
            feature_set,
            model,
            report,
        })
    }

    pub fn list(&self) -> PipelineResult<Vec<RegistryEntry>> {
        storage::list_ids(&self.dir)?
            .iter()
            .filter(|id| self.is_registered(id))
            .map(|id| self.entry(id))
            .collect()
    }
}
