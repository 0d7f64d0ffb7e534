//! Report Store - persisted evaluation reports
//!
//! Layout: `{root}/reports/{ev-id}/{manifest.json, report.json}`

use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;

use crate::constants::{MANIFEST_FILE, REPORT_FILE};
use crate::logic::config::PipelineConfig;
use crate::logic::error::{PipelineError, PipelineResult};
use crate::logic::features::{Compatibility, FeatureSet};
use crate::logic::model::{ModelArtifact, Role};
use crate::logic::storage::{self, StagedDir};

use super::evaluator;
use super::report::{
    EvaluationReport, Metrics, RecordPrediction, ReportManifest, SkipCounts,
    REPORT_FORMAT_VERSION,
};

/// Report content without id and creation time
#[derive(Serialize)]
struct ReportContent<'a> {
    format_version: u8,
    model_id: &'a str,
    feature_set_id: &'a str,
    transform_version: &'a str,
    role: Role,
    metrics: &'a Option<Metrics>,
    scored: u64,
    skipped: &'a SkipCounts,
    predictions: &'a [RecordPrediction],
}

pub struct ReportStore {
    root: PathBuf,
}

impl ReportStore {
    pub fn new(cfg: &PipelineConfig) -> Self {
        Self {
            root: cfg.reports_dir(),
        }
    }

    fn report_dir(&self, id: &str) -> PipelineResult<PathBuf> {
        storage::artifact_path(&self.root, "ev", "report", id)
    }

    /// Evaluate `model` on `feature_set` and persist the report.
    /// A provenance mismatch fails before anything is written.
    pub fn evaluate(
        &self,
        model: &ModelArtifact,
        feature_set: &FeatureSet,
        compat: &Compatibility,
    ) -> PipelineResult<EvaluationReport> {
        log::info!(
            "Evaluating {} {} on {} ({} entries)",
            model.role,
            model.id,
            feature_set.id(),
            feature_set.len()
        );

        let evaluation = evaluator::evaluate(model, feature_set, compat).map_err(|e| {
            log::error!("Evaluation of {} on {} failed: {}", model.id, feature_set.id(), e);
            e
        })?;

        let content = ReportContent {
            format_version: REPORT_FORMAT_VERSION,
            model_id: &model.id,
            feature_set_id: feature_set.id(),
            transform_version: feature_set.transform_version(),
            role: model.role,
            metrics: &evaluation.metrics,
            scored: evaluation.scored,
            skipped: &evaluation.skipped,
            predictions: &evaluation.predictions,
        };
        let id = storage::content_id("ev", &serde_json::to_vec(&content)?);

        if self.exists(&id) {
            log::info!("Report {} already stored, reusing", id);
            return self.load(&id);
        }

        if evaluation.metrics.is_none() {
            log::warn!(
                "No scorable entries in {} ({} augmented, {} unlabeled skipped)",
                feature_set.id(),
                evaluation.skipped.augmented,
                evaluation.skipped.unlabeled
            );
        }

        let report = EvaluationReport {
            format_version: REPORT_FORMAT_VERSION,
            id: id.clone(),
            model_id: model.id.clone(),
            feature_set_id: feature_set.id().to_string(),
            transform_version: feature_set.transform_version().to_string(),
            role: model.role,
            metrics: evaluation.metrics,
            scored: evaluation.scored,
            skipped: evaluation.skipped,
            predictions: evaluation.predictions,
            created_at: Utc::now(),
        };

        let bytes = serde_json::to_vec_pretty(&report)?;
        let manifest = ReportManifest::from_report(&report, storage::sha256_hex(&bytes));

        let staged = StagedDir::new(&self.root)?;
        fs::write(staged.file(REPORT_FILE), &bytes)?;
        storage::write_json(&staged.file(MANIFEST_FILE), &manifest)?;
        staged.commit(&self.report_dir(&id)?)?;

        log::info!(
            "Stored report {} ({} scored, accuracy {:?})",
            id,
            report.scored,
            report.metrics.as_ref().and_then(|m| m.accuracy())
        );
        Ok(report)
    }

    pub fn exists(&self, id: &str) -> bool {
        self.report_dir(id)
            .map(|dir| dir.join(MANIFEST_FILE).is_file())
            .unwrap_or(false)
    }

    pub fn manifest(&self, id: &str) -> PipelineResult<ReportManifest> {
        let path = self.report_dir(id)?.join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(PipelineError::not_found("report", id));
        }
        storage::read_json(&path)
    }

    pub fn load(&self, id: &str) -> PipelineResult<EvaluationReport> {
        self.manifest(id)?;
        let path = self.report_dir(id)?.join(REPORT_FILE);
        if !path.is_file() {
            return Err(PipelineError::not_found("report body", id));
        }
        storage::read_json(&path)
    }

    pub fn verify(&self, id: &str) -> PipelineResult<bool> {
        let manifest = self.manifest(id)?;
        let path = self.report_dir(id)?.join(REPORT_FILE);
        if !path.is_file() {
            return Ok(false);
        }
        Ok(storage::file_checksum(&path)? == manifest.checksum)
    }

    pub fn list(&self) -> PipelineResult<Vec<ReportManifest>> {
        storage::list_ids(&self.root)?
            .iter()
            .filter(|id| self.exists(id))
            .map(|id| self.manifest(id))
            .collect()
    }
}
