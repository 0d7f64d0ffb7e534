use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::dataset::DatasetVersion;
use crate::logic::evaluation::ReportManifest;
use crate::logic::features::FeatureSetManifest;
use crate::logic::model::{ModelManifest, Role};

/// One registered (dataset, features, model, report) tuple, keyed by model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub model_id: String,
    pub dataset_id: String,
    pub feature_set_id: String,
    pub report_id: String,

    /// Feature set the report was scored on (may differ from training)
    pub report_feature_set_id: String,

    pub role: Role,
    pub transform_version: String,
    pub registered_at: DateTime<Utc>,
}

/// Every manifest behind a registered model, loaded and verified
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceChain {
    pub entry: RegistryEntry,
    pub dataset: DatasetVersion,
    pub feature_set: FeatureSetManifest,
    pub model: ModelManifest,
    pub report: ReportManifest,
}
