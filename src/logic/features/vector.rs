use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::dataset::Label;

use super::transform::TransformSpec;

/// Manifest schema version
pub const FEATURE_SET_FORMAT_VERSION: u8 = 1;

/// One fixed-shape tensor derived from one window of one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEntry {
    pub record_id: String,

    /// Window index within the record (0 without stride)
    pub window: usize,

    /// Jittered copy; never scored by evaluation
    #[serde(default)]
    pub augmented: bool,

    /// Flattened `[channels × crop]`
    pub values: Vec<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<Label>,
}

/// A single input to `predict`, tagged with how it was produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub transform_version: String,
    pub values: Vec<f32>,
}

impl FeatureVector {
    pub fn new(transform_version: impl Into<String>, values: Vec<f32>) -> Self {
        Self {
            transform_version: transform_version.into(),
            values,
        }
    }
}

/// Record left out of a feature set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    pub record_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSetManifest {
    pub format_version: u8,
    pub id: String,
    pub dataset_id: String,
    pub transform: TransformSpec,
    pub transform_version: String,

    /// `[channels, crop]`
    pub shape: [usize; 2],

    pub entry_count: u64,
    pub excluded: u64,
    pub exclusions: Vec<Exclusion>,

    /// Seed behind augmented copies (None without augmentation)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub augment_seed: Option<u64>,

    /// sha256 of the stored entries file
    pub checksum: String,

    pub created_at: DateTime<Utc>,
}

impl FeatureSetManifest {
    pub fn feature_dim(&self) -> usize {
        self.shape[0] * self.shape[1]
    }
}

/// Manifest plus entries, as produced by `extract` or `load`
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub manifest: FeatureSetManifest,
    pub entries: Vec<FeatureEntry>,
}

impl FeatureSet {
    pub fn id(&self) -> &str {
        &self.manifest.id
    }

    pub fn dataset_id(&self) -> &str {
        &self.manifest.dataset_id
    }

    pub fn transform_version(&self) -> &str {
        &self.manifest.transform_version
    }

    pub fn feature_dim(&self) -> usize {
        self.manifest.feature_dim()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry as a standalone `predict` input
    pub fn vector(&self, index: usize) -> Option<FeatureVector> {
        self.entries
            .get(index)
            .map(|e| FeatureVector::new(self.transform_version(), e.values.clone()))
    }
}
