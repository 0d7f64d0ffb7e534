use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::error::{ConvergenceWarning, PipelineError, PipelineResult};

/// Artifact schema version
pub const MODEL_FORMAT_VERSION: u8 = 1;

// ============================================================================
// ROLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Embeds a watermark into a feature tensor
    Generator,
    /// Watermarked vs clean classifier
    Detector,
    /// Estimates the embedded timestamp
    TimestampRegressor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Generator => "generator",
            Role::Detector => "detector",
            Role::TimestampRegressor => "timestamp_regressor",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// HYPERPARAMETERS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,

    /// L2 penalty on learned weights (and on the generator pattern)
    pub l2: f64,

    /// Epochs without `min_delta` improvement before stopping (0 disables)
    pub patience: usize,
    pub min_delta: f64,

    /// Hard cap on optimizer steps across all epochs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<usize>,

    /// Falls back to the pipeline seed when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Embedding scale `α` in `x + α·p` (generator only)
    pub watermark_strength: f64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 16,
            learning_rate: 0.1,
            l2: 1e-4,
            patience: 5,
            min_delta: 1e-6,
            max_iterations: None,
            seed: None,
            watermark_strength: 0.1,
        }
    }
}

impl Hyperparameters {
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_patience(mut self, patience: usize, min_delta: f64) -> Self {
        self.patience = patience;
        self.min_delta = min_delta;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> PipelineResult<()> {
        let fail = |msg: String| Err(PipelineError::Training(msg));

        if self.epochs == 0 {
            return fail("epochs must be positive".to_string());
        }
        if self.batch_size == 0 {
            return fail("batch_size must be positive".to_string());
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return fail(format!("invalid learning rate {}", self.learning_rate));
        }
        if !self.l2.is_finite() || self.l2 < 0.0 {
            return fail(format!("invalid l2 penalty {}", self.l2));
        }
        if !self.min_delta.is_finite() || self.min_delta < 0.0 {
            return fail(format!("invalid min_delta {}", self.min_delta));
        }
        if self.max_iterations == Some(0) {
            return fail("max_iterations must be positive".to_string());
        }
        if !self.watermark_strength.is_finite() || self.watermark_strength <= 0.0 {
            return fail(format!(
                "invalid watermark strength {}",
                self.watermark_strength
            ));
        }
        Ok(())
    }
}

// ============================================================================
// LEARNED PARAMETERS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelParams {
    /// Detector: `σ(w·x + b)`
    Logistic { weights: Vec<f64>, bias: f64 },

    /// Timestamp regressor on the standardized target
    Linear {
        weights: Vec<f64>,
        bias: f64,
        target_mean: f64,
        target_std: f64,
        /// Training RMSE in timestamp units
        error_bound: f64,
    },

    /// Additive pattern plus the probe trained to find it
    Generator {
        pattern: Vec<f64>,
        strength: f64,
        probe_weights: Vec<f64>,
        probe_bias: f64,
    },
}

fn dot(weights: &[f64], values: &[f32]) -> f64 {
    weights
        .iter()
        .zip(values)
        .map(|(w, v)| w * *v as f64)
        .sum()
}

pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl ModelParams {
    /// Name of the first learned parameter holding `inf` or `NaN`, if any
    pub fn non_finite_field(&self) -> Option<&'static str> {
        let all_finite = |values: &[f64]| values.iter().all(|v| v.is_finite());
        match self {
            ModelParams::Logistic { weights, bias } => {
                if !all_finite(weights) {
                    Some("weights")
                } else if !bias.is_finite() {
                    Some("bias")
                } else {
                    None
                }
            }
            ModelParams::Linear {
                weights,
                bias,
                target_mean,
                target_std,
                error_bound,
            } => [
                ("weights", all_finite(weights)),
                ("bias", bias.is_finite()),
                ("target_mean", target_mean.is_finite()),
                ("target_std", target_std.is_finite()),
                ("error_bound", error_bound.is_finite()),
            ]
            .into_iter()
            .find(|(_, ok)| !ok)
            .map(|(name, _)| name),
            ModelParams::Generator {
                pattern,
                strength,
                probe_weights,
                probe_bias,
            } => [
                ("pattern", all_finite(pattern)),
                ("strength", strength.is_finite()),
                ("probe_weights", all_finite(probe_weights)),
                ("probe_bias", probe_bias.is_finite()),
            ]
            .into_iter()
            .find(|(_, ok)| !ok)
            .map(|(name, _)| name),
        }
    }

    pub fn dim(&self) -> usize {
        match self {
            ModelParams::Logistic { weights, .. } => weights.len(),
            ModelParams::Linear { weights, .. } => weights.len(),
            ModelParams::Generator { pattern, .. } => pattern.len(),
        }
    }

    /// Probability that `values` carries a watermark (detector and
    /// generator probe)
    pub fn watermark_probability(&self, values: &[f32]) -> Option<f64> {
        match self {
            ModelParams::Logistic { weights, bias } => Some(sigmoid(dot(weights, values) + bias)),
            ModelParams::Generator {
                probe_weights,
                probe_bias,
                ..
            } => Some(sigmoid(dot(probe_weights, values) + probe_bias)),
            ModelParams::Linear { .. } => None,
        }
    }

    /// Timestamp estimate in original units
    pub fn timestamp_estimate(&self, values: &[f32]) -> Option<f64> {
        match self {
            ModelParams::Linear {
                weights,
                bias,
                target_mean,
                target_std,
                ..
            } => Some((dot(weights, values) + bias) * target_std + target_mean),
            _ => None,
        }
    }

    /// `x + α·p`
    pub fn embed(&self, values: &[f32]) -> Option<Vec<f32>> {
        match self {
            ModelParams::Generator {
                pattern, strength, ..
            } => Some(
                values
                    .iter()
                    .zip(pattern)
                    .map(|(v, p)| (*v as f64 + strength * p) as f32)
                    .collect(),
            ),
            _ => None,
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub seed: u64,
    pub samples: usize,
    pub epochs_run: usize,

    /// Optimizer steps taken
    pub iterations: usize,

    pub final_loss: f64,
    pub best_loss: f64,

    /// Mean loss per epoch
    pub loss_history: Vec<f64>,

    pub stopped_early: bool,

    #[serde(default)]
    pub warnings: Vec<ConvergenceWarning>,
}

// ============================================================================
// ARTIFACT
// ============================================================================

/// Trained model plus everything needed to trace and reproduce it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u8,
    pub id: String,
    pub role: Role,
    pub dataset_id: String,
    pub feature_set_id: String,

    /// Inputs must come from this transformation (or a declared compatible one)
    pub transform_version: String,
    pub feature_dim: usize,

    pub hyperparameters: Hyperparameters,
    pub params: ModelParams,
    pub metrics: TrainingMetrics,
    pub created_at: DateTime<Utc>,
}

/// Lightweight manifest stored next to `model.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelManifest {
    pub format_version: u8,
    pub id: String,
    pub role: Role,
    pub dataset_id: String,
    pub feature_set_id: String,
    pub transform_version: String,
    pub feature_dim: usize,

    /// sha256 of `model.json`
    pub checksum: String,

    pub created_at: DateTime<Utc>,
}

impl ModelManifest {
    pub fn from_artifact(artifact: &ModelArtifact, checksum: String) -> Self {
        Self {
            format_version: artifact.format_version,
            id: artifact.id.clone(),
            role: artifact.role,
            dataset_id: artifact.dataset_id.clone(),
            feature_set_id: artifact.feature_set_id.clone(),
            transform_version: artifact.transform_version.clone(),
            feature_dim: artifact.feature_dim,
            checksum,
            created_at: artifact.created_at,
        }
    }
}
