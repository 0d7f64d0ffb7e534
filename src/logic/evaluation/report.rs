use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::dataset::Label;
use crate::logic::model::Role;

/// Report schema version
pub const REPORT_FORMAT_VERSION: u8 = 1;

/// Probability at or above which an input is called watermarked
pub const DECISION_THRESHOLD: f64 = 0.5;

// ============================================================================
// PREDICTION
// ============================================================================

/// Output of a model for one feature vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Prediction {
    Detection {
        watermarked: bool,
        /// Probability of the predicted class
        confidence: f64,
    },
    Timestamp {
        estimate: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_bound: Option<f64>,
    },
    Embedding {
        values: Vec<f32>,
        /// Probe probability that `values` carries the watermark
        probe_score: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPrediction {
    pub record_id: String,
    pub window: usize,
    pub prediction: Prediction,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<Label>,
}

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub true_positives: u64,
    pub false_positives: u64,
    pub true_negatives: u64,
    pub false_negatives: u64,
}

impl ClassificationMetrics {
    /// From (predicted, actual) pairs; undefined ratios are 0
    pub fn from_outcomes(outcomes: &[(bool, bool)]) -> Self {
        let mut m = Self::default();
        for &(predicted, actual) in outcomes {
            match (predicted, actual) {
                (true, true) => m.true_positives += 1,
                (true, false) => m.false_positives += 1,
                (false, false) => m.true_negatives += 1,
                (false, true) => m.false_negatives += 1,
            }
        }

        let ratio = |num: u64, den: u64| if den > 0 { num as f64 / den as f64 } else { 0.0 };
        m.accuracy = ratio(m.true_positives + m.true_negatives, outcomes.len() as u64);
        m.precision = ratio(m.true_positives, m.true_positives + m.false_positives);
        m.recall = ratio(m.true_positives, m.true_positives + m.false_negatives);
        m.f1 = if m.precision + m.recall > 0.0 {
            2.0 * m.precision * m.recall / (m.precision + m.recall)
        } else {
            0.0
        };
        m
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub mae: f64,
    pub rmse: f64,
    pub max_error: f64,
}

impl RegressionMetrics {
    /// From absolute errors; `errors` must be non-empty
    pub fn from_errors(errors: &[f64]) -> Self {
        let n = errors.len().max(1) as f64;
        Self {
            mae: errors.iter().sum::<f64>() / n,
            rmse: (errors.iter().map(|e| e * e).sum::<f64>() / n).sqrt(),
            max_error: errors.iter().cloned().fold(0.0, f64::max),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratorMetrics {
    /// Probe accuracy over clean and embedded versions of every entry
    pub detection_accuracy: f64,

    /// Mean absolute per-value change introduced by embedding
    pub mean_distortion: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Metrics {
    Classification(ClassificationMetrics),
    Regression(RegressionMetrics),
    Generator(GeneratorMetrics),
}

impl Metrics {
    pub fn accuracy(&self) -> Option<f64> {
        match self {
            Metrics::Classification(m) => Some(m.accuracy),
            Metrics::Generator(m) => Some(m.detection_accuracy),
            Metrics::Regression(_) => None,
        }
    }
}

// ============================================================================
// REPORT
// ============================================================================

/// Entries left out of scoring
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipCounts {
    pub augmented: u64,
    pub unlabeled: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub format_version: u8,
    pub id: String,
    pub model_id: String,
    pub feature_set_id: String,
    pub transform_version: String,
    pub role: Role,

    /// None when no entry was scorable
    pub metrics: Option<Metrics>,

    pub scored: u64,
    pub skipped: SkipCounts,
    pub predictions: Vec<RecordPrediction>,
    pub created_at: DateTime<Utc>,
}

/// Manifest stored next to `report.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportManifest {
    pub format_version: u8,
    pub id: String,
    pub model_id: String,
    pub feature_set_id: String,
    pub transform_version: String,
    pub role: Role,
    pub metrics: Option<Metrics>,
    pub scored: u64,
    pub skipped: SkipCounts,

    /// sha256 of `report.json`
    pub checksum: String,

    pub created_at: DateTime<Utc>,
}

impl ReportManifest {
    pub fn from_report(report: &EvaluationReport, checksum: String) -> Self {
        Self {
            format_version: report.format_version,
            id: report.id.clone(),
            model_id: report.model_id.clone(),
            feature_set_id: report.feature_set_id.clone(),
            transform_version: report.transform_version.clone(),
            role: report.role,
            metrics: report.metrics.clone(),
            scored: report.scored,
            skipped: report.skipped.clone(),
            checksum,
            created_at: report.created_at,
        }
    }
}
