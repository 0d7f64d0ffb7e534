//! Evaluator - scores a model against feature sets or single vectors
//!
//! Inputs are checked against the model's transformation version before
//! anything is scored.

use crate::logic::error::{PipelineError, PipelineResult};
use crate::logic::features::{Compatibility, FeatureEntry, FeatureSet, FeatureVector};
use crate::logic::model::{ModelArtifact, ModelParams, Role};

use super::report::{
    ClassificationMetrics, GeneratorMetrics, Metrics, Prediction, RecordPrediction,
    RegressionMetrics, SkipCounts, DECISION_THRESHOLD,
};

/// Scoring result before it is stored as a report
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub metrics: Option<Metrics>,
    pub scored: u64,
    pub skipped: SkipCounts,
    pub predictions: Vec<RecordPrediction>,
}

/// Provenance and shape gate shared by `evaluate` and `predict`
fn check_input(
    model: &ModelArtifact,
    transform_version: &str,
    dim: usize,
    compat: &Compatibility,
) -> PipelineResult<()> {
    compat.check(&model.transform_version, transform_version)?;
    if dim != model.feature_dim {
        return Err(PipelineError::FeatureShape {
            record_id: None,
            reason: format!(
                "model {} expects {} features, input has {}",
                model.id, model.feature_dim, dim
            ),
        });
    }
    Ok(())
}

// ============================================================================
// PREDICT
// ============================================================================

/// Score one feature vector
pub fn predict(
    model: &ModelArtifact,
    input: &FeatureVector,
    compat: &Compatibility,
) -> PipelineResult<Prediction> {
    check_input(model, &input.transform_version, input.values.len(), compat)?;
    score(model, &input.values)
}

fn score(model: &ModelArtifact, values: &[f32]) -> PipelineResult<Prediction> {
    let params = &model.params;
    let prediction = match (model.role, params) {
        (Role::Detector, ModelParams::Logistic { .. }) => {
            let p = params.watermark_probability(values).unwrap_or(0.0);
            let watermarked = p >= DECISION_THRESHOLD;
            Prediction::Detection {
                watermarked,
                confidence: if watermarked { p } else { 1.0 - p },
            }
        }
        (Role::TimestampRegressor, ModelParams::Linear { error_bound, .. }) => {
            Prediction::Timestamp {
                estimate: params.timestamp_estimate(values).unwrap_or(f64::NAN),
                error_bound: Some(*error_bound),
            }
        }
        (Role::Generator, ModelParams::Generator { .. }) => {
            let embedded = params.embed(values).unwrap_or_else(|| values.to_vec());
            let probe_score = params.watermark_probability(&embedded).unwrap_or(0.0);
            Prediction::Embedding {
                values: embedded,
                probe_score,
            }
        }
        (role, _) => {
            return Err(PipelineError::Training(format!(
                "model {} has parameters that do not match role {}",
                model.id, role
            )))
        }
    };
    Ok(prediction)
}

// ============================================================================
// EVALUATE
// ============================================================================

/// Score every eligible entry of `set` and aggregate metrics
pub fn evaluate(
    model: &ModelArtifact,
    set: &FeatureSet,
    compat: &Compatibility,
) -> PipelineResult<Evaluation> {
    check_input(model, set.transform_version(), set.feature_dim(), compat)?;

    let mut skipped = SkipCounts::default();
    let mut eligible: Vec<&FeatureEntry> = Vec::new();

    for entry in &set.entries {
        if entry.augmented {
            skipped.augmented += 1;
            continue;
        }
        let has_target = match model.role {
            Role::Detector => entry.label.is_some(),
            Role::TimestampRegressor => entry.label.and_then(|l| l.timestamp).is_some(),
            Role::Generator => true,
        };
        if !has_target {
            skipped.unlabeled += 1;
            continue;
        }
        if entry.values.len() != model.feature_dim {
            return Err(PipelineError::shape(
                &entry.record_id,
                format!(
                    "entry has {} values, model expects {}",
                    entry.values.len(),
                    model.feature_dim
                ),
            ));
        }
        eligible.push(entry);
    }

    let mut predictions = Vec::with_capacity(eligible.len());
    for entry in &eligible {
        predictions.push(RecordPrediction {
            record_id: entry.record_id.clone(),
            window: entry.window,
            prediction: score(model, &entry.values)?,
            label: entry.label,
        });
    }

    let metrics = if eligible.is_empty() {
        None
    } else {
        Some(aggregate(model, &eligible, &predictions))
    };

    Ok(Evaluation {
        metrics,
        scored: eligible.len() as u64,
        skipped,
        predictions,
    })
}

fn aggregate(
    model: &ModelArtifact,
    entries: &[&FeatureEntry],
    predictions: &[RecordPrediction],
) -> Metrics {
    match model.role {
        Role::Detector => {
            let outcomes: Vec<(bool, bool)> = predictions
                .iter()
                .filter_map(|p| match (&p.prediction, p.label) {
                    (Prediction::Detection { watermarked, .. }, Some(label)) => {
                        Some((*watermarked, label.watermarked))
                    }
                    _ => None,
                })
                .collect();
            Metrics::Classification(ClassificationMetrics::from_outcomes(&outcomes))
        }
        Role::TimestampRegressor => {
            let errors: Vec<f64> = predictions
                .iter()
                .filter_map(|p| match (&p.prediction, p.label.and_then(|l| l.timestamp)) {
                    (Prediction::Timestamp { estimate, .. }, Some(truth)) => {
                        Some((estimate - truth as f64).abs())
                    }
                    _ => None,
                })
                .collect();
            Metrics::Regression(RegressionMetrics::from_errors(&errors))
        }
        Role::Generator => {
            let mut correct = 0u64;
            let mut decisions = 0u64;
            let mut distortion = 0.0;
            let mut values_seen = 0usize;

            for (entry, prediction) in entries.iter().zip(predictions) {
                if let Prediction::Embedding {
                    values,
                    probe_score,
                } = &prediction.prediction
                {
                    let clean_score = model
                        .params
                        .watermark_probability(&entry.values)
                        .unwrap_or(0.0);
                    if clean_score < DECISION_THRESHOLD {
                        correct += 1;
                    }
                    if *probe_score >= DECISION_THRESHOLD {
                        correct += 1;
                    }
                    decisions += 2;

                    distortion += values
                        .iter()
                        .zip(&entry.values)
                        .map(|(a, b)| (a - b).abs() as f64)
                        .sum::<f64>();
                    values_seen += values.len();
                }
            }

            Metrics::Generator(GeneratorMetrics {
                detection_accuracy: if decisions > 0 {
                    correct as f64 / decisions as f64
                } else {
                    0.0
                },
                mean_distortion: if values_seen > 0 {
                    distortion / values_seen as f64
                } else {
                    0.0
                },
            })
        }
    }
}
