//! Trainer - bounded mini-batch gradient descent for the reference models
//!
//! Each epoch shuffles the entry order with a seeded `StdRng`. A loader
//! thread gathers batches and hands them to the optimizer over a bounded
//! channel, so batch assembly overlaps with the gradient steps.

use std::sync::mpsc;
use std::thread;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::logic::error::{ConvergenceWarning, PipelineError, PipelineResult};
use crate::logic::features::FeatureSet;

use super::types::{sigmoid, Hyperparameters, ModelParams, Role, TrainingMetrics};

/// Batches buffered between loader and optimizer
const BATCH_QUEUE_DEPTH: usize = 4;

/// Clamp for log() in the cross-entropy
const PROB_EPS: f64 = 1e-12;

/// Initial generator pattern amplitude
const PATTERN_INIT: f64 = 0.1;

// ============================================================================
// TRAINING DATA
// ============================================================================

struct TrainingData {
    x: Array2<f64>,
    y: Array1<f64>,
    target_mean: f64,
    target_std: f64,
}

impl TrainingData {
    fn from_feature_set(set: &FeatureSet, role: Role) -> PipelineResult<Self> {
        if set.is_empty() {
            return Err(PipelineError::Training(format!(
                "feature set {} has no entries",
                set.id()
            )));
        }

        let dim = set.feature_dim();
        let n = set.len();
        let mut flat = Vec::with_capacity(n * dim);
        let mut targets = Vec::with_capacity(n);

        for entry in &set.entries {
            if entry.values.len() != dim {
                return Err(PipelineError::Training(format!(
                    "entry {} has {} values, feature set declares {}",
                    entry.record_id,
                    entry.values.len(),
                    dim
                )));
            }
            flat.extend(entry.values.iter().map(|v| *v as f64));

            let target = match role {
                Role::Detector => entry.label.map(|l| if l.watermarked { 1.0 } else { 0.0 }),
                Role::TimestampRegressor => entry.label.and_then(|l| l.timestamp).map(|t| t as f64),
                Role::Generator => Some(0.0),
            };
            match target {
                Some(t) => targets.push(t),
                None => {
                    return Err(PipelineError::Training(format!(
                        "entry {} lacks the label required by {}",
                        entry.record_id, role
                    )))
                }
            }
        }

        let x = Array2::from_shape_vec((n, dim), flat)
            .map_err(|e| PipelineError::Training(format!("array error: {}", e)))?;
        let mut y = Array1::from(targets);

        let (mut target_mean, mut target_std) = (0.0, 1.0);
        if role == Role::TimestampRegressor {
            target_mean = y.mean().unwrap_or(0.0);
            let std = y.std(0.0);
            target_std = if std > 0.0 { std } else { 1.0 };
            y.mapv_inplace(|t| (t - target_mean) / target_std);
        }

        Ok(Self {
            x,
            y,
            target_mean,
            target_std,
        })
    }

    fn gather(&self, indices: &[usize]) -> Batch {
        Batch {
            x: self.x.select(Axis(0), indices),
            y: self.y.select(Axis(0), indices),
        }
    }
}

struct Batch {
    x: Array2<f64>,
    y: Array1<f64>,
}

// ============================================================================
// OBJECTIVES
// ============================================================================

/// A model that takes one gradient step per batch and reports the batch
/// loss measured before the step
trait Objective {
    fn step(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>, lr: f64, l2: f64) -> f64;
}

struct Logistic {
    w: Array1<f64>,
    b: f64,
}

impl Objective for Logistic {
    fn step(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>, lr: f64, l2: f64) -> f64 {
        let n = x.nrows() as f64;
        let p = (x.dot(&self.w) + self.b).mapv(sigmoid);
        let loss = bce(&p, &y) + 0.5 * l2 * self.w.dot(&self.w);

        let err = &p - &y;
        let grad_w = x.t().dot(&err) / n + &self.w * l2;
        let grad_b = err.sum() / n;

        self.w.scaled_add(-lr, &grad_w);
        self.b -= lr * grad_b;
        loss
    }
}

struct Linear {
    w: Array1<f64>,
    b: f64,
}

impl Objective for Linear {
    fn step(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>, lr: f64, l2: f64) -> f64 {
        let n = x.nrows() as f64;
        let residual = x.dot(&self.w) + self.b - &y;
        let loss = residual.mapv(|r| r * r).sum() / n + 0.5 * l2 * self.w.dot(&self.w);

        let grad_w = x.t().dot(&residual) * (2.0 / n) + &self.w * l2;
        let grad_b = 2.0 * residual.sum() / n;

        self.w.scaled_add(-lr, &grad_w);
        self.b -= lr * grad_b;
        loss
    }
}

/// Pattern `p` and probe `(w, b)`: clean rows are class 0, the same rows
/// with `α·p` added are class 1
struct Generator {
    pattern: Array1<f64>,
    strength: f64,
    w: Array1<f64>,
    b: f64,
}

impl Objective for Generator {
    fn step(&mut self, x: ArrayView2<f64>, _y: ArrayView1<f64>, lr: f64, l2: f64) -> f64 {
        let n = x.nrows() as f64;
        let shift = self.strength * self.pattern.dot(&self.w);

        let z_clean = x.dot(&self.w) + self.b;
        let p_clean = z_clean.mapv(sigmoid);
        let p_marked = z_clean.mapv(|z| sigmoid(z + shift));

        let zeros = Array1::<f64>::zeros(p_clean.len());
        let ones = Array1::<f64>::ones(p_marked.len());
        let loss = 0.5 * (bce(&p_clean, &zeros.view()) + bce(&p_marked, &ones.view()))
            + 0.5 * l2 * (self.w.dot(&self.w) + self.pattern.dot(&self.pattern));

        // dL/dz per row, averaged over both halves
        let g_clean = &p_clean / (2.0 * n);
        let g_marked = (&p_marked - 1.0) / (2.0 * n);
        let g_marked_sum = g_marked.sum();

        let grad_w = x.t().dot(&(&g_clean + &g_marked))
            + &self.pattern * (self.strength * g_marked_sum)
            + &self.w * l2;
        let grad_b = g_clean.sum() + g_marked_sum;
        let grad_p = &self.w * (self.strength * g_marked_sum) + &self.pattern * l2;

        self.w.scaled_add(-lr, &grad_w);
        self.b -= lr * grad_b;
        self.pattern.scaled_add(-lr, &grad_p);
        loss
    }
}

/// Mean binary cross-entropy
fn bce(p: &Array1<f64>, y: &ArrayView1<f64>) -> f64 {
    let n = p.len().max(1) as f64;
    p.iter()
        .zip(y.iter())
        .map(|(p, y)| {
            let p = p.clamp(PROB_EPS, 1.0 - PROB_EPS);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum::<f64>()
        / n
}

// ============================================================================
// TRAIN LOOP
// ============================================================================

/// Learned parameters and run metrics
pub struct TrainOutcome {
    pub params: ModelParams,
    pub metrics: TrainingMetrics,
}

/// Fit a reference model of `role` on every entry of `set` (augmented
/// copies included)
pub fn fit(
    set: &FeatureSet,
    role: Role,
    hp: &Hyperparameters,
    seed: u64,
) -> PipelineResult<TrainOutcome> {
    hp.validate()?;
    let data = TrainingData::from_feature_set(set, role)?;
    let dim = data.x.ncols();
    let mut rng = StdRng::seed_from_u64(seed);

    let outcome = match role {
        Role::Detector => {
            let mut model = Logistic {
                w: Array1::zeros(dim),
                b: 0.0,
            };
            let metrics = run_epochs(&mut model, &data, hp, seed, &mut rng)?;
            TrainOutcome {
                params: ModelParams::Logistic {
                    weights: model.w.to_vec(),
                    bias: model.b,
                },
                metrics,
            }
        }
        Role::TimestampRegressor => {
            let mut model = Linear {
                w: Array1::zeros(dim),
                b: 0.0,
            };
            let metrics = run_epochs(&mut model, &data, hp, seed, &mut rng)?;

            let residual = data.x.dot(&model.w) + model.b - &data.y;
            let rmse = (residual.mapv(|r| r * r).mean().unwrap_or(0.0)).sqrt();

            TrainOutcome {
                params: ModelParams::Linear {
                    weights: model.w.to_vec(),
                    bias: model.b,
                    target_mean: data.target_mean,
                    target_std: data.target_std,
                    error_bound: rmse * data.target_std,
                },
                metrics,
            }
        }
        Role::Generator => {
            let pattern: Array1<f64> =
                (0..dim).map(|_| rng.gen_range(-PATTERN_INIT..=PATTERN_INIT)).collect();
            let mut model = Generator {
                pattern,
                strength: hp.watermark_strength,
                w: Array1::zeros(dim),
                b: 0.0,
            };
            let metrics = run_epochs(&mut model, &data, hp, seed, &mut rng)?;
            TrainOutcome {
                params: ModelParams::Generator {
                    pattern: model.pattern.to_vec(),
                    strength: model.strength,
                    probe_weights: model.w.to_vec(),
                    probe_bias: model.b,
                },
                metrics,
            }
        }
    };

    // the loss is measured before each step, so the last step is only
    // visible in the parameters it produced
    if let Some(field) = outcome.params.non_finite_field() {
        return Err(PipelineError::Training(format!(
            "{} became non-finite after {} iterations",
            field, outcome.metrics.iterations
        )));
    }
    Ok(outcome)
}

fn run_epochs<M: Objective>(
    model: &mut M,
    data: &TrainingData,
    hp: &Hyperparameters,
    seed: u64,
    rng: &mut StdRng,
) -> PipelineResult<TrainingMetrics> {
    let n = data.x.nrows();
    let mut order: Vec<usize> = (0..n).collect();

    let mut loss_history = Vec::with_capacity(hp.epochs);
    let mut iterations = 0usize;
    let mut best_loss = f64::INFINITY;
    let mut stale_epochs = 0usize;
    let mut warnings = Vec::new();
    let mut stopped_early = false;

    for epoch in 1..=hp.epochs {
        order.shuffle(rng);
        let budget = hp.max_iterations.map(|max| max.saturating_sub(iterations));
        let (loss, steps) = run_epoch(model, data, &order, hp, budget)?;
        iterations += steps;

        if !loss.is_finite() {
            return Err(PipelineError::Training(format!(
                "loss became {} at epoch {}",
                loss, epoch
            )));
        }
        loss_history.push(loss);
        log::debug!("epoch {} loss {:.6}", epoch, loss);

        if loss < best_loss - hp.min_delta {
            best_loss = loss;
            stale_epochs = 0;
        } else {
            best_loss = best_loss.min(loss);
            stale_epochs += 1;
        }

        if hp.patience > 0 && stale_epochs >= hp.patience {
            let warning = ConvergenceWarning {
                epoch,
                best_loss,
                patience: hp.patience,
                message: format!(
                    "loss did not improve by {} for {} epochs",
                    hp.min_delta, hp.patience
                ),
            };
            log::warn!("Early stop at epoch {}: {}", epoch, warning.message);
            warnings.push(warning);
            stopped_early = true;
            break;
        }

        if hp.max_iterations.is_some_and(|max| iterations >= max) {
            log::info!("Iteration budget of {} reached at epoch {}", iterations, epoch);
            break;
        }
    }

    Ok(TrainingMetrics {
        seed,
        samples: n,
        epochs_run: loss_history.len(),
        iterations,
        final_loss: loss_history.last().copied().unwrap_or(f64::NAN),
        best_loss,
        loss_history,
        stopped_early,
        warnings,
    })
}

/// One pass over `order`; returns the sample-weighted mean batch loss and
/// the number of steps taken
fn run_epoch<M: Objective>(
    model: &mut M,
    data: &TrainingData,
    order: &[usize],
    hp: &Hyperparameters,
    budget: Option<usize>,
) -> PipelineResult<(f64, usize)> {
    let batch_size = hp.batch_size;

    thread::scope(|scope| {
        let (tx, rx) = mpsc::sync_channel::<Batch>(BATCH_QUEUE_DEPTH);

        scope.spawn(move || {
            for indices in order.chunks(batch_size) {
                if tx.send(data.gather(indices)).is_err() {
                    break;
                }
            }
        });

        let mut total = 0.0;
        let mut seen = 0usize;
        let mut steps = 0usize;
        for batch in rx.iter() {
            if budget.is_some_and(|b| steps >= b) {
                break;
            }
            let rows = batch.x.nrows();
            let loss = model.step(batch.x.view(), batch.y.view(), hp.learning_rate, hp.l2);
            if !loss.is_finite() {
                return Err(PipelineError::Training(format!(
                    "non-finite batch loss after {} steps",
                    steps
                )));
            }
            total += loss * rows as f64;
            seen += rows;
            steps += 1;
        }

        if seen == 0 {
            return Ok((f64::NAN, 0));
        }
        Ok((total / seen as f64, steps))
    })
}
