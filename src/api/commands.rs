//! Pipeline Commands - invocation surface for the external orchestrator
//!
//! Every stage is one `Command` carrying its request. `execute` runs it
//! against a `PipelineConfig` and reports a JSON output plus an exit code
//! (0 on success, the error kind's code otherwise).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::logic::config::PipelineConfig;
use crate::logic::dataset::{DatasetStore, IngestSource};
use crate::logic::error::PipelineResult;
use crate::logic::evaluation::{self, ReportStore};
use crate::logic::features::{Compatibility, FeatureStore, FeatureVector, TransformSpec};
use crate::logic::model::{Hyperparameters, ModelStore, Role};
use crate::logic::registry::Registry;

// ============================================================================
// REQUESTS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitRequest {
    pub dataset_id: String,
    pub holdout_ratio: f64,

    /// Defaults to the pipeline seed
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractRequest {
    pub dataset_id: String,
    #[serde(default)]
    pub transform: TransformSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainRequest {
    pub feature_set_id: String,
    pub role: Role,
    #[serde(default)]
    pub hyperparameters: Hyperparameters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateRequest {
    pub model_id: String,
    pub feature_set_id: String,
    #[serde(default)]
    pub compatibility: Compatibility,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub dataset_id: String,
    pub feature_set_id: String,
    pub model_id: String,
    pub report_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub model_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub model_id: String,
    pub input: FeatureVector,
    #[serde(default)]
    pub compatibility: Compatibility,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Ingest(IngestSource),
    Split(SplitRequest),
    Extract(ExtractRequest),
    Train(TrainRequest),
    Evaluate(EvaluateRequest),
    Register(RegisterRequest),
    Resolve(ResolveRequest),
    Predict(PredictRequest),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ingest(_) => "ingest",
            Command::Split(_) => "split",
            Command::Extract(_) => "extract",
            Command::Train(_) => "train",
            Command::Evaluate(_) => "evaluate",
            Command::Register(_) => "register",
            Command::Resolve(_) => "resolve",
            Command::Predict(_) => "predict",
        }
    }
}

// ============================================================================
// OUTCOME
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub exit_code: i32,

    /// e.g. `ProvenanceMismatchError`; absent on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,

    pub output: Value,
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

// ============================================================================
// EXECUTE
// ============================================================================

/// Run one pipeline stage. Never panics on pipeline errors: failures come
/// back classified in the outcome.
pub fn execute(cfg: &PipelineConfig, command: Command) -> CommandOutcome {
    let name = command.name();
    log::info!("Executing {} (storage root {})", name, cfg.root().display());

    match run(cfg, command) {
        Ok(output) => CommandOutcome {
            exit_code: 0,
            error_kind: None,
            output,
        },
        Err(e) => {
            let kind = e.kind();
            log::error!("{} failed ({}): {}", name, kind.as_str(), e);
            CommandOutcome {
                exit_code: kind.exit_code(),
                error_kind: Some(kind.as_str().to_string()),
                output: serde_json::json!({ "error": e.to_string() }),
            }
        }
    }
}

fn run(cfg: &PipelineConfig, command: Command) -> PipelineResult<Value> {
    let output = match command {
        Command::Ingest(source) => serde_json::to_value(DatasetStore::new(cfg).ingest(&source)?)?,

        Command::Split(req) => {
            let seed = req.seed.unwrap_or(cfg.seed);
            let (train, holdout) =
                DatasetStore::new(cfg).split(&req.dataset_id, req.holdout_ratio, seed)?;
            serde_json::json!({ "train": train, "holdout": holdout })
        }

        Command::Extract(req) => {
            let set = FeatureStore::new(cfg).extract(&req.dataset_id, &req.transform)?;
            serde_json::to_value(&set.manifest)?
        }

        Command::Train(req) => {
            let set = FeatureStore::new(cfg).load(&req.feature_set_id)?;
            let model = ModelStore::new(cfg).train(&set, req.role, &req.hyperparameters)?;
            serde_json::to_value(model)?
        }

        Command::Evaluate(req) => {
            let model = ModelStore::new(cfg).load(&req.model_id)?;
            let set = FeatureStore::new(cfg).load(&req.feature_set_id)?;
            let report = ReportStore::new(cfg).evaluate(&model, &set, &req.compatibility)?;
            serde_json::to_value(report)?
        }

        Command::Register(req) => {
            let entry = Registry::new(cfg).register(
                &req.dataset_id,
                &req.feature_set_id,
                &req.model_id,
                &req.report_id,
            )?;
            serde_json::to_value(entry)?
        }

        Command::Resolve(req) => serde_json::to_value(Registry::new(cfg).resolve(&req.model_id)?)?,

        Command::Predict(req) => {
            // Only registered models with an intact chain may serve predictions
            Registry::new(cfg).resolve(&req.model_id)?;
            let model = ModelStore::new(cfg).load(&req.model_id)?;
            let prediction = evaluation::predict(&model, &req.input, &req.compatibility)?;
            serde_json::json!({ "model_id": model.id, "prediction": prediction })
        }
    };
    Ok(output)
}
