//! Watermark Core - data-to-model pipeline for watermark research
//!
//! Dataset versioning, feature extraction, model training, evaluation and
//! the provenance registry. An external orchestrator drives the stages
//! through `api::execute`.

pub mod api;
pub mod constants;
pub mod logic;

pub use api::{execute, init, init_logging, Command, CommandOutcome};
pub use logic::config::{ComputeDevice, PipelineConfig};
pub use logic::error::{ConvergenceWarning, ErrorKind, PipelineError, PipelineResult};
