//! Evaluation Module - scoring models against versioned inputs
//!
//! A model only scores inputs produced by its own transformation version,
//! or by one explicitly declared compatible.

pub mod evaluator;
pub mod report;
pub mod store;


pub use evaluator::{evaluate, predict, Evaluation};
pub use report::{
    ClassificationMetrics, EvaluationReport, GeneratorMetrics, Metrics, Prediction,
    RecordPrediction, RegressionMetrics, ReportManifest, SkipCounts,
};
pub use store::ReportStore;
