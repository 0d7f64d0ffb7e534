//! Model Module - training and storage of watermark models
//!
//! Three roles share one pipeline: a generator that embeds a watermark
//! pattern, a detector that classifies watermarked inputs and a regressor
//! that estimates the embedded timestamp. The shipped models are small
//! linear references; any model honouring `ModelParams` can replace them.

pub mod store;
pub mod trainer;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export common types
pub use store::ModelStore;
pub use types::{
    Hyperparameters, ModelArtifact, ModelManifest, ModelParams, Role, TrainingMetrics,
};
