//! Logic Module - pipeline stages and their stores
//!
//! Control flow, each stage consuming the previous stage's versioned output:
//!
//! - `dataset/` - raw record ingestion, immutable dataset versions, splits
//! - `features/` - versioned feature extraction
//! - `model/` - generator / detector / timestamp regressor training
//! - `evaluation/` - reports and single-vector prediction
//! - `registry/` - provenance chains of registered models

// Shared infrastructure
pub mod config;
pub mod error;
pub mod storage;

// Pipeline stages
pub mod dataset;
pub mod features;
pub mod model;
pub mod evaluation;
pub mod registry;

#[cfg(test)]
mod testutil;
