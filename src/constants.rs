//! Central Configuration Constants
//!
//! Single source of truth for pipeline defaults, storage layout names and
//! the environment variables consulted by `PipelineConfig::from_env`.

/// Default random seed used when neither config nor hyperparameters set one
pub const DEFAULT_SEED: u64 = 42;

/// Default number of extraction workers
pub const DEFAULT_WORKERS: usize = 4;

/// Directory name under the platform data dir when no root is configured
pub const DEFAULT_ROOT_DIR_NAME: &str = "watermark-core";

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "watermark-core";

// ============================================
// Environment variables
// ============================================

pub const ENV_STORAGE_ROOT: &str = "WATERMARK_STORAGE_ROOT";
pub const ENV_SEED: &str = "WATERMARK_SEED";
pub const ENV_DEVICE: &str = "WATERMARK_DEVICE";
pub const ENV_WORKERS: &str = "WATERMARK_WORKERS";

// ============================================
// Persisted layout
// ============================================

pub const DATASETS_DIR: &str = "datasets";
pub const FEATURES_DIR: &str = "features";
pub const MODELS_DIR: &str = "models";
pub const REPORTS_DIR: &str = "reports";
pub const REGISTRY_DIR: &str = "registry";

/// Manifest file written next to every artifact
pub const MANIFEST_FILE: &str = "manifest.json";
pub const RECORDS_FILE: &str = "records.jsonl";
pub const FEATURES_FILE: &str = "features.jsonl";
pub const MODEL_FILE: &str = "model.json";
pub const REPORT_FILE: &str = "report.json";

/// Number of hex characters kept from a sha256 digest in artifact ids
pub const ID_HEX_LEN: usize = 16;
