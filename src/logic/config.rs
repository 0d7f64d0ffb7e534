//! Pipeline Configuration
//!
//! Explicit configuration object passed into every stage. Nothing here is
//! process-wide state: two configs with different roots never interact.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{
    DATASETS_DIR, DEFAULT_ROOT_DIR_NAME, DEFAULT_SEED, DEFAULT_WORKERS, ENV_DEVICE, ENV_SEED,
    ENV_STORAGE_ROOT, ENV_WORKERS, FEATURES_DIR, MODELS_DIR, REGISTRY_DIR, REPORTS_DIR,
};

/// Compute preference. Only CPU kernels ship today; `Auto` resolves to CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ComputeDevice {
    #[default]
    Cpu,
    Auto,
}

impl ComputeDevice {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "cpu" => Some(ComputeDevice::Cpu),
            "auto" => Some(ComputeDevice::Auto),
            _ => None,
        }
    }

    pub fn resolve(&self) -> ComputeDevice {
        ComputeDevice::Cpu
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root directory holding every versioned artifact
    pub storage_root: PathBuf,

    /// Seed for shuffling, augmentation and initialisation
    pub seed: u64,

    pub device: ComputeDevice,

    /// Worker threads used by per-record feature extraction
    pub workers: usize,
}

impl PipelineConfig {
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            seed: DEFAULT_SEED,
            device: ComputeDevice::default(),
            workers: DEFAULT_WORKERS,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let storage_root = env::var(ENV_STORAGE_ROOT)
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_storage_root());

        let seed = env::var(ENV_SEED)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SEED);

        let device = env::var(ENV_DEVICE)
            .ok()
            .and_then(|d| ComputeDevice::parse(&d))
            .unwrap_or_default();

        let workers = env::var(ENV_WORKERS)
            .ok()
            .and_then(|w| w.parse().ok())
            .filter(|w: &usize| *w > 0)
            .unwrap_or(DEFAULT_WORKERS);

        Self {
            storage_root,
            seed,
            device,
            workers,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.storage_root
    }

    pub fn datasets_dir(&self) -> PathBuf {
        self.storage_root.join(DATASETS_DIR)
    }

    pub fn features_dir(&self) -> PathBuf {
        self.storage_root.join(FEATURES_DIR)
    }

    pub fn models_dir(&self) -> PathBuf {
        self.storage_root.join(MODELS_DIR)
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.storage_root.join(REPORTS_DIR)
    }

    pub fn registry_dir(&self) -> PathBuf {
        self.storage_root.join(REGISTRY_DIR)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(default_storage_root())
    }
}

/// Get the default storage root
pub fn default_storage_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_ROOT_DIR_NAME)
}
