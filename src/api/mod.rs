//! API Module
//!
//! Organized with versioning for backward compatibility.
//!
//! Structure:
//! - commands.rs: Current stable command surface
//! - v1/mod.rs: Re-exports commands as v1 API
//!
//! Usage:
//! - `api::commands::execute(&cfg, command)` - Direct access
//! - `api::v1::execute(&cfg, command)` - Version 1 API

pub mod commands;
pub mod v1;


// Re-export current version as default
pub use commands::*;

use crate::constants::{APP_NAME, APP_VERSION};
use crate::logic::config::PipelineConfig;

/// Install the `env_logger` backend (`RUST_LOG` overrides the `info` default).
/// Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

/// Load `.env`, start logging and build the configuration from the environment
pub fn init() -> PipelineConfig {
    dotenvy::dotenv().ok();
    init_logging();

    let cfg = PipelineConfig::from_env();
    log::info!(
        "{} v{} (storage root {}, seed {}, {} workers, device {:?})",
        APP_NAME,
        APP_VERSION,
        cfg.root().display(),
        cfg.seed,
        cfg.workers,
        cfg.device.resolve()
    );
    cfg
}
