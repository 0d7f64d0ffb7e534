//! API v1 Module
//!
//! Re-exports the current stable pipeline commands for versioning.

pub use super::commands::*;
