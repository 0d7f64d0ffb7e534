//! Registry Module - provenance of registered models
//!
//! A model can only serve predictions once its full chain (dataset,
//! feature set, model, report) is registered and still resolves.

pub mod entry;
pub mod store;


pub use entry::{ProvenanceChain, RegistryEntry};
pub use store::Registry;
