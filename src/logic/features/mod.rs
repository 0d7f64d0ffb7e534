//! Features Module - versioned feature extraction
//!
//! Turns the records of one dataset version into fixed-shape tensors
//! (`[channels × crop]`, flattened). The transformation is identified by a
//! version string so models can refuse inputs produced any other way.

pub mod series;
pub mod store;
pub mod transform;
pub mod vector;


pub use store::FeatureStore;
pub use transform::{Compatibility, TransformSpec, ALGORITHM_VERSION};
pub use vector::{Exclusion, FeatureEntry, FeatureSet, FeatureSetManifest, FeatureVector};
