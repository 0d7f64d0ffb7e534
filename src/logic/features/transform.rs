//! Transform Spec - versioned definition of the feature transformation
//!
//! ## Rules
//! 1. Change how any field is applied → increment ALGORITHM_VERSION
//! 2. Add a shape-affecting field → include it in `version_hash`
//!
//! The transformation version is what models are pinned to. Two feature
//! sets with the same version have the same layout and the same meaning,
//! no matter which dataset they came from.

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use crate::logic::error::{PipelineError, PipelineResult};

// ============================================================================
// ALGORITHM VERSION
// ============================================================================

/// Version of the extraction algorithm itself
/// MUST be incremented when series building, windowing or channel
/// derivation changes
pub const ALGORITHM_VERSION: u8 = 1;

/// Derived channels: base series plus up to 3 orders of differences
pub const MAX_CHANNELS: usize = 4;

pub const DEFAULT_CROP: usize = 128;

/// Longest window accepted
pub const MAX_CROP: usize = 1 << 20;

/// Canvas edge used when rasterizing strokes
pub const DEFAULT_RASTER_SIZE: usize = 224;

/// Largest canvas edge; one canvas is allocated per stroke
pub const MAX_RASTER_SIZE: usize = 4096;

// ============================================================================
// TRANSFORM SPEC
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformSpec {
    /// Min-max rescale each channel to [0, 1]
    #[serde(default = "default_normalize")]
    pub normalize: bool,

    /// Fixed window length
    #[serde(default = "default_crop")]
    pub crop: usize,

    /// Add one jittered copy per entry (training only)
    #[serde(default)]
    pub augment: bool,

    #[serde(default = "default_channels")]
    pub channels: usize,

    /// Cut long series into every full window at this step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stride: Option<usize>,

    #[serde(default = "default_raster_size")]
    pub raster_size: usize,
}

fn default_normalize() -> bool {
    true
}

fn default_crop() -> usize {
    DEFAULT_CROP
}

fn default_channels() -> usize {
    1
}

fn default_raster_size() -> usize {
    DEFAULT_RASTER_SIZE
}

impl Default for TransformSpec {
    fn default() -> Self {
        Self {
            normalize: default_normalize(),
            crop: DEFAULT_CROP,
            augment: false,
            channels: default_channels(),
            stride: None,
            raster_size: DEFAULT_RASTER_SIZE,
        }
    }
}

impl TransformSpec {
    pub fn new(crop: usize) -> Self {
        Self {
            crop,
            ..Self::default()
        }
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = Some(stride);
        self
    }

    pub fn with_augment(mut self, augment: bool) -> Self {
        self.augment = augment;
        self
    }

    pub fn with_raster_size(mut self, raster_size: usize) -> Self {
        self.raster_size = raster_size;
        self
    }

    pub fn validate(&self) -> PipelineResult<()> {
        let fail = |reason: String| {
            Err(PipelineError::FeatureShape {
                record_id: None,
                reason,
            })
        };

        if self.crop == 0 || self.crop > MAX_CROP {
            return fail(format!("crop must be in 1..={}, got {}", MAX_CROP, self.crop));
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return fail(format!(
                "channels must be in 1..={}, got {}",
                MAX_CHANNELS, self.channels
            ));
        }
        if self.stride == Some(0) {
            return fail("stride must be positive".to_string());
        }
        if !(2..=MAX_RASTER_SIZE).contains(&self.raster_size) {
            return fail(format!(
                "raster_size must be in 2..={}, got {}",
                MAX_RASTER_SIZE, self.raster_size
            ));
        }
        Ok(())
    }

    /// `[channels, crop]`
    pub fn shape(&self) -> [usize; 2] {
        [self.channels, self.crop]
    }

    /// Length of the flattened feature vector
    pub fn feature_dim(&self) -> usize {
        self.channels * self.crop
    }

    // ========================================================================
    // VERSION HASH
    // ========================================================================

    /// CRC32 over the algorithm version and every shape-affecting field.
    /// `augment` is excluded since it adds entries without changing layout.
    pub fn version_hash(&self) -> u32 {
        let mut hasher = Hasher::new();
        hasher.update(&[ALGORITHM_VERSION]);

        let mut field = |name: &str, value: u64| {
            hasher.update(name.as_bytes());
            hasher.update(&[0]);
            hasher.update(&value.to_le_bytes());
        };
        field("normalize", self.normalize as u64);
        field("crop", self.crop as u64);
        field("channels", self.channels as u64);
        field("stride", self.stride.unwrap_or(0) as u64);
        field("raster_size", self.raster_size as u64);

        hasher.finalize()
    }

    /// e.g. `tf1-5a3c09e1`
    pub fn transform_version(&self) -> String {
        format!("tf{}-{:08x}", ALGORITHM_VERSION, self.version_hash())
    }
}

// ============================================================================
// COMPATIBILITY
// ============================================================================

/// Transformation versions a model accepts in addition to its own
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compatibility {
    #[serde(default)]
    pub accepted: Vec<String>,
}

impl Compatibility {
    /// Only the model's own transformation version
    pub fn strict() -> Self {
        Self::default()
    }

    pub fn allow(mut self, transform_version: impl Into<String>) -> Self {
        self.accepted.push(transform_version.into());
        self
    }

    /// Fails with `ProvenanceMismatch` unless `actual` is the model's own
    /// version or declared compatible.
    pub fn check(&self, expected: &str, actual: &str) -> PipelineResult<()> {
        if expected == actual || self.accepted.iter().any(|v| v == actual) {
            return Ok(());
        }
        Err(PipelineError::ProvenanceMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}
