use serde::{Deserialize, Serialize};

/// One signature sample as ingested. Immutable once stored.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub id: String,

    pub payload: Payload,

    // Ground truth (optional: unlabeled samples are allowed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<Label>,
}

/// Source payload, tagged by `kind` so every line declares its schema
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    /// 1-D signal samples
    Signal { samples: Vec<f32> },

    /// Pen trajectory of a handwritten signature
    Stroke { x: Vec<f32>, y: Vec<f32> },

    /// Row-major grayscale image
    Image {
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Signal,
    Stroke,
    Image,
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Signal { .. } => PayloadKind::Signal,
            Payload::Stroke { .. } => PayloadKind::Stroke,
            Payload::Image { .. } => PayloadKind::Image,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Label {
    pub watermarked: bool,

    /// Embedded timestamp (unix seconds), for the regression variant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl Label {
    pub fn watermarked(watermarked: bool) -> Self {
        Self {
            watermarked,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

impl RawRecord {
    pub fn new(id: impl Into<String>, payload: Payload, label: Option<Label>) -> Self {
        Self {
            id: id.into(),
            payload,
            label,
        }
    }

    /// Schema-level checks applied at ingestion. Payload shape is checked
    /// later by the feature extractor, but every stored value must be finite
    /// since JSON cannot carry `inf` or `NaN` back out of the store.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("record id is empty".to_string());
        }
        let non_finite = |field: &str, values: &[f32]| {
            values
                .iter()
                .position(|v| !v.is_finite())
                .map(|i| format!("record {}: {}[{}] is not a finite f32", self.id, field, i))
        };
        let problem = match &self.payload {
            Payload::Signal { samples } => non_finite("samples", samples),
            Payload::Stroke { x, y } => non_finite("x", x).or_else(|| non_finite("y", y)),
            Payload::Image { .. } => None,
        };
        match problem {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }
}
