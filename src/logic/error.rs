//! Pipeline Errors - classified failure kinds shared by every stage
//!
//! Data-shape and provenance errors abort the current stage and surface
//! classified to the caller. Non-fatal conditions (excluded records, early
//! stop) are recorded in manifests/metrics instead, see `ConvergenceWarning`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Ingest error: {0}")]
    Ingest(String),

    #[error("Version conflict: {kind} {id} already exists")]
    VersionConflict { kind: &'static str, id: String },

    #[error("Feature shape error{}: {reason}", record_suffix(.record_id))]
    FeatureShape {
        record_id: Option<String>,
        reason: String,
    },

    #[error("Training error: {0}")]
    Training(String),

    #[error("Provenance mismatch: model expects transform {expected}, input uses {actual}")]
    ProvenanceMismatch { expected: String, actual: String },

    #[error("Broken provenance for {model_id}: {kind} {id} {reason}")]
    BrokenProvenance {
        model_id: String,
        kind: &'static str,
        id: String,
        reason: String,
    },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn record_suffix(record_id: &Option<String>) -> String {
    match record_id {
        Some(id) => format!(" in record {}", id),
        None => String::new(),
    }
}

impl PipelineError {
    pub fn shape(record_id: &str, reason: impl Into<String>) -> Self {
        PipelineError::FeatureShape {
            record_id: Some(record_id.to_string()),
            reason: reason.into(),
        }
    }

    pub fn broken(model_id: &str, kind: &'static str, id: &str, reason: impl Into<String>) -> Self {
        PipelineError::BrokenProvenance {
            model_id: model_id.to_string(),
            kind,
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: &str) -> Self {
        PipelineError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Ingest(_) => ErrorKind::Ingest,
            PipelineError::VersionConflict { .. } => ErrorKind::VersionConflict,
            PipelineError::FeatureShape { .. } => ErrorKind::FeatureShape,
            PipelineError::Training(_) => ErrorKind::Training,
            PipelineError::ProvenanceMismatch { .. } => ErrorKind::ProvenanceMismatch,
            PipelineError::BrokenProvenance { .. } => ErrorKind::BrokenProvenance,
            PipelineError::NotFound { .. } => ErrorKind::NotFound,
            PipelineError::Io(_) => ErrorKind::Io,
            PipelineError::Serialization(_) => ErrorKind::Serialization,
        }
    }
}

// ============================================================================
// ERROR KIND (exit status classification)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Ingest,
    VersionConflict,
    FeatureShape,
    Training,
    ProvenanceMismatch,
    BrokenProvenance,
    NotFound,
    Io,
    Serialization,
}

impl ErrorKind {
    /// Process exit status reported to the orchestrator (0 is success)
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::Ingest => 10,
            ErrorKind::VersionConflict => 11,
            ErrorKind::FeatureShape => 20,
            ErrorKind::Training => 30,
            ErrorKind::ProvenanceMismatch => 40,
            ErrorKind::BrokenProvenance => 41,
            ErrorKind::NotFound => 50,
            ErrorKind::Io => 60,
            ErrorKind::Serialization => 61,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Ingest => "IngestError",
            ErrorKind::VersionConflict => "VersionConflictError",
            ErrorKind::FeatureShape => "FeatureShapeError",
            ErrorKind::Training => "TrainingError",
            ErrorKind::ProvenanceMismatch => "ProvenanceMismatchError",
            ErrorKind::BrokenProvenance => "BrokenProvenanceError",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::Io => "IoError",
            ErrorKind::Serialization => "SerializationError",
        }
    }
}

// ============================================================================
// NON-FATAL WARNINGS
// ============================================================================

/// Loss stopped improving within the patience window; recorded in metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceWarning {
    pub epoch: usize,
    pub best_loss: f64,
    pub patience: usize,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_and_non_zero() {
        let kinds = [
            ErrorKind::Ingest,
            ErrorKind::VersionConflict,
            ErrorKind::FeatureShape,
            ErrorKind::Training,
            ErrorKind::ProvenanceMismatch,
            ErrorKind::BrokenProvenance,
            ErrorKind::NotFound,
            ErrorKind::Io,
            ErrorKind::Serialization,
        ];
        let mut codes: Vec<i32> = kinds.iter().map(|k| k.exit_code()).collect();
        assert!(codes.iter().all(|c| *c != 0));
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn test_shape_error_message_names_record() {
        let err = PipelineError::shape("sig-3", "empty signal");
        assert_eq!(err.kind(), ErrorKind::FeatureShape);
        assert_eq!(
            err.to_string(),
            "Feature shape error in record sig-3: empty signal"
        );
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PipelineError = io.into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
