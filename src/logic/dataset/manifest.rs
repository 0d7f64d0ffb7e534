use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::{PayloadKind, RawRecord};

/// Manifest schema version
pub const DATASET_FORMAT_VERSION: u8 = 1;

/// Where a dataset version came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DatasetSource {
    File { path: String },
    Derived { parent: String, partition: Partition },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    Train,
    Holdout,
}

/// Label distribution and payload mix of a dataset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub watermarked: u64,
    pub unmarked: u64,
    pub unlabeled: u64,
    pub timestamped: u64,
    pub signals: u64,
    pub strokes: u64,
    pub images: u64,
}

impl DatasetSummary {
    pub fn from_records(records: &[RawRecord]) -> Self {
        let mut summary = Self::default();
        for record in records {
            match record.label {
                Some(label) => {
                    if label.watermarked {
                        summary.watermarked += 1;
                    } else {
                        summary.unmarked += 1;
                    }
                    if label.timestamp.is_some() {
                        summary.timestamped += 1;
                    }
                }
                None => summary.unlabeled += 1,
            }
            match record.payload.kind() {
                PayloadKind::Signal => summary.signals += 1,
                PayloadKind::Stroke => summary.strokes += 1,
                PayloadKind::Image => summary.images += 1,
            }
        }
        summary
    }
}

/// Immutable, content-addressed dataset snapshot (the stored manifest)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetVersion {
    pub format_version: u8,
    pub id: String,
    pub name: String,
    pub source: DatasetSource,
    pub record_count: u64,

    /// sha256 of the stored records file
    pub checksum: String,

    pub summary: DatasetSummary,
    pub created_at: DateTime<Utc>,
}
