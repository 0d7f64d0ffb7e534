//! Dataset Module - raw signature data ingestion and versioning
//!
//! Raw records are validated against the tagged payload schema at ingestion
//! and stored as immutable, content-addressed versions. Derived versions
//! (train/holdout splits) point back at their parent.

pub mod manifest;
pub mod record;
pub mod store;

#[cfg(test)]
mod tests;

pub use manifest::{DatasetSource, DatasetSummary, DatasetVersion, Partition};
pub use record::{Label, Payload, PayloadKind, RawRecord};
pub use store::{DatasetStore, IngestSource, RecordStream};
