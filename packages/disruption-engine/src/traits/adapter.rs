//! Adapter trait for external incident datasets.
//!
//! Each third-party dataset gets one adapter that knows its foreign schema.
//! The validation core only ever sees the canonical [`ExternalRecord`], so
//! new datasets are added without touching matching.

use async_trait::async_trait;

use crate::adapters::mapping::MappingTable;
use crate::error::{NormalizeResult, Result};
use crate::types::external::{DateRange, ExternalRecord, RawRecord};

/// Capability set {fetch, normalize} over one dataset.
#[async_trait]
pub trait DatasetAdapter: Send + Sync {
    /// Dataset name, used in matches, reports and threshold overrides.
    fn name(&self) -> &str;

    /// Pull raw rows overlapping the window.
    ///
    /// I/O boundary. Fails with [`crate::EngineError::SourceUnavailable`]
    /// when the dataset cannot be reached; the validator then skips the
    /// dataset for the run.
    async fn fetch(&self, range: &DateRange) -> Result<Vec<RawRecord>>;

    /// Map one raw row into canonical form.
    ///
    /// Foreign types missing from [`DatasetAdapter::mapping`] become
    /// `EventType::Unknown`, never an error. Errors mean the row itself is
    /// malformed and it is skipped.
    fn normalize(&self, raw: &RawRecord) -> NormalizeResult<ExternalRecord>;

    /// The foreign-to-canonical type table.
    fn mapping(&self) -> &MappingTable;

    /// Best-effort identifier of a raw row, for skip logs.
    fn raw_id(&self, raw: &RawRecord) -> String {
        raw.identifier(&["id", "event_id"])
    }
}
