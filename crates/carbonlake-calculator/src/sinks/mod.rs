//! Downstream writers for enriched batches
//!
//! Every configured sink receives the complete enriched batch. Writers do not
//! retry; a failure surfaces as `SinkUnavailable` naming the sink.

use async_trait::async_trait;
use carbonlake_common::types::EnrichedEvent;
use serde::Serialize;
use std::str::FromStr;

use crate::error::{CalculatorError, Result};

pub mod analytics;
pub mod raw_batch;
pub mod row_store;

pub use analytics::{AnalyticsMode, AnalyticsRow, AnalyticsWriter};
pub use raw_batch::RawBatchWriter;
pub use row_store::{InMemoryRowStore, OutputRow, PgRowStore, RowStore, RowStoreWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// Enriched NDJSON back to object storage
    RawBatch,
    /// One row per event keyed by id
    RowStore,
    /// Relational analytics table
    Analytics,
}

impl SinkKind {
    pub const ALL: [SinkKind; 3] = [SinkKind::RawBatch, SinkKind::RowStore, SinkKind::Analytics];

    pub fn as_str(&self) -> &'static str {
        match self {
            SinkKind::RawBatch => "raw",
            SinkKind::RowStore => "rows",
            SinkKind::Analytics => "analytics",
        }
    }
}

impl FromStr for SinkKind {
    type Err = CalculatorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "raw" | "raw_batch" => Ok(SinkKind::RawBatch),
            "rows" | "row_store" => Ok(SinkKind::RowStore),
            "analytics" => Ok(SinkKind::Analytics),
            other => Err(CalculatorError::Config(format!("Unknown sink: {}", other))),
        }
    }
}

impl std::fmt::Display for SinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Acknowledgement of a completed sink write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkReceipt {
    pub sink: SinkKind,
    pub rows_written: usize,
    /// Where the data landed, for sinks that produce an addressable object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[async_trait]
pub trait SinkWriter: Send + Sync {
    fn kind(&self) -> SinkKind;

    /// Persist one enriched batch read from `source_key`
    async fn write_batch(&self, source_key: &str, events: &[EnrichedEvent]) -> Result<SinkReceipt>;
}
