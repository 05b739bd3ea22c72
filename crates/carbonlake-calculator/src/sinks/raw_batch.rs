use async_trait::async_trait;
use carbonlake_common::types::EnrichedEvent;
use std::sync::Arc;
use tracing::{info, instrument};

use super::{SinkKind, SinkReceipt, SinkWriter};
use crate::error::{CalculatorError, Result};
use crate::storage::ObjectStore;

/// Key prefix of enriched batches in the output bucket
pub const OUTPUT_PREFIX: &str = "today";

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Writes the enriched batch as NDJSON under `today/<source_key>`
pub struct RawBatchWriter {
    store: Arc<dyn ObjectStore>,
}

impl RawBatchWriter {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn output_key(source_key: &str) -> String {
        format!("{}/{}", OUTPUT_PREFIX, source_key)
    }
}

/// One JSON object per line, no trailing newline
pub fn to_ndjson(events: &[EnrichedEvent]) -> Result<String> {
    let lines = events
        .iter()
        .map(serde_json::to_string)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(lines.join("\n"))
}

#[async_trait]
impl SinkWriter for RawBatchWriter {
    fn kind(&self) -> SinkKind {
        SinkKind::RawBatch
    }

    #[instrument(skip(self, events), fields(bucket = %self.store.bucket(), events = events.len()))]
    async fn write_batch(&self, source_key: &str, events: &[EnrichedEvent]) -> Result<SinkReceipt> {
        let body = to_ndjson(events)?;
        let key = Self::output_key(source_key);

        let upload = self
            .store
            .put(&key, body.into_bytes(), Some(NDJSON_CONTENT_TYPE))
            .await
            .map_err(|e| CalculatorError::sink(self.kind(), e))?;

        info!(location = %upload.location, checksum = %upload.checksum, "Wrote enriched batch");

        Ok(SinkReceipt {
            sink: self.kind(),
            rows_written: events.len(),
            location: Some(upload.location),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStore;
    use carbonlake_common::types::{
        ActivityEvent, CalculatedEmissions, EmissionsOutput, Quantity,
    };
    use serde_json::json;

    fn enriched(id: &str) -> EnrichedEvent {
        let event: ActivityEvent = serde_json::from_value(json!({
            "activity_event_id": id,
            "scope": 2,
            "category": "grid-region-location-based",
            "activity": "Quebec",
            "raw_data": 453,
            "units": "kwH"
        }))
        .unwrap();

        EnrichedEvent {
            event,
            emissions_output: EmissionsOutput {
                calculated_emissions: CalculatedEmissions {
                    co2: Quantity::tonnes(0.0005436),
                    ch4: Quantity::tonnes(0.0),
                    n2o: Quantity::tonnes(0.0),
                    co2e: Quantity::tonnes(0.0005436),
                },
                emissions_factor: Quantity::kg_co2e_per_unit(0.0012),
            },
        }
    }

    #[tokio::test]
    async fn test_writes_ndjson_under_today() {
        let store = Arc::new(MemoryObjectStore::new("enriched"));
        let writer = RawBatchWriter::new(store.clone());

        let receipt = writer
            .write_batch(
                "scope2-bill-extracted-data/bill.json",
                &[enriched("a"), enriched("b")],
            )
            .await
            .unwrap();

        assert_eq!(receipt.rows_written, 2);
        assert_eq!(
            receipt.location.as_deref(),
            Some("memory://enriched/today/scope2-bill-extracted-data/bill.json")
        );

        let body = store
            .get_string("today/scope2-bill-extracted-data/bill.json")
            .await
            .unwrap();
        let lines: Vec<_> = body.split('\n').collect();
        assert_eq!(lines.len(), 2);
        assert!(!body.ends_with('\n'));

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["activity_event_id"], json!("a"));
        assert_eq!(
            first["emissions_output"]["emissions_factor"]["unit"],
            json!("kgCO2e/unit")
        );
    }

    #[tokio::test]
    async fn test_empty_batch_writes_empty_object() {
        let store = Arc::new(MemoryObjectStore::new("enriched"));
        let writer = RawBatchWriter::new(store.clone());

        let receipt = writer.write_batch("scope1-cleansed-data/empty.json", &[]).await.unwrap();

        assert_eq!(receipt.rows_written, 0);
        assert_eq!(
            store.get_string("today/scope1-cleansed-data/empty.json").await.as_deref(),
            Some("")
        );
    }
}
