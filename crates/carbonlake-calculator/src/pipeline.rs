//! Run orchestration
//!
//! One run lists the source batches, then for each batch reads, enriches and
//! hands the result to every sink in order. The first failure ends the run;
//! writes already completed are kept.

use futures::{stream, StreamExt, TryStreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::enricher::{EventEnricher, SkippedEvent};
use crate::error::Result;
use crate::factors::CacheStats;
use crate::scanner::IngestionScanner;
use crate::sinks::{SinkReceipt, SinkWriter};

/// Result of one source batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub source_key: String,
    pub events_read: usize,
    pub events_enriched: usize,
    pub skipped: Vec<SkippedEvent>,
    pub receipts: Vec<SinkReceipt>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub batches: Vec<BatchOutcome>,
    pub cache: CacheStats,
}

impl RunSummary {
    pub fn events_enriched(&self) -> usize {
        self.batches.iter().map(|b| b.events_enriched).sum()
    }

    pub fn events_skipped(&self) -> usize {
        self.batches.iter().map(|b| b.skipped.len()).sum()
    }
}

pub struct CalculatorPipeline {
    scanner: IngestionScanner,
    enricher: EventEnricher,
    sinks: Vec<Arc<dyn SinkWriter>>,
    max_concurrent_batches: usize,
}

impl CalculatorPipeline {
    pub fn new(scanner: IngestionScanner, enricher: EventEnricher) -> Self {
        Self {
            scanner,
            enricher,
            sinks: Vec::new(),
            max_concurrent_batches: 1,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn SinkWriter>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_sinks(mut self, sinks: impl IntoIterator<Item = Arc<dyn SinkWriter>>) -> Self {
        self.sinks.extend(sinks);
        self
    }

    /// Batches in flight at once; outcomes keep discovery order regardless
    pub fn with_max_concurrent_batches(mut self, max: usize) -> Self {
        self.max_concurrent_batches = max.max(1);
        self
    }

    /// Process every source batch
    ///
    /// Consumes the pipeline so the factor cache does not outlive the run.
    #[instrument(skip(self), fields(run_id = tracing::field::Empty))]
    pub async fn run(self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));

        let keys = self.scanner.list_batches().await?;
        info!(
            batches = keys.len(),
            sinks = self.sinks.len(),
            concurrency = self.max_concurrent_batches,
            "Starting calculator run"
        );

        let batches: Vec<BatchOutcome> = stream::iter(keys)
            .map(|key| self.process_logged(key))
            .buffered(self.max_concurrent_batches)
            .try_collect()
            .await?;

        let summary = RunSummary {
            run_id,
            batches,
            cache: self.enricher.cache().stats(),
        };

        info!(
            batches = summary.batches.len(),
            events = summary.events_enriched(),
            skipped = summary.events_skipped(),
            cache_hits = summary.cache.hits,
            cache_misses = summary.cache.misses,
            "Calculator run completed"
        );

        Ok(summary)
    }

    async fn process_logged(&self, key: String) -> Result<BatchOutcome> {
        self.process_batch(&key).await.inspect_err(|e| {
            error!(source_key = %key, error = %e, "Batch failed");
        })
    }

    /// Read, enrich and write one batch
    #[instrument(skip(self))]
    pub async fn process_batch(&self, source_key: &str) -> Result<BatchOutcome> {
        let batch = self.scanner.read_batch(source_key).await?;
        let events_read = batch.events.len();

        let report = self.enricher.enrich(batch.events).await?;

        let mut receipts = Vec::with_capacity(self.sinks.len());
        for sink in &self.sinks {
            receipts.push(sink.write_batch(source_key, &report.events).await?);
        }

        info!(
            events = report.events.len(),
            skipped = report.skipped.len(),
            "Batch enriched and written"
        );

        Ok(BatchOutcome {
            source_key: source_key.to_string(),
            events_read,
            events_enriched: report.events.len(),
            skipped: report.skipped,
            receipts,
        })
    }
}
