//! Subcommand implementations

use anyhow::{Context, Result};
use carbonlake_common::types::GwpStandard;
use sqlx::PgPool;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::calculator::EmissionCalculator;
use crate::config::CalculatorConfig;
use crate::db::{self, TableName};
use crate::enricher::{EnrichmentReport, EventEnricher, FailurePolicy};
use crate::factors::{
    load_reference_document, FactorCache, FactorRepository, InMemoryFactorRepository,
    PgFactorRepository,
};
use crate::pipeline::{CalculatorPipeline, RunSummary};
use crate::scanner::{parse_events, IngestDefaults, IngestionScanner};
use crate::sinks::{
    AnalyticsWriter, PgRowStore, RawBatchWriter, RowStoreWriter, SinkKind, SinkWriter,
};
use crate::storage::{ObjectStore, S3ObjectStore};

/// Full run against the configured buckets and database
pub async fn run(config: &CalculatorConfig) -> Result<RunSummary> {
    let source: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(config.source.clone()).await?);
    let output: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(config.output.clone()).await?);

    let pool = db::connect(&config.database).await?;
    db::run_migrations(&pool).await?;

    let repository: Arc<dyn FactorRepository> = Arc::new(PgFactorRepository::new(
        pool.clone(),
        TableName::new(config.tables.emission_factors.as_str())?,
    ));

    let settings = &config.pipeline;
    let scanner = IngestionScanner::new(source)
        .with_prefixes(settings.source_prefixes.clone())
        .with_defaults(Some(settings.defaults.clone()));
    let enricher = EventEnricher::new(
        Arc::new(FactorCache::new(repository)),
        EmissionCalculator::new(settings.gwp_standard),
    )
    .with_policy(settings.failure_policy);

    let pipeline = CalculatorPipeline::new(scanner, enricher)
        .with_sinks(build_sinks(config, &pool, output)?)
        .with_max_concurrent_batches(settings.max_concurrent_batches);

    Ok(pipeline.run().await?)
}

/// Writers for every configured sink, in configuration order
pub fn build_sinks(
    config: &CalculatorConfig,
    pool: &PgPool,
    output: Arc<dyn ObjectStore>,
) -> Result<Vec<Arc<dyn SinkWriter>>> {
    config
        .pipeline
        .sinks
        .iter()
        .map(|kind| -> Result<Arc<dyn SinkWriter>> {
            let sink: Arc<dyn SinkWriter> = match kind {
                SinkKind::RawBatch => Arc::new(RawBatchWriter::new(Arc::clone(&output))),
                SinkKind::RowStore => {
                    let table = TableName::new(config.tables.calculator_output.as_str())?;
                    Arc::new(RowStoreWriter::new(Arc::new(PgRowStore::new(pool.clone(), table))))
                },
                SinkKind::Analytics => {
                    let table = TableName::new(config.tables.analytics.as_str())?;
                    Arc::new(
                        AnalyticsWriter::new(pool.clone(), table, config.pipeline.analytics_mode)
                            .with_staging(Arc::clone(&output)),
                    )
                },
            };
            Ok(sink)
        })
        .collect()
}

/// Load the reference document into the emission factor table
pub async fn seed_factors(config: &CalculatorConfig, file: &Path) -> Result<usize> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let records = load_reference_document(&bytes)?;
    info!(records = records.len(), "Loaded reference document");

    let pool = db::connect(&config.database).await?;
    db::run_migrations(&pool).await?;

    let repository = PgFactorRepository::new(
        pool,
        TableName::new(config.tables.emission_factors.as_str())?,
    );

    repository.seed(&records).await
}

/// Enrich a local NDJSON file against a local reference document
pub async fn enrich_file(
    input: &Path,
    factors: &Path,
    standard: GwpStandard,
    policy: FailurePolicy,
) -> Result<EnrichmentReport> {
    let factor_bytes = tokio::fs::read(factors)
        .await
        .with_context(|| format!("Failed to read {}", factors.display()))?;
    let repository: Arc<dyn FactorRepository> = Arc::new(InMemoryFactorRepository::from_records(
        load_reference_document(&factor_bytes)?,
    ));

    let content = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let source_key = input.display().to_string();
    let mut events = parse_events(&source_key, &content)?;
    let defaults = IngestDefaults::default();
    events.iter_mut().for_each(|e| defaults.apply(e));

    let enricher = EventEnricher::new(
        Arc::new(FactorCache::new(repository)),
        EmissionCalculator::new(standard),
    )
    .with_policy(policy);

    Ok(enricher.enrich(events).await?)
}
