//! Shared fixtures for calculator integration tests
//!
//! - Reference factors and source lines used across the suites
//! - In-memory wiring of a full pipeline
//! - A PostgreSQL container with migrations applied (requires Docker)
#![allow(dead_code)]

use anyhow::{Context, Result};
use async_trait::async_trait;
use carbonlake_calculator::{
    calculator::EmissionCalculator,
    enricher::{EventEnricher, FailurePolicy},
    factors::{FactorCache, FactorRepository, InMemoryFactorRepository},
    pipeline::CalculatorPipeline,
    scanner::IngestionScanner,
    sinks::{InMemoryRowStore, RawBatchWriter, RowStoreWriter, SinkKind, SinkReceipt, SinkWriter},
    storage::MemoryObjectStore,
};
use carbonlake_common::types::{EmissionFactorCoefficients, EnrichedEvent, GwpStandard};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync};
use testcontainers_modules::postgres::Postgres;
use tracing::info;

/// Initialize tracing for tests
pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,carbonlake_calculator=debug")),
        )
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Reference data
// ============================================================================

pub const DIESEL_CATEGORY: &str = "mobile-combustion";
pub const DIESEL_ACTIVITY: &str = "Diesel Fuel - Diesel Passenger Cars";
pub const LOCATION_CATEGORY: &str = "grid-region-location-based";
pub const MARKET_CATEGORY: &str = "egrid-subregion-residual-mix-market-based";

pub fn diesel() -> EmissionFactorCoefficients {
    EmissionFactorCoefficients {
        co2_factor: Some(10.21),
        ch4_factor: Some(0.00001125),
        n2o_factor: Some(0.0000225),
        biofuel_co2: None,
        ar4_kgco2e: Some(10.21698625),
        ar5_kgco2e: Some(10.2162775),
        units: Some("gal".to_string()),
    }
}

pub fn quebec_location() -> EmissionFactorCoefficients {
    EmissionFactorCoefficients {
        co2_factor: Some(0.0012),
        ch4_factor: None,
        n2o_factor: Some(0.0000001),
        biofuel_co2: None,
        ar4_kgco2e: Some(0.0012298),
        ar5_kgco2e: Some(0.0012265),
        units: Some("kWh".to_string()),
    }
}

pub fn quebec_market() -> EmissionFactorCoefficients {
    EmissionFactorCoefficients {
        co2_factor: Some(0.045064402),
        ch4_factor: None,
        n2o_factor: None,
        biofuel_co2: None,
        ar4_kgco2e: Some(0.045064402),
        ar5_kgco2e: Some(0.045064402),
        units: Some("kWh".to_string()),
    }
}

pub fn factor_repository() -> Arc<InMemoryFactorRepository> {
    Arc::new(
        InMemoryFactorRepository::new()
            .with_factor(DIESEL_CATEGORY, DIESEL_ACTIVITY, diesel())
            .with_factor(LOCATION_CATEGORY, "Quebec", quebec_location())
            .with_factor(MARKET_CATEGORY, "Quebec", quebec_market()),
    )
}

// ============================================================================
// Source lines
// ============================================================================

pub fn scope1_line(id: &str, raw_data: f64) -> String {
    format!(
        r#"{{"activity_event_id": "{id}", "asset_id": "vehicle-1234", "geo": {{ "lat": 45.5152, "long": 122.6784}}, "origin_measurement_timestamp":"2022-06-26 02:31:29", "scope": 1, "category": "mobile-combustion", "activity": "Diesel Fuel - Diesel Passenger Cars", "source": "company_fleet_management_database", "raw_data": {raw_data}, "units": "gal"}}"#
    )
}

pub fn scope2_line(id: &str, category: &str, raw_data: f64) -> String {
    format!(
        r#"{{ "activity_event_id": "{id}", "supplier": "eversource", "scope": 2, "category": "{category}", "activity": "Quebec", "raw_data": {raw_data}, "units": "kwH"}}"#
    )
}

pub fn assert_close(actual: f64, expected: f64) {
    let tolerance = 1e-12 * expected.abs().max(1.0);
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {}, got {}",
        expected,
        actual
    );
}

// ============================================================================
// In-memory pipeline
// ============================================================================

pub struct TestHarness {
    pub source: Arc<MemoryObjectStore>,
    pub output: Arc<MemoryObjectStore>,
    pub rows: Arc<InMemoryRowStore>,
    pub factors: Arc<InMemoryFactorRepository>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self {
            source: Arc::new(MemoryObjectStore::new("transformed")),
            output: Arc::new(MemoryObjectStore::new("enriched")),
            rows: Arc::new(InMemoryRowStore::new()),
            factors: factor_repository(),
        }
    }

    pub async fn put_source(&self, key: &str, lines: &[String]) {
        self.source.insert(key, lines.join("\n")).await;
    }

    /// Pipeline writing to the raw batch and row store sinks
    pub fn pipeline(&self, standard: GwpStandard, policy: FailurePolicy) -> CalculatorPipeline {
        self.pipeline_with_sinks(standard, policy, Vec::new())
    }

    pub fn pipeline_with_sinks(
        &self,
        standard: GwpStandard,
        policy: FailurePolicy,
        extra: Vec<Arc<dyn SinkWriter>>,
    ) -> CalculatorPipeline {
        let factors: Arc<dyn FactorRepository> = self.factors.clone();
        let enricher = EventEnricher::new(
            Arc::new(FactorCache::new(factors)),
            EmissionCalculator::new(standard),
        )
        .with_policy(policy);

        CalculatorPipeline::new(IngestionScanner::new(self.source.clone()), enricher)
            .with_sink(Arc::new(RawBatchWriter::new(self.output.clone())))
            .with_sink(Arc::new(RowStoreWriter::new(self.rows.clone())))
            .with_sinks(extra)
    }

    /// Enriched events written for `source_key`
    pub async fn output_events(&self, source_key: &str) -> Vec<serde_json::Value> {
        let body = self
            .output
            .get_string(&format!("today/{}", source_key))
            .await
            .unwrap_or_default();

        body.lines()
            .filter(|line| !line.is_empty())
            .map(|line| serde_json::from_str(line).unwrap_or(serde_json::Value::Null))
            .collect()
    }
}

/// Sink recording the batches it receives
#[derive(Default)]
pub struct RecordingSink {
    pub batches: Mutex<Vec<(String, Vec<String>)>>,
}

#[async_trait]
impl SinkWriter for RecordingSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Analytics
    }

    async fn write_batch(
        &self,
        source_key: &str,
        events: &[EnrichedEvent],
    ) -> carbonlake_calculator::Result<SinkReceipt> {
        let ids = events.iter().map(|e| e.id().to_string()).collect();
        self.batches
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((source_key.to_string(), ids));

        Ok(SinkReceipt {
            sink: self.kind(),
            rows_written: events.len(),
            location: None,
        })
    }
}

/// Sink that always fails
pub struct FailingSink;

#[async_trait]
impl SinkWriter for FailingSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Analytics
    }

    async fn write_batch(
        &self,
        _source_key: &str,
        _events: &[EnrichedEvent],
    ) -> carbonlake_calculator::Result<SinkReceipt> {
        Err(carbonlake_calculator::CalculatorError::sink(
            self.kind(),
            "connection refused",
        ))
    }
}

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

/// PostgreSQL container with the calculator migrations applied
pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let connection_string =
            format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        carbonlake_calculator::db::run_migrations(&pool).await?;

        info!("PostgreSQL test container ready on port {}", port);

        Ok(Self {
            _container: container,
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
