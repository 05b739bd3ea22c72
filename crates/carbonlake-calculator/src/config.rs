//! Configuration management

use anyhow::Context;
use carbonlake_common::types::{GeoPoint, GwpStandard};
use std::str::FromStr;

use crate::enricher::FailurePolicy;
use crate::scanner::{IngestDefaults, DEFAULT_SOURCE_PREFIXES};
use crate::sinks::{analytics::AnalyticsMode, SinkKind};
use crate::storage::config::StorageConfig;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default input bucket holding the cleansed batches.
pub const DEFAULT_TRANSFORMED_BUCKET: &str = "carbonlake-transformed";

/// Default output bucket for enriched batches and analytics staging files.
pub const DEFAULT_ENRICHED_BUCKET: &str = "carbonlake-enriched";

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/carbonlake";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_EMISSIONS_FACTOR_TABLE: &str = "emission_factors";
pub const DEFAULT_CALCULATOR_OUTPUT_TABLE: &str = "calculator_output";
pub const DEFAULT_ANALYTICS_TABLE: &str = "calculated_emissions";

/// Batches are processed one after the other unless configured otherwise.
pub const DEFAULT_MAX_CONCURRENT_BATCHES: usize = 1;

/// Full calculator configuration
#[derive(Debug, Clone)]
pub struct CalculatorConfig {
    pub source: StorageConfig,
    pub output: StorageConfig,
    pub database: DatabaseConfig,
    pub tables: TableConfig,
    pub pipeline: PipelineSettings,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Table names, validated as identifiers before use
#[derive(Debug, Clone)]
pub struct TableConfig {
    pub emission_factors: String,
    pub calculator_output: String,
    pub analytics: String,
}

/// Run behaviour
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub source_prefixes: Vec<String>,
    pub sinks: Vec<SinkKind>,
    pub analytics_mode: AnalyticsMode,
    pub gwp_standard: GwpStandard,
    pub failure_policy: FailurePolicy,
    pub max_concurrent_batches: usize,
    pub defaults: IngestDefaults,
}

impl CalculatorConfig {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Build configuration from an arbitrary variable source
    ///
    /// Unparseable numbers fall back to their defaults; unknown sink kinds,
    /// modes, standards and policies are rejected.
    pub fn from_lookup<F>(var: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source =
            StorageConfig::from_lookup(&var, "TRANSFORMED_BUCKET_NAME", DEFAULT_TRANSFORMED_BUCKET);
        let output =
            StorageConfig::from_lookup(&var, "ENRICHED_BUCKET_NAME", DEFAULT_ENRICHED_BUCKET);

        let database = DatabaseConfig {
            url: var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            max_connections: var("DATABASE_MAX_CONNECTIONS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
            connect_timeout_secs: var("DATABASE_CONNECT_TIMEOUT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS),
        };

        let tables = TableConfig {
            emission_factors: var("EMISSIONS_FACTOR_TABLE_NAME")
                .unwrap_or_else(|| DEFAULT_EMISSIONS_FACTOR_TABLE.to_string()),
            calculator_output: var("CALCULATOR_OUTPUT_TABLE_NAME")
                .unwrap_or_else(|| DEFAULT_CALCULATOR_OUTPUT_TABLE.to_string()),
            analytics: var("ANALYTICS_TABLE_NAME")
                .unwrap_or_else(|| DEFAULT_ANALYTICS_TABLE.to_string()),
        };

        let source_prefixes = match var("CALC_SOURCE_PREFIXES") {
            Some(list) => split_list(&list),
            None => DEFAULT_SOURCE_PREFIXES.iter().map(|p| p.to_string()).collect(),
        };

        let sinks = match var("CALC_SINKS") {
            Some(list) => split_list(&list)
                .iter()
                .map(|s| SinkKind::from_str(s))
                .collect::<Result<Vec<_>, _>>()
                .context("Invalid CALC_SINKS")?,
            None => SinkKind::ALL.to_vec(),
        };

        let analytics_mode = parse_or_default(&var, "CALC_ANALYTICS_MODE")?;
        let gwp_standard = parse_or_default(&var, "CALC_GWP_STANDARD")?;
        let failure_policy = parse_or_default(&var, "CALC_FAILURE_POLICY")?;

        let fallback = IngestDefaults::default();
        let defaults = IngestDefaults {
            asset_id: var("CALC_DEFAULT_ASSET_ID").unwrap_or(fallback.asset_id),
            geo: GeoPoint::new(
                var("CALC_DEFAULT_LAT")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(fallback.geo.lat),
                var("CALC_DEFAULT_LONG")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(fallback.geo.long),
            ),
            origin_measurement_timestamp: var("CALC_DEFAULT_TIMESTAMP")
                .unwrap_or(fallback.origin_measurement_timestamp),
        };

        Ok(Self {
            source,
            output,
            database,
            tables,
            pipeline: PipelineSettings {
                source_prefixes,
                sinks,
                analytics_mode,
                gwp_standard,
                failure_policy,
                max_concurrent_batches: var("CALC_MAX_CONCURRENT_BATCHES")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_MAX_CONCURRENT_BATCHES),
                defaults,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.source.bucket.is_empty() || self.output.bucket.is_empty() {
            anyhow::bail!("Bucket names cannot be empty");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        for name in [
            &self.tables.emission_factors,
            &self.tables.calculator_output,
            &self.tables.analytics,
        ] {
            crate::db::TableName::new(name.as_str())?;
        }

        if self.pipeline.source_prefixes.is_empty() {
            anyhow::bail!("At least one source prefix is required");
        }

        if self.pipeline.max_concurrent_batches == 0 {
            anyhow::bail!("max_concurrent_batches must be greater than 0");
        }

        if self.pipeline.sinks.is_empty() {
            tracing::warn!("No sinks configured - enriched batches will be discarded");
        }

        Ok(())
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn parse_or_default<F, T>(var: &F, key: &str) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Default,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: '{}'", key, raw)),
        None => Ok(T::default()),
    }
}
