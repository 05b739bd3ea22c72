//! PostgreSQL connection helpers

use anyhow::{Context, Result};
use regex::Regex;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::CalculatorError;

/// SQL table identifier, optionally schema-qualified
///
/// Identifiers cannot be bound as parameters, so they are restricted to
/// `[A-Za-z_][A-Za-z0-9_]*` segments before being placed in statement text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

impl TableName {
    pub fn new(name: impl Into<String>) -> crate::error::Result<Self> {
        static IDENTIFIER: OnceLock<Option<Regex>> = OnceLock::new();
        let name = name.into();

        let valid = IDENTIFIER
            .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").ok())
            .as_ref()
            .is_some_and(|re| re.is_match(&name));

        if !valid {
            return Err(CalculatorError::Config(format!(
                "Invalid table name: '{}'",
                name
            )));
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Open the connection pool
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect(&config.url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    info!(max_connections = config.max_connections, "Database connection pool established");

    Ok(pool)
}

/// Apply the bundled migrations
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .context("Failed to run migrations")?;

    info!("Database migrations completed");

    Ok(())
}
