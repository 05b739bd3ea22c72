//! Factor repository adapters

use async_trait::async_trait;
use carbonlake_common::types::EmissionFactorCoefficients;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, instrument};

use super::{reference::EmissionFactorRecord, FactorKey, FactorRepository};
use crate::db::TableName;
use crate::error::{CalculatorError, Result};

/// Rows per `INSERT` statement when seeding reference data
pub const DEFAULT_SEED_CHUNK_SIZE: usize = 25;

/// Reference table held in memory
///
/// Counts lookups so callers can check how often the table was consulted.
#[derive(Debug, Default)]
pub struct InMemoryFactorRepository {
    factors: HashMap<FactorKey, EmissionFactorCoefficients>,
    lookups: AtomicU64,
}

impl InMemoryFactorRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = EmissionFactorRecord>) -> Self {
        let factors = records
            .into_iter()
            .map(|r| (r.key(), r.coefficients))
            .collect();
        Self {
            factors,
            lookups: AtomicU64::new(0),
        }
    }

    pub fn with_factor(
        mut self,
        category: &str,
        activity: &str,
        coefficients: EmissionFactorCoefficients,
    ) -> Self {
        self.factors.insert(FactorKey::new(category, activity), coefficients);
        self
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// Number of `get` calls served so far
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl FactorRepository for InMemoryFactorRepository {
    async fn get(&self, category: &str, activity: &str) -> Result<EmissionFactorCoefficients> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.factors
            .get(&FactorKey::new(category, activity))
            .cloned()
            .ok_or_else(|| CalculatorError::not_found(category, activity))
    }
}

/// Reference table in PostgreSQL
#[derive(Debug, Clone)]
pub struct PgFactorRepository {
    db: PgPool,
    table: TableName,
    chunk_size: usize,
}

impl PgFactorRepository {
    pub fn new(db: PgPool, table: TableName) -> Self {
        Self {
            db,
            table,
            chunk_size: DEFAULT_SEED_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Upsert reference records in one transaction
    #[instrument(skip(self, records), fields(table = %self.table, count = records.len()))]
    pub async fn seed(&self, records: &[EmissionFactorRecord]) -> anyhow::Result<usize> {
        let mut tx = self.db.begin().await?;
        let total_chunks = records.len().div_ceil(self.chunk_size);
        let mut stored = 0;

        for (chunk_idx, chunk) in records.chunks(self.chunk_size).enumerate() {
            debug!(
                "Seeding emission factors chunk {} / {} ({} rows)",
                chunk_idx + 1,
                total_chunks,
                chunk.len()
            );
            self.upsert_chunk(&mut tx, chunk).await?;
            stored += chunk.len();
        }

        tx.commit().await?;

        info!("Seeded {} emission factors into {}", stored, self.table);

        Ok(stored)
    }

    async fn upsert_chunk(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        records: &[EmissionFactorRecord],
    ) -> anyhow::Result<()> {
        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            r#"
            INSERT INTO {} (
                category,
                activity,
                scope,
                co2_factor,
                ch4_factor,
                n2o_factor,
                biofuel_co2,
                ar4_kgco2e,
                ar5_kgco2e,
                units,
                last_updated,
                source,
                source_origin
            )
            "#,
            self.table
        ));

        query_builder.push_values(records, |mut b, record| {
            let c = &record.coefficients;
            b.push_bind(&record.category)
                .push_bind(&record.activity)
                .push_bind(record.scope)
                .push_bind(c.co2_factor)
                .push_bind(c.ch4_factor)
                .push_bind(c.n2o_factor)
                .push_bind(c.biofuel_co2)
                .push_bind(c.ar4_kgco2e)
                .push_bind(c.ar5_kgco2e)
                .push_bind(&c.units)
                .push_bind(&record.last_updated)
                .push_bind(&record.source)
                .push_bind(&record.source_origin);
        });

        query_builder.push(
            r#"
            ON CONFLICT (category, activity)
            DO UPDATE SET
                scope = EXCLUDED.scope,
                co2_factor = EXCLUDED.co2_factor,
                ch4_factor = EXCLUDED.ch4_factor,
                n2o_factor = EXCLUDED.n2o_factor,
                biofuel_co2 = EXCLUDED.biofuel_co2,
                ar4_kgco2e = EXCLUDED.ar4_kgco2e,
                ar5_kgco2e = EXCLUDED.ar5_kgco2e,
                units = EXCLUDED.units,
                last_updated = EXCLUDED.last_updated,
                source = EXCLUDED.source,
                source_origin = EXCLUDED.source_origin,
                updated_at = NOW()
            "#,
        );

        query_builder.build().execute(&mut **tx).await?;

        Ok(())
    }
}

#[async_trait]
impl FactorRepository for PgFactorRepository {
    #[instrument(skip(self), fields(table = %self.table))]
    async fn get(&self, category: &str, activity: &str) -> Result<EmissionFactorCoefficients> {
        let query = format!(
            r#"
            SELECT co2_factor, ch4_factor, n2o_factor, biofuel_co2,
                   ar4_kgco2e, ar5_kgco2e, units
            FROM {}
            WHERE category = $1 AND activity = $2
            "#,
            self.table
        );

        let row = sqlx::query(&query)
            .bind(category)
            .bind(activity)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| CalculatorError::ReferenceUnavailable(e.to_string()))?
            .ok_or_else(|| CalculatorError::not_found(category, activity))?;

        let read = |column: &str| -> Result<Option<f64>> {
            row.try_get(column)
                .map_err(|e| CalculatorError::ReferenceUnavailable(e.to_string()))
        };

        let coefficients = EmissionFactorCoefficients {
            co2_factor: read("co2_factor")?,
            ch4_factor: read("ch4_factor")?,
            n2o_factor: read("n2o_factor")?,
            biofuel_co2: read("biofuel_co2")?,
            ar4_kgco2e: read("ar4_kgco2e")?,
            ar5_kgco2e: read("ar5_kgco2e")?,
            units: row
                .try_get("units")
                .map_err(|e| CalculatorError::ReferenceUnavailable(e.to_string()))?,
        };
        coefficients.validate()?;

        Ok(coefficients)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_exact_match() {
        let repository = InMemoryFactorRepository::new().with_factor(
            "mobile-combustion",
            "Diesel Fuel - Diesel Passenger Cars",
            EmissionFactorCoefficients {
                co2_factor: Some(10.21),
                ..Default::default()
            },
        );

        let found = repository
            .get("mobile-combustion", "Diesel Fuel - Diesel Passenger Cars")
            .await
            .unwrap();
        assert_eq!(found.co2_factor, Some(10.21));

        let err = repository
            .get("Diesel Fuel - Diesel Passenger Cars", "mobile-combustion")
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        assert!(repository.get("mobile-combustion", "Diesel").await.is_err());
        assert_eq!(repository.lookups(), 3);
    }
}
