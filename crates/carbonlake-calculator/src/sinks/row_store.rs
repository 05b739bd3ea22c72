//! Key-value style output table, one row per activity event id

use async_trait::async_trait;
use carbonlake_common::types::EnrichedEvent;
use serde_json::Value;
use sqlx::types::BigDecimal;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use super::{SinkKind, SinkReceipt, SinkWriter};
use crate::db::TableName;
use crate::error::{CalculatorError, Result};

/// Rows per `INSERT` statement
pub const DEFAULT_ROW_CHUNK_SIZE: usize = 25;

/// Exact decimal for a calculated float
///
/// Built from the shortest representation that round-trips the float, so
/// `1.0562245` is stored as `1.0562245` rather than its binary expansion.
pub fn to_decimal(value: f64) -> Result<BigDecimal> {
    if !value.is_finite() {
        return Err(CalculatorError::InvalidInput(format!(
            "cannot store non-finite amount {}",
            value
        )));
    }

    BigDecimal::from_str(&value.to_string())
        .map_err(|e| CalculatorError::InvalidInput(format!("invalid decimal {}: {}", value, e)))
}

/// Stored form of an enriched event
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRow {
    pub activity_event_id: String,
    pub scope: i16,
    pub category: String,
    pub activity: String,
    pub raw_data: BigDecimal,
    pub units: String,
    pub co2: BigDecimal,
    pub ch4: BigDecimal,
    pub n2o: BigDecimal,
    pub co2e: BigDecimal,
    pub emissions_factor: BigDecimal,
    /// The full enriched event as written to the raw batch
    pub document: Value,
}

impl OutputRow {
    pub fn from_event(enriched: &EnrichedEvent) -> Result<Self> {
        let event = &enriched.event;
        let emissions = &enriched.emissions_output.calculated_emissions;

        Ok(Self {
            activity_event_id: event.activity_event_id.clone(),
            scope: i16::from(u8::from(event.scope)),
            category: event.category.clone(),
            activity: event.activity.clone(),
            raw_data: to_decimal(event.raw_quantity()?)?,
            units: event.units.clone(),
            co2: to_decimal(emissions.co2.amount)?,
            ch4: to_decimal(emissions.ch4.amount)?,
            n2o: to_decimal(emissions.n2o.amount)?,
            co2e: to_decimal(emissions.co2e.amount)?,
            emissions_factor: to_decimal(enriched.emissions_output.emissions_factor.amount)?,
            document: serde_json::to_value(enriched)?,
        })
    }
}

/// Idempotent storage of output rows
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Insert or replace rows by `activity_event_id`, all or nothing
    async fn upsert(&self, rows: &[OutputRow]) -> anyhow::Result<usize>;
}

/// Row store kept in memory, for tests and offline runs
#[derive(Debug, Default)]
pub struct InMemoryRowStore {
    rows: RwLock<BTreeMap<String, OutputRow>>,
}

impl InMemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, activity_event_id: &str) -> Option<OutputRow> {
        self.rows.read().await.get(activity_event_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl RowStore for InMemoryRowStore {
    async fn upsert(&self, rows: &[OutputRow]) -> anyhow::Result<usize> {
        let mut stored = self.rows.write().await;
        for row in rows {
            stored.insert(row.activity_event_id.clone(), row.clone());
        }
        Ok(rows.len())
    }
}

/// Output table in PostgreSQL
#[derive(Debug, Clone)]
pub struct PgRowStore {
    db: PgPool,
    table: TableName,
    chunk_size: usize,
}

impl PgRowStore {
    pub fn new(db: PgPool, table: TableName) -> Self {
        Self {
            db,
            table,
            chunk_size: DEFAULT_ROW_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    async fn upsert_chunk(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        rows: &[OutputRow],
    ) -> anyhow::Result<()> {
        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            r#"
            INSERT INTO {} (
                activity_event_id,
                scope,
                category,
                activity,
                raw_data,
                units,
                co2_amount,
                ch4_amount,
                n2o_amount,
                co2e_amount,
                emissions_factor_amount,
                document
            )
            "#,
            self.table
        ));

        query_builder.push_values(rows, |mut b, row| {
            b.push_bind(&row.activity_event_id)
                .push_bind(row.scope)
                .push_bind(&row.category)
                .push_bind(&row.activity)
                .push_bind(&row.raw_data)
                .push_bind(&row.units)
                .push_bind(&row.co2)
                .push_bind(&row.ch4)
                .push_bind(&row.n2o)
                .push_bind(&row.co2e)
                .push_bind(&row.emissions_factor)
                .push_bind(&row.document);
        });

        query_builder.push(
            r#"
            ON CONFLICT (activity_event_id)
            DO UPDATE SET
                scope = EXCLUDED.scope,
                category = EXCLUDED.category,
                activity = EXCLUDED.activity,
                raw_data = EXCLUDED.raw_data,
                units = EXCLUDED.units,
                co2_amount = EXCLUDED.co2_amount,
                ch4_amount = EXCLUDED.ch4_amount,
                n2o_amount = EXCLUDED.n2o_amount,
                co2e_amount = EXCLUDED.co2e_amount,
                emissions_factor_amount = EXCLUDED.emissions_factor_amount,
                document = EXCLUDED.document,
                updated_at = NOW()
            "#,
        );

        query_builder.build().execute(&mut **tx).await?;

        Ok(())
    }
}

#[async_trait]
impl RowStore for PgRowStore {
    #[instrument(skip(self, rows), fields(table = %self.table, rows = rows.len()))]
    async fn upsert(&self, rows: &[OutputRow]) -> anyhow::Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self.db.begin().await?;

        for chunk in rows.chunks(self.chunk_size) {
            self.upsert_chunk(&mut tx, chunk).await?;
        }

        tx.commit().await?;

        debug!("Upserted {} rows into {}", rows.len(), self.table);

        Ok(rows.len())
    }
}

/// Sink writing one row per enriched event
pub struct RowStoreWriter {
    store: Arc<dyn RowStore>,
}

impl RowStoreWriter {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self { store }
    }
}

/// Keep the last row of every id, in first-seen order
///
/// One `INSERT .. ON CONFLICT` statement cannot touch the same key twice.
fn dedup_last_wins(rows: Vec<OutputRow>) -> Vec<OutputRow> {
    let mut position: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<OutputRow> = Vec::with_capacity(rows.len());

    for row in rows {
        match position.get(&row.activity_event_id) {
            Some(&idx) => unique[idx] = row,
            None => {
                position.insert(row.activity_event_id.clone(), unique.len());
                unique.push(row);
            },
        }
    }

    unique
}

#[async_trait]
impl SinkWriter for RowStoreWriter {
    fn kind(&self) -> SinkKind {
        SinkKind::RowStore
    }

    #[instrument(skip(self, events), fields(events = events.len()))]
    async fn write_batch(&self, source_key: &str, events: &[EnrichedEvent]) -> Result<SinkReceipt> {
        let rows = events
            .iter()
            .map(OutputRow::from_event)
            .collect::<Result<Vec<_>>>()?;
        let rows = dedup_last_wins(rows);

        let written = self
            .store
            .upsert(&rows)
            .await
            .map_err(|e| CalculatorError::sink(self.kind(), e))?;

        info!(rows = written, "Saved enriched events to row store");

        Ok(SinkReceipt {
            sink: self.kind(),
            rows_written: written,
            location: None,
        })
    }
}
