//! Relational analytics table
//!
//! Three write strategies share one row layout:
//! - `single`: one bound `INSERT` per event
//! - `batch`: multi-row bound `INSERT`s in chunks
//! - `copy`: the batch rendered as CSV (staged to object storage when a
//!   staging store is configured) and loaded with `COPY .. FROM STDIN`
//!
//! Every write first deletes the rows of the batch's event ids in the same
//! transaction, so rewriting a batch replaces its rows.
//!
//! Event values only ever travel as bind parameters or COPY payload.

use async_trait::async_trait;
use carbonlake_common::types::{EnrichedEvent, GeoPoint};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::types::BigDecimal;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::row_store::to_decimal;
use super::{SinkKind, SinkReceipt, SinkWriter};
use crate::db::TableName;
use crate::error::{CalculatorError, Result};
use crate::storage::ObjectStore;

/// Rows per multi-row `INSERT` in batch mode
pub const DEFAULT_ANALYTICS_CHUNK_SIZE: usize = 100;

/// Key prefix of staged COPY files
pub const STAGING_PREFIX: &str = "staging";

/// NULL marker of the COPY payload
const COPY_NULL: &str = "\\N";

pub const COLUMNS: [&str; 20] = [
    "activity_event_id",
    "asset_id",
    "geo",
    "origin_measurement_timestamp",
    "scope",
    "category",
    "activity",
    "source",
    "raw_data",
    "units",
    "co2e_amount",
    "co2e_unit",
    "n2o_amount",
    "n2o_unit",
    "ch4_amount",
    "ch4_unit",
    "co2_amount",
    "co2_unit",
    "emissions_factor_amount",
    "emissions_factor_unit",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyticsMode {
    Single,
    #[default]
    Batch,
    Copy,
}

impl FromStr for AnalyticsMode {
    type Err = CalculatorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "single" => Ok(AnalyticsMode::Single),
            "batch" => Ok(AnalyticsMode::Batch),
            "copy" => Ok(AnalyticsMode::Copy),
            other => Err(CalculatorError::Config(format!(
                "Invalid analytics mode: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for AnalyticsMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalyticsMode::Single => write!(f, "single"),
            AnalyticsMode::Batch => write!(f, "batch"),
            AnalyticsMode::Copy => write!(f, "copy"),
        }
    }
}

/// Parse `YYYY-MM-DD HH:MM:SS` (taken as UTC) or RFC 3339
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }

    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| CalculatorError::InvalidInput(format!("invalid timestamp '{}'", raw)))
}

/// One analytics table row
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsRow {
    pub activity_event_id: String,
    pub asset_id: Option<String>,
    /// Stored as `point(long, lat)`; origin when the event has no location
    pub geo: GeoPoint,
    pub origin_measurement_timestamp: Option<DateTime<Utc>>,
    pub scope: i32,
    pub category: String,
    pub activity: String,
    pub source: Option<String>,
    pub raw_data: BigDecimal,
    pub units: String,
    pub co2e_amount: BigDecimal,
    pub co2e_unit: String,
    pub n2o_amount: BigDecimal,
    pub n2o_unit: String,
    pub ch4_amount: BigDecimal,
    pub ch4_unit: String,
    pub co2_amount: BigDecimal,
    pub co2_unit: String,
    pub emissions_factor_amount: BigDecimal,
    pub emissions_factor_unit: String,
}

impl AnalyticsRow {
    pub fn from_event(enriched: &EnrichedEvent) -> Result<Self> {
        let event = &enriched.event;
        let emissions = &enriched.emissions_output.calculated_emissions;
        let factor = &enriched.emissions_output.emissions_factor;

        let origin_measurement_timestamp = event
            .origin_measurement_timestamp
            .as_deref()
            .map(parse_timestamp)
            .transpose()?;

        Ok(Self {
            activity_event_id: event.activity_event_id.clone(),
            asset_id: event.asset_id.clone(),
            geo: event.geo.unwrap_or_default(),
            origin_measurement_timestamp,
            scope: i32::from(u8::from(event.scope)),
            category: event.category.clone(),
            activity: event.activity.clone(),
            source: event.source.clone(),
            raw_data: to_decimal(event.raw_quantity()?)?,
            units: event.units.clone(),
            co2e_amount: to_decimal(emissions.co2e.amount)?,
            co2e_unit: emissions.co2e.unit.clone(),
            n2o_amount: to_decimal(emissions.n2o.amount)?,
            n2o_unit: emissions.n2o.unit.clone(),
            ch4_amount: to_decimal(emissions.ch4.amount)?,
            ch4_unit: emissions.ch4.unit.clone(),
            co2_amount: to_decimal(emissions.co2.amount)?,
            co2_unit: emissions.co2.unit.clone(),
            emissions_factor_amount: to_decimal(factor.amount)?,
            emissions_factor_unit: factor.unit.clone(),
        })
    }

    /// Fields in [`COLUMNS`] order as COPY text; `None` is NULL
    fn copy_fields(&self) -> [Option<String>; 20] {
        [
            Some(self.activity_event_id.clone()),
            self.asset_id.clone(),
            Some(format!("({},{})", self.geo.long, self.geo.lat)),
            self.origin_measurement_timestamp.map(|ts| ts.to_rfc3339()),
            Some(self.scope.to_string()),
            Some(self.category.clone()),
            Some(self.activity.clone()),
            self.source.clone(),
            Some(self.raw_data.to_string()),
            Some(self.units.clone()),
            Some(self.co2e_amount.to_string()),
            Some(self.co2e_unit.clone()),
            Some(self.n2o_amount.to_string()),
            Some(self.n2o_unit.clone()),
            Some(self.ch4_amount.to_string()),
            Some(self.ch4_unit.clone()),
            Some(self.co2_amount.to_string()),
            Some(self.co2_unit.clone()),
            Some(self.emissions_factor_amount.to_string()),
            Some(self.emissions_factor_unit.clone()),
        ]
    }
}

/// Render rows as headerless CSV in [`COLUMNS`] order
///
/// Every present value is quoted and NULL is the bare `\N` marker, so a text
/// value that reads `\N` still loads as text.
pub fn to_csv(rows: &[AnalyticsRow]) -> anyhow::Result<Vec<u8>> {
    let mut quoted = csv::WriterBuilder::new()
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    let mut payload = Vec::new();

    for row in rows {
        for (idx, field) in row.copy_fields().iter().enumerate() {
            if idx > 0 {
                payload.push(b',');
            }

            match field {
                None => payload.extend_from_slice(COPY_NULL.as_bytes()),
                Some(value) => {
                    quoted.write_record([value])?;
                    quoted.flush()?;
                    let rendered = quoted.get_mut();
                    let bytes = rendered.as_slice();
                    payload.extend_from_slice(bytes.strip_suffix(b"\n").unwrap_or(bytes));
                    rendered.clear();
                },
            }
        }
        payload.push(b'\n');
    }

    Ok(payload)
}

/// Multi-row `INSERT` with every value bound
pub fn build_insert<'a>(table: &TableName, rows: &'a [AnalyticsRow]) -> QueryBuilder<'a, Postgres> {
    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("INSERT INTO {} ({}) ", table, COLUMNS.join(", ")));

    query_builder.push_values(rows, |mut b, row| {
        b.push_bind(&row.activity_event_id)
            .push_bind(&row.asset_id)
            .push("point(")
            .push_bind_unseparated(row.geo.long)
            .push_unseparated(", ")
            .push_bind_unseparated(row.geo.lat)
            .push_unseparated(")")
            .push_bind(row.origin_measurement_timestamp)
            .push_bind(row.scope)
            .push_bind(&row.category)
            .push_bind(&row.activity)
            .push_bind(&row.source)
            .push_bind(&row.raw_data)
            .push_bind(&row.units)
            .push_bind(&row.co2e_amount)
            .push_bind(&row.co2e_unit)
            .push_bind(&row.n2o_amount)
            .push_bind(&row.n2o_unit)
            .push_bind(&row.ch4_amount)
            .push_bind(&row.ch4_unit)
            .push_bind(&row.co2_amount)
            .push_bind(&row.co2_unit)
            .push_bind(&row.emissions_factor_amount)
            .push_bind(&row.emissions_factor_unit);
    });

    query_builder
}

/// Removes the rows of the bound `$1` event id array
pub fn delete_statement(table: &TableName) -> String {
    format!("DELETE FROM {} WHERE activity_event_id = ANY($1)", table)
}

pub fn copy_statement(table: &TableName) -> String {
    format!(
        "COPY {} ({}) FROM STDIN WITH (FORMAT csv, NULL '{}')",
        table,
        COLUMNS.join(", "),
        COPY_NULL
    )
}

pub struct AnalyticsWriter {
    db: PgPool,
    table: TableName,
    mode: AnalyticsMode,
    chunk_size: usize,
    staging: Option<Arc<dyn ObjectStore>>,
}

impl AnalyticsWriter {
    pub fn new(db: PgPool, table: TableName, mode: AnalyticsMode) -> Self {
        Self {
            db,
            table,
            mode,
            chunk_size: DEFAULT_ANALYTICS_CHUNK_SIZE,
            staging: None,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Keep a copy of every COPY payload under `staging/<source_key>.csv`
    pub fn with_staging(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.staging = Some(store);
        self
    }

    pub fn mode(&self) -> AnalyticsMode {
        self.mode
    }

    pub fn staging_key(source_key: &str) -> String {
        format!("{}/{}.csv", STAGING_PREFIX, source_key)
    }

    async fn delete_existing(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        rows: &[AnalyticsRow],
    ) -> anyhow::Result<()> {
        let ids: Vec<String> = rows.iter().map(|r| r.activity_event_id.clone()).collect();

        let removed = sqlx::query(&delete_statement(&self.table))
            .bind(&ids)
            .execute(&mut **tx)
            .await?
            .rows_affected();

        if removed > 0 {
            debug!(rows = removed, "Replacing previously loaded rows");
        }

        Ok(())
    }

    async fn insert_rows(&self, rows: &[AnalyticsRow]) -> anyhow::Result<Option<String>> {
        let chunk_size = match self.mode {
            AnalyticsMode::Single => 1,
            _ => self.chunk_size,
        };

        let mut tx = self.db.begin().await?;
        self.delete_existing(&mut tx, rows).await?;

        for chunk in rows.chunks(chunk_size) {
            build_insert(&self.table, chunk).build().execute(&mut *tx).await?;
        }

        tx.commit().await?;

        Ok(None)
    }

    async fn copy_rows(
        &self,
        source_key: &str,
        rows: &[AnalyticsRow],
    ) -> anyhow::Result<Option<String>> {
        let payload = to_csv(rows)?;

        let location = match &self.staging {
            Some(store) => {
                let upload = store
                    .put(&Self::staging_key(source_key), payload.clone(), Some("text/csv"))
                    .await?;
                debug!(location = %upload.location, "Staged analytics payload");
                Some(upload.location)
            },
            None => None,
        };

        let mut tx = self.db.begin().await?;
        self.delete_existing(&mut tx, rows).await?;
        let mut copy = tx.copy_in_raw(&copy_statement(&self.table)).await?;
        copy.send(payload).await?;
        let copied = copy.finish().await?;
        tx.commit().await?;

        debug!(rows = copied, "COPY completed");

        Ok(location)
    }
}

#[async_trait]
impl SinkWriter for AnalyticsWriter {
    fn kind(&self) -> SinkKind {
        SinkKind::Analytics
    }

    #[instrument(
        skip(self, events),
        fields(table = %self.table, mode = %self.mode, events = events.len())
    )]
    async fn write_batch(&self, source_key: &str, events: &[EnrichedEvent]) -> Result<SinkReceipt> {
        let rows = events
            .iter()
            .map(AnalyticsRow::from_event)
            .collect::<Result<Vec<_>>>()?;

        if rows.is_empty() {
            return Ok(SinkReceipt {
                sink: self.kind(),
                rows_written: 0,
                location: None,
            });
        }

        let location = match self.mode {
            AnalyticsMode::Single | AnalyticsMode::Batch => self.insert_rows(&rows).await,
            AnalyticsMode::Copy => self.copy_rows(source_key, &rows).await,
        }
        .map_err(|e| CalculatorError::sink(self.kind(), e))?;

        info!(rows = rows.len(), "Loaded enriched events into analytics table");

        Ok(SinkReceipt {
            sink: self.kind(),
            rows_written: rows.len(),
            location,
        })
    }
}
