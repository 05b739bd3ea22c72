//! PostgreSQL-backed factor repository and sinks
//!
//! Run with: cargo test -p carbonlake-calculator --test postgres_tests -- --ignored

mod common;

use carbonlake_calculator::{
    calculator::EmissionCalculator,
    db::TableName,
    enricher::EventEnricher,
    factors::{EmissionFactorRecord, FactorCache, FactorRepository, PgFactorRepository},
    scanner::{parse_events, IngestDefaults},
    sinks::{AnalyticsMode, AnalyticsWriter, OutputRow, PgRowStore, RowStore, SinkWriter},
    storage::MemoryObjectStore,
    CalculatorError,
};
use carbonlake_common::types::{EnrichedEvent, GwpStandard};
use common::*;
use sqlx::Row;
use std::sync::Arc;

fn records() -> Vec<EmissionFactorRecord> {
    vec![
        EmissionFactorRecord {
            category: DIESEL_CATEGORY.to_string(),
            activity: DIESEL_ACTIVITY.to_string(),
            scope: 1,
            coefficients: diesel(),
            last_updated: Some("2022-01-01".to_string()),
            source: Some("EPA".to_string()),
            source_origin: None,
        },
        EmissionFactorRecord {
            category: LOCATION_CATEGORY.to_string(),
            activity: "Quebec".to_string(),
            scope: 2,
            coefficients: quebec_location(),
            last_updated: None,
            source: None,
            source_origin: None,
        },
    ]
}

async fn enriched(lines: &[String]) -> Vec<EnrichedEvent> {
    let mut events = parse_events("test.json", &lines.join("\n")).unwrap();
    let defaults = IngestDefaults::default();
    events.iter_mut().for_each(|e| defaults.apply(e));

    let factors: Arc<dyn FactorRepository> = factor_repository();
    EventEnricher::new(
        Arc::new(FactorCache::new(factors)),
        EmissionCalculator::new(GwpStandard::Ar5),
    )
    .enrich(events)
    .await
    .unwrap()
    .events
}

async fn count(pg: &TestPostgres, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pg.pool())
        .await
        .unwrap()
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_seed_and_lookup_factors() {
    init_test_tracing();
    let pg = TestPostgres::start().await.unwrap();
    let repository =
        PgFactorRepository::new(pg.pool().clone(), TableName::new("emission_factors").unwrap())
            .with_chunk_size(1);

    assert_eq!(repository.seed(&records()).await.unwrap(), 2);
    // Reseeding updates in place
    assert_eq!(repository.seed(&records()).await.unwrap(), 2);
    assert_eq!(count(&pg, "emission_factors").await, 2);

    let diesel_factor = repository.get(DIESEL_CATEGORY, DIESEL_ACTIVITY).await.unwrap();
    assert_eq!(diesel_factor, diesel());

    let quebec = repository.get(LOCATION_CATEGORY, "Quebec").await.unwrap();
    assert_eq!(quebec.ch4_factor, None);
    assert_eq!(quebec.ar5_kgco2e, Some(0.0012265));

    let missing = repository.get(LOCATION_CATEGORY, "Atlantis").await.unwrap_err();
    assert!(matches!(missing, CalculatorError::NotFound { .. }));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_row_store_upsert_is_idempotent() {
    let pg = TestPostgres::start().await.unwrap();
    let store = PgRowStore::new(pg.pool().clone(), TableName::new("calculator_output").unwrap());

    let events = enriched(&[
        scope1_line("customer-carbonlake-12345", 103.45),
        scope2_line("customer-carbonlake-12346", LOCATION_CATEGORY, 453.0),
    ])
    .await;
    let rows: Vec<OutputRow> = events.iter().map(|e| OutputRow::from_event(e).unwrap()).collect();

    store.upsert(&rows).await.unwrap();
    store.upsert(&rows).await.unwrap();
    assert_eq!(count(&pg, "calculator_output").await, 2);

    let row = sqlx::query(
        "SELECT co2_amount::FLOAT8 AS co2, document->>'supplier' AS supplier
         FROM calculator_output WHERE activity_event_id = $1",
    )
    .bind("customer-carbonlake-12346")
    .fetch_one(pg.pool())
    .await
    .unwrap();

    assert_close(row.get::<f64, _>("co2"), 0.0005436);
    assert_eq!(row.get::<String, _>("supplier"), "eversource");
}

fn analytics_writer(
    pg: &TestPostgres,
    mode: AnalyticsMode,
    staging: Arc<MemoryObjectStore>,
) -> AnalyticsWriter {
    AnalyticsWriter::new(
        pg.pool().clone(),
        TableName::new("calculated_emissions").unwrap(),
        mode,
    )
    .with_chunk_size(2)
    .with_staging(staging)
}

async fn analytics_events() -> Vec<EnrichedEvent> {
    enriched(&[
        scope1_line("evt-1", 103.45),
        scope1_line("evt-2", 13.5),
        scope2_line("evt-3", LOCATION_CATEGORY, 453.0),
    ])
    .await
}

async fn load_analytics(mode: AnalyticsMode) -> (TestPostgres, Arc<MemoryObjectStore>, usize) {
    let pg = TestPostgres::start().await.unwrap();
    let staging = Arc::new(MemoryObjectStore::new("enriched"));
    let writer = analytics_writer(&pg, mode, staging.clone());

    let receipt = writer
        .write_batch("scope1-cleansed-data/fleet.json", &analytics_events().await)
        .await
        .unwrap();

    (pg, staging, receipt.rows_written)
}

async fn assert_analytics_rows(pg: &TestPostgres) {
    assert_eq!(count(pg, "calculated_emissions").await, 3);

    let row = sqlx::query(
        "SELECT asset_id, geo[0] AS long, geo[1] AS lat, scope, co2_unit,
                origin_measurement_timestamp::TEXT AS ts
         FROM calculated_emissions WHERE activity_event_id = 'evt-1'",
    )
    .fetch_one(pg.pool())
    .await
    .unwrap();

    assert_eq!(row.get::<String, _>("asset_id"), "vehicle-1234");
    assert_close(row.get::<f64, _>("long"), 122.6784);
    assert_close(row.get::<f64, _>("lat"), 45.5152);
    assert_eq!(row.get::<i32, _>("scope"), 1);
    assert_eq!(row.get::<String, _>("co2_unit"), "tonnes");
    assert!(row.get::<String, _>("ts").starts_with("2022-06-26 02:31:29"));

    let defaulted = sqlx::query(
        "SELECT geo[0] AS long, geo[1] AS lat
         FROM calculated_emissions WHERE activity_event_id = 'evt-3'",
    )
    .fetch_one(pg.pool())
    .await
    .unwrap();
    assert_eq!(defaulted.get::<f64, _>("long"), 0.0);
    assert_eq!(defaulted.get::<f64, _>("lat"), 0.0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_analytics_single_mode() {
    let (pg, staging, written) = load_analytics(AnalyticsMode::Single).await;
    assert_eq!(written, 3);
    assert_analytics_rows(&pg).await;
    assert!(staging.keys().await.is_empty());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_analytics_batch_mode() {
    let (pg, _staging, written) = load_analytics(AnalyticsMode::Batch).await;
    assert_eq!(written, 3);
    assert_analytics_rows(&pg).await;
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_analytics_copy_mode_stages_payload() {
    let (pg, staging, written) = load_analytics(AnalyticsMode::Copy).await;
    assert_eq!(written, 3);
    assert_analytics_rows(&pg).await;

    let staged = staging
        .get_string("staging/scope1-cleansed-data/fleet.json.csv")
        .await
        .unwrap();
    assert_eq!(staged.lines().count(), 3);
    assert!(staged.starts_with("\"evt-1\","));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_analytics_rewrite_replaces_rows() {
    let pg = TestPostgres::start().await.unwrap();
    let events = analytics_events().await;

    for mode in [AnalyticsMode::Single, AnalyticsMode::Batch, AnalyticsMode::Copy] {
        let writer = analytics_writer(&pg, mode, Arc::new(MemoryObjectStore::new("enriched")));

        for _ in 0..2 {
            writer
                .write_batch("scope1-cleansed-data/fleet.json", &events)
                .await
                .unwrap();
        }

        assert_eq!(count(&pg, "calculated_emissions").await, 3, "mode {}", mode);
    }

    assert_analytics_rows(&pg).await;
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_analytics_copy_keeps_null_marker_text() {
    let pg = TestPostgres::start().await.unwrap();
    let writer = analytics_writer(
        &pg,
        AnalyticsMode::Copy,
        Arc::new(MemoryObjectStore::new("enriched")),
    );
    let line = scope1_line("evt-1", 103.45).replace("\"vehicle-1234\"", r#""\\N""#);
    let events = enriched(&[line, scope2_line("evt-3", LOCATION_CATEGORY, 453.0)]).await;

    writer
        .write_batch("scope1-cleansed-data/fleet.json", &events)
        .await
        .unwrap();

    let row = sqlx::query(
        "SELECT asset_id FROM calculated_emissions WHERE activity_event_id = 'evt-1'",
    )
    .fetch_one(pg.pool())
    .await
    .unwrap();
    assert_eq!(row.get::<Option<String>, _>("asset_id").as_deref(), Some("\\N"));

    let row = sqlx::query(
        "SELECT asset_id FROM calculated_emissions WHERE activity_event_id = 'evt-3'",
    )
    .fetch_one(pg.pool())
    .await
    .unwrap();
    assert_eq!(row.get::<Option<String>, _>("asset_id"), None);
}
