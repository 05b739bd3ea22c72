//! CarbonLake Emissions Calculator
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Enriches activity events (fuel purchases, energy bills) with their
//! greenhouse gas emissions and writes the enriched batches downstream.
//!
//! # Overview
//!
//! - **Scanner**: lists and parses the newline-delimited source batches
//! - **Factors**: emission factor lookup with a per-run cache
//! - **Calculator**: per-gas tonnages and the GWP-weighted CO2-equivalent
//! - **Enricher**: applies the calculator to a batch under a failure policy
//! - **Sinks**: raw NDJSON batches, an id-keyed row store and an analytics table
//! - **Pipeline**: runs the above batch by batch
//!
//! Collaborators sit behind traits ([`storage::ObjectStore`],
//! [`factors::FactorRepository`], [`sinks::RowStore`]) with S3/PostgreSQL
//! adapters and in-memory ones for tests and offline use.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use carbonlake_calculator::{
//!     calculator::EmissionCalculator,
//!     enricher::EventEnricher,
//!     factors::{FactorCache, FactorRepository, InMemoryFactorRepository},
//!     pipeline::CalculatorPipeline,
//!     scanner::IngestionScanner,
//!     sinks::RawBatchWriter,
//!     storage::MemoryObjectStore,
//! };
//!
//! # async fn example() -> carbonlake_calculator::error::Result<()> {
//! let source = Arc::new(MemoryObjectStore::new("transformed"));
//! let output = Arc::new(MemoryObjectStore::new("enriched"));
//! let factors: Arc<dyn FactorRepository> = Arc::new(InMemoryFactorRepository::new());
//!
//! let enricher = EventEnricher::new(
//!     Arc::new(FactorCache::new(factors)),
//!     EmissionCalculator::default(),
//! );
//! let summary = CalculatorPipeline::new(IngestionScanner::new(source), enricher)
//!     .with_sink(Arc::new(RawBatchWriter::new(output)))
//!     .run()
//!     .await?;
//! println!("enriched {} events", summary.events_enriched());
//! # Ok(())
//! # }
//! ```

pub mod calculator;
pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod enricher;
pub mod error;
pub mod factors;
pub mod pipeline;
pub mod scanner;
pub mod sinks;
pub mod storage;

pub use error::{CalculatorError, Result};
