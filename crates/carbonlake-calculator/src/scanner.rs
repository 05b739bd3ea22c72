//! Source batch discovery and parsing
//!
//! Batches are newline-delimited JSON objects stored under a fixed set of
//! prefixes in the input bucket. Every non-blank line is one activity event.

use carbonlake_common::types::{ActivityEvent, GeoPoint};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::error::{CalculatorError, Result};
use crate::storage::ObjectStore;

pub const SCOPE1_PREFIX: &str = "scope1-cleansed-data";
pub const SCOPE2_PREFIX: &str = "scope2-bill-extracted-data";
pub const DEFAULT_SOURCE_PREFIXES: [&str; 2] = [SCOPE1_PREFIX, SCOPE2_PREFIX];

/// Values given to optional event fields the source left out
#[derive(Debug, Clone, PartialEq)]
pub struct IngestDefaults {
    pub asset_id: String,
    pub geo: GeoPoint,
    pub origin_measurement_timestamp: String,
}

impl Default for IngestDefaults {
    fn default() -> Self {
        Self {
            asset_id: String::new(),
            geo: GeoPoint::new(0.0, 0.0),
            origin_measurement_timestamp: "1970-01-01 00:00:00".to_string(),
        }
    }
}

impl IngestDefaults {
    pub fn apply(&self, event: &mut ActivityEvent) {
        event.asset_id.get_or_insert_with(|| self.asset_id.clone());
        event.geo.get_or_insert(self.geo);
        event
            .origin_measurement_timestamp
            .get_or_insert_with(|| self.origin_measurement_timestamp.clone());
    }
}

/// Parsed content of one source object
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub key: String,
    pub events: Vec<ActivityEvent>,
}

pub struct IngestionScanner {
    store: Arc<dyn ObjectStore>,
    prefixes: Vec<String>,
    defaults: Option<IngestDefaults>,
}

impl IngestionScanner {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            prefixes: DEFAULT_SOURCE_PREFIXES.iter().map(|p| p.to_string()).collect(),
            defaults: Some(IngestDefaults::default()),
        }
    }

    pub fn with_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.prefixes = prefixes;
        self
    }

    /// `None` leaves missing optional fields absent
    pub fn with_defaults(mut self, defaults: Option<IngestDefaults>) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Object keys of every batch under the configured prefixes
    ///
    /// Prefixes are listed in order; a key reachable through two prefixes is
    /// returned once.
    #[instrument(skip(self), fields(bucket = %self.store.bucket()))]
    pub async fn list_batches(&self) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();

        for prefix in &self.prefixes {
            let listed = self
                .store
                .list(prefix)
                .await
                .map_err(|e| CalculatorError::SourceUnavailable(format!("{:#}", e)))?;

            debug!(prefix = %prefix, count = listed.len(), "Listed source prefix");

            for key in listed {
                if key.ends_with('/') {
                    continue;
                }
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }
        }

        info!(batches = keys.len(), "Discovered source batches");

        Ok(keys)
    }

    /// Read and parse one batch
    #[instrument(skip(self), fields(bucket = %self.store.bucket()))]
    pub async fn read_batch(&self, key: &str) -> Result<SourceBatch> {
        let bytes = self
            .store
            .get(key)
            .await
            .map_err(|e| CalculatorError::SourceUnavailable(format!("{:#}", e)))?;

        let content = String::from_utf8(bytes).map_err(|_| {
            CalculatorError::InvalidInput(format!("{}: object is not valid UTF-8", key))
        })?;

        let mut events = parse_events(key, &content)?;
        if let Some(defaults) = &self.defaults {
            events.iter_mut().for_each(|e| defaults.apply(e));
        }

        debug!(events = events.len(), "Parsed source batch");

        Ok(SourceBatch {
            key: key.to_string(),
            events,
        })
    }
}

/// Parse newline-delimited events, skipping blank lines
///
/// Errors name the object key and the 1-based line number.
pub fn parse_events(key: &str, content: &str) -> Result<Vec<ActivityEvent>> {
    content
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
        .map(|(line_no, line)| {
            serde_json::from_str::<ActivityEvent>(line).map_err(|e| {
                CalculatorError::InvalidInput(format!("{} line {}: {}", key, line_no, e))
            })
        })
        .collect()
}
