//! Emission factor lookup
//!
//! - [`FactorRepository`]: read access to the reference table
//! - [`FactorCache`]: per-run memoization in front of a repository
//! - [`load_reference_document`]: parsing of the published factor document

use async_trait::async_trait;
use carbonlake_common::types::EmissionFactorCoefficients;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod cache;
pub mod reference;
pub mod repository;

pub use cache::{CacheStats, FactorCache};
pub use reference::{load_reference_document, EmissionFactorRecord};
pub use repository::{InMemoryFactorRepository, PgFactorRepository, DEFAULT_SEED_CHUNK_SIZE};

/// Lookup key of the reference table
///
/// Ordered pair: `("c", "a")` and `("a", "c")` are distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FactorKey {
    pub category: String,
    pub activity: String,
}

impl FactorKey {
    pub fn new(category: impl Into<String>, activity: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            activity: activity.into(),
        }
    }
}

impl std::fmt::Display for FactorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {}", self.category, self.activity)
    }
}

/// Read access to emission factors
///
/// Implementations do not retry; `NotFound` is returned when no row matches
/// the exact pair.
#[async_trait]
pub trait FactorRepository: Send + Sync {
    async fn get(&self, category: &str, activity: &str) -> Result<EmissionFactorCoefficients>;
}
