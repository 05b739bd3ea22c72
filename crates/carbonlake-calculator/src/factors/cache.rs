//! Per-run factor memoization
//!
//! Entries live for the lifetime of the cache, which is owned by one run.
//! Concurrent lookups of the same key share one repository call; a failed
//! lookup leaves the slot empty so a later lookup tries again.

use carbonlake_common::types::EmissionFactorCoefficients;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use tracing::debug;

use super::{FactorKey, FactorRepository};
use crate::error::Result;

type Slot = Arc<OnceCell<Arc<EmissionFactorCoefficients>>>;

/// Hit/miss counters of a [`FactorCache`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

pub struct FactorCache {
    repository: Arc<dyn FactorRepository>,
    slots: Mutex<HashMap<FactorKey, Slot>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FactorCache {
    pub fn new(repository: Arc<dyn FactorRepository>) -> Self {
        Self {
            repository,
            slots: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Coefficients for the ordered pair, fetched at most once per run
    pub async fn get(
        &self,
        category: &str,
        activity: &str,
    ) -> Result<Arc<EmissionFactorCoefficients>> {
        let key = FactorKey::new(category, activity);
        let slot = self.slot(&key);

        if let Some(coefficients) = slot.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(coefficients));
        }

        let fetched = AtomicBool::new(false);
        let (repository, fetched_ref, key_ref) = (&self.repository, &fetched, &key);
        let coefficients = match slot
            .get_or_try_init(move || async move {
                fetched_ref.store(true, Ordering::Relaxed);
                debug!(key = %key_ref, "Emission factor cache miss");
                repository.get(category, activity).await.map(Arc::new)
            })
            .await
        {
            Ok(coefficients) => coefficients,
            Err(e) => {
                self.release(&key, &slot);
                return Err(e);
            },
        };

        if fetched.load(Ordering::Relaxed) {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }

        Ok(Arc::clone(coefficients))
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| slot.initialized())
            .count();

        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries,
        }
    }

    fn slot(&self, key: &FactorKey) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    /// Drop a slot whose lookup failed, unless another caller has filled it
    fn release(&self, key: &FactorKey, slot: &Slot) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let empty = slots
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && !current.initialized());
        if empty {
            slots.remove(key);
        }
    }
}

impl std::fmt::Debug for FactorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactorCache").field("stats", &self.stats()).finish()
    }
}
