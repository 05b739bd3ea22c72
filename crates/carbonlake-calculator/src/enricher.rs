//! Batch enrichment
//!
//! Resolves the emission factor of every event through the run's
//! [`FactorCache`] and attaches the calculated `emissions_output`. Output
//! order always follows input order.

use carbonlake_common::types::{ActivityEvent, EnrichedEvent};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::calculator::EmissionCalculator;
use crate::error::{CalculatorError, Result};
use crate::factors::FactorCache;

const EMISSIONS_OUTPUT_KEY: &str = "emissions_output";

/// What to do with an event that cannot be enriched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// The first failing event fails the whole batch
    #[default]
    Strict,
    /// Failing events are left out and reported
    Lenient,
}

impl FromStr for FailurePolicy {
    type Err = CalculatorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(FailurePolicy::Strict),
            "lenient" => Ok(FailurePolicy::Lenient),
            other => Err(CalculatorError::Config(format!(
                "Invalid failure policy: {}",
                other
            ))),
        }
    }
}

/// Event left out of a lenient enrichment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedEvent {
    /// Position in the input batch
    pub index: usize,
    pub activity_event_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct EnrichmentReport {
    pub events: Vec<EnrichedEvent>,
    pub skipped: Vec<SkippedEvent>,
}

impl EnrichmentReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

pub struct EventEnricher {
    cache: Arc<FactorCache>,
    calculator: EmissionCalculator,
    policy: FailurePolicy,
}

impl EventEnricher {
    pub fn new(cache: Arc<FactorCache>, calculator: EmissionCalculator) -> Self {
        Self {
            cache,
            calculator,
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn cache(&self) -> &Arc<FactorCache> {
        &self.cache
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Enrich a single event
    ///
    /// An `emissions_output` already present on the input is replaced.
    pub async fn enrich_event(&self, mut event: ActivityEvent) -> Result<EnrichedEvent> {
        event.extra.remove(EMISSIONS_OUTPUT_KEY);

        let coefficients = self.cache.get(&event.category, &event.activity).await?;
        let emissions_output = self.calculator.calculate_event(&event, &coefficients)?;

        Ok(EnrichedEvent {
            event,
            emissions_output,
        })
    }

    /// Enrich a batch according to the configured failure policy
    pub async fn enrich(&self, events: Vec<ActivityEvent>) -> Result<EnrichmentReport> {
        let mut report = EnrichmentReport {
            events: Vec::with_capacity(events.len()),
            skipped: Vec::new(),
        };

        for (index, event) in events.into_iter().enumerate() {
            let id = event.activity_event_id.clone();

            match self.enrich_event(event).await {
                Ok(enriched) => report.events.push(enriched),
                Err(e) => match self.policy {
                    FailurePolicy::Strict => {
                        debug!(index, activity_event_id = %id, error = %e, "Enrichment failed");
                        return Err(e);
                    },
                    FailurePolicy::Lenient => {
                        warn!(index, activity_event_id = %id, error = %e, "Skipping event");
                        report.skipped.push(SkippedEvent {
                            index,
                            activity_event_id: id,
                            reason: e.to_string(),
                        });
                    },
                },
            }
        }

        Ok(report)
    }
}
