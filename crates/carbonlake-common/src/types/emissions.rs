//! The `emissions_output` attachment and enriched events

use serde::{Deserialize, Serialize};

use super::event::ActivityEvent;

/// Unit of every calculated gas amount
pub const TONNES: &str = "tonnes";

/// Unit of the echoed combined emission factor
pub const KG_CO2E_PER_UNIT: &str = "kgCO2e/unit";

/// Amount with its unit, serialized as `{"amount": .., "unit": ..}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub amount: f64,
    pub unit: String,
}

impl Quantity {
    pub fn tonnes(amount: f64) -> Self {
        Self {
            amount,
            unit: TONNES.to_string(),
        }
    }

    pub fn kg_co2e_per_unit(amount: f64) -> Self {
        Self {
            amount,
            unit: KG_CO2E_PER_UNIT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculatedEmissions {
    pub co2: Quantity,
    pub ch4: Quantity,
    pub n2o: Quantity,
    pub co2e: Quantity,
}

/// Result of the emission calculation for one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionsOutput {
    pub calculated_emissions: CalculatedEmissions,
    pub emissions_factor: Quantity,
}

/// An activity event with its `emissions_output` appended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedEvent {
    #[serde(flatten)]
    pub event: ActivityEvent,
    pub emissions_output: EmissionsOutput,
}

impl EnrichedEvent {
    pub fn id(&self) -> &str {
        &self.event.activity_event_id
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_enriched_event_json_shape() {
        let event: ActivityEvent = serde_json::from_value(json!({
            "activity_event_id": "evt-1",
            "scope": 1,
            "category": "mobile-combustion",
            "activity": "Diesel Fuel - Diesel Passenger Cars",
            "raw_data": 10.0,
            "units": "gal"
        }))
        .unwrap();

        let enriched = EnrichedEvent {
            event,
            emissions_output: EmissionsOutput {
                calculated_emissions: CalculatedEmissions {
                    co2: Quantity::tonnes(0.1021),
                    ch4: Quantity::tonnes(0.0),
                    n2o: Quantity::tonnes(0.0),
                    co2e: Quantity::tonnes(0.1021),
                },
                emissions_factor: Quantity::kg_co2e_per_unit(10.21),
            },
        };

        let value = serde_json::to_value(&enriched).unwrap();
        assert_eq!(value["activity_event_id"], json!("evt-1"));
        assert_eq!(
            value["emissions_output"]["calculated_emissions"]["co2"],
            json!({"amount": 0.1021, "unit": "tonnes"})
        );
        assert_eq!(
            value["emissions_output"]["calculated_emissions"]["co2e"]["unit"],
            json!("tonnes")
        );
        assert_eq!(
            value["emissions_output"]["emissions_factor"],
            json!({"amount": 10.21, "unit": "kgCO2e/unit"})
        );

        let parsed: EnrichedEvent = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, enriched);
        assert!(parsed.event.extra.is_empty());
    }
}
