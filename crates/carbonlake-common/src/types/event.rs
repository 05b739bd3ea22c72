//! Activity events as they arrive in the cleansed / bill-extracted batches

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CommonError, Result};

/// Geographic point attached to an event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct GeoPoint {
    pub lat: f64,
    pub long: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, long: f64) -> Self {
        Self { lat, long }
    }
}

/// GHG accounting scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Scope {
    /// Direct emissions (fuel burnt by owned assets)
    Direct = 1,
    /// Purchased energy
    PurchasedEnergy = 2,
}

impl TryFrom<u8> for Scope {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Scope::Direct),
            2 => Ok(Scope::PurchasedEnergy),
            other => Err(format!("scope must be 1 or 2, got {}", other)),
        }
    }
}

impl From<Scope> for u8 {
    fn from(scope: Scope) -> Self {
        scope as u8
    }
}

/// One reported physical activity (fuel purchase, energy bill, ...)
///
/// Fields not modelled here are kept in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub activity_event_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_measurement_timestamp: Option<String>,
    pub scope: Scope,
    pub category: String,
    pub activity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Reported quantity; validated when emissions are calculated
    #[serde(default)]
    pub raw_data: Value,
    pub units: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ActivityEvent {
    /// Numeric value of `raw_data`
    ///
    /// Numbers and numeric strings are accepted; anything else (including a
    /// missing field) is `InvalidInput`.
    pub fn raw_quantity(&self) -> Result<f64> {
        let quantity = match &self.raw_data {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };

        match quantity {
            Some(q) if q.is_finite() => Ok(q),
            _ => Err(CommonError::InvalidInput(format!(
                "event {}: raw_data must be a finite number, got {}",
                self.activity_event_id, self.raw_data
            ))),
        }
    }
}
