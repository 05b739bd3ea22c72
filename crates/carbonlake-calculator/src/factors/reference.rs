//! Reference emission factor document
//!
//! The document is a JSON array; every entry nests its coefficients under
//! `emissions_factor_standards.ghg.coefficients`. Factors are usually strings
//! because the published tables leave some of them empty.

use carbonlake_common::types::{parse_factor, EmissionFactorCoefficients};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::FactorKey;
use crate::error::{CalculatorError, Result};

/// One row of the reference table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionFactorRecord {
    pub category: String,
    pub activity: String,
    pub scope: i16,
    pub coefficients: EmissionFactorCoefficients,
    pub last_updated: Option<String>,
    pub source: Option<String>,
    pub source_origin: Option<String>,
}

impl EmissionFactorRecord {
    pub fn key(&self) -> FactorKey {
        FactorKey::new(&self.category, &self.activity)
    }
}

/// Number or string as found in the document
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawValue {
    Number(f64),
    Text(String),
}

impl RawValue {
    fn into_factor(self, field: &str) -> Result<Option<f64>> {
        match self {
            RawValue::Number(n) => Ok(parse_factor(field, &n.to_string())?),
            RawValue::Text(s) => Ok(parse_factor(field, &s)?),
        }
    }

    fn into_text(self) -> Option<String> {
        let text = match self {
            RawValue::Number(n) => n.to_string(),
            RawValue::Text(s) => s,
        };
        (!text.trim().is_empty()).then_some(text)
    }
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    category: String,
    activity: String,
    scope: RawValue,
    emissions_factor_standards: RawStandards,
}

#[derive(Debug, Deserialize)]
struct RawStandards {
    ghg: RawGhg,
}

#[derive(Debug, Deserialize)]
struct RawGhg {
    coefficients: RawCoefficients,
    last_updated: Option<RawValue>,
    source: Option<RawValue>,
    source_origin: Option<RawValue>,
}

#[derive(Debug, Deserialize)]
struct RawCoefficients {
    co2_factor: Option<RawValue>,
    ch4_factor: Option<RawValue>,
    n2o_factor: Option<RawValue>,
    biofuel_co2: Option<RawValue>,
    #[serde(rename = "AR4-kgco2e")]
    ar4_kgco2e: Option<RawValue>,
    #[serde(rename = "AR5-kgco2e")]
    ar5_kgco2e: Option<RawValue>,
    units: Option<RawValue>,
}

fn factor(value: Option<RawValue>, field: &str) -> Result<Option<f64>> {
    match value {
        Some(v) => v.into_factor(field),
        None => Ok(None),
    }
}

impl TryFrom<RawEntry> for EmissionFactorRecord {
    type Error = CalculatorError;

    fn try_from(entry: RawEntry) -> Result<Self> {
        let scope = match entry.scope {
            RawValue::Number(n) if n.fract() == 0.0 && n > 0.0 && n < 16.0 => n as i16,
            RawValue::Text(s) => s.trim().parse::<i16>().map_err(|_| {
                CalculatorError::InvalidInput(format!(
                    "{} / {}: invalid scope '{}'",
                    entry.category, entry.activity, s
                ))
            })?,
            RawValue::Number(n) => {
                return Err(CalculatorError::InvalidInput(format!(
                    "{} / {}: invalid scope {}",
                    entry.category, entry.activity, n
                )))
            },
        };

        let ghg = entry.emissions_factor_standards.ghg;
        let c = ghg.coefficients;
        let coefficients = EmissionFactorCoefficients {
            co2_factor: factor(c.co2_factor, "co2_factor")?,
            ch4_factor: factor(c.ch4_factor, "ch4_factor")?,
            n2o_factor: factor(c.n2o_factor, "n2o_factor")?,
            biofuel_co2: factor(c.biofuel_co2, "biofuel_co2")?,
            ar4_kgco2e: factor(c.ar4_kgco2e, "AR4-kgco2e")?,
            ar5_kgco2e: factor(c.ar5_kgco2e, "AR5-kgco2e")?,
            units: c.units.and_then(RawValue::into_text),
        };

        Ok(Self {
            category: entry.category,
            activity: entry.activity,
            scope,
            coefficients,
            last_updated: ghg.last_updated.and_then(RawValue::into_text),
            source: ghg.source.and_then(RawValue::into_text),
            source_origin: ghg.source_origin.and_then(RawValue::into_text),
        })
    }
}

/// Parse the reference document
///
/// Every factor is validated and the whole document is rejected if any
/// (category, activity) pair appears more than once.
pub fn load_reference_document(bytes: &[u8]) -> Result<Vec<EmissionFactorRecord>> {
    let entries: Vec<RawEntry> = serde_json::from_slice(bytes)?;

    let records = entries
        .into_iter()
        .map(EmissionFactorRecord::try_from)
        .collect::<Result<Vec<_>>>()?;

    check_duplicates(&records)?;

    Ok(records)
}

fn check_duplicates(records: &[EmissionFactorRecord]) -> Result<()> {
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();

    for record in records {
        let key = record.key();
        if !seen.insert(key.clone()) {
            duplicates.push(key.to_string());
        }
    }

    if duplicates.is_empty() {
        Ok(())
    } else {
        Err(CalculatorError::InvalidInput(format!(
            "duplicates found in emission factors: {}",
            duplicates.join(", ")
        )))
    }
}
