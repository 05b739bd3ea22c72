//! Emission factor coefficients for one (category, activity) pair

use serde::{Deserialize, Serialize};

use super::gas::GwpStandard;
use crate::error::{CommonError, Result};

/// Scientific conversion constants, in kilograms per unit of activity
///
/// `None` means the reference data left the factor empty; it counts as zero
/// in calculations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EmissionFactorCoefficients {
    pub co2_factor: Option<f64>,
    pub ch4_factor: Option<f64>,
    pub n2o_factor: Option<f64>,
    pub biofuel_co2: Option<f64>,
    pub ar4_kgco2e: Option<f64>,
    pub ar5_kgco2e: Option<f64>,
    pub units: Option<String>,
}

impl EmissionFactorCoefficients {
    /// Combined kgCO2e-per-unit factor published for `standard`
    pub fn combined_factor(&self, standard: GwpStandard) -> Option<f64> {
        match standard {
            GwpStandard::Ar4 => self.ar4_kgco2e,
            GwpStandard::Ar5 => self.ar5_kgco2e,
        }
    }

    /// Reject negative or non-finite factors
    pub fn validate(&self) -> Result<()> {
        let factors = [
            ("co2_factor", self.co2_factor),
            ("ch4_factor", self.ch4_factor),
            ("n2o_factor", self.n2o_factor),
            ("biofuel_co2", self.biofuel_co2),
            ("AR4_kgco2e", self.ar4_kgco2e),
            ("AR5_kgco2e", self.ar5_kgco2e),
        ];

        for (field, value) in factors {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(CommonError::InvalidFactor {
                        field: field.to_string(),
                        value: v.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Parse a factor as stored in the reference data (empty string = absent)
pub fn parse_factor(field: &str, raw: &str) -> Result<Option<f64>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let value = trimmed
        .parse::<f64>()
        .map_err(|_| CommonError::InvalidFactor {
            field: field.to_string(),
            value: raw.to_string(),
        })?;

    if !value.is_finite() || value < 0.0 {
        return Err(CommonError::InvalidFactor {
            field: field.to_string(),
            value: raw.to_string(),
        });
    }

    Ok(Some(value))
}
