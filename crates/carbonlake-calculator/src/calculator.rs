//! Emission calculation
//!
//! For each direct gas the emitted mass in tonnes is
//! `raw_quantity * factor / 1000`, the factor being kilograms per unit of
//! activity (absent factors count as zero). The CO2-equivalent is the sum of
//! the gas masses weighted by the global warming potentials of the selected
//! assessment report. The report's combined kgCO2e-per-unit factor is echoed
//! unchanged as `emissions_factor`.

use carbonlake_common::types::{
    ActivityEvent, CalculatedEmissions, EmissionFactorCoefficients, EmissionsOutput, Gas,
    GwpStandard, Quantity,
};

use crate::error::{CalculatorError, Result};

const KG_PER_TONNE: f64 = 1000.0;

/// Pure, stateless emission calculator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmissionCalculator {
    standard: GwpStandard,
}

impl EmissionCalculator {
    pub fn new(standard: GwpStandard) -> Self {
        Self { standard }
    }

    pub fn standard(&self) -> GwpStandard {
        self.standard
    }

    /// Tonnes of gas for `raw_quantity` units at `factor` kg/unit
    pub fn gas_emission(raw_quantity: f64, factor: Option<f64>) -> f64 {
        raw_quantity * factor.unwrap_or(0.0) / KG_PER_TONNE
    }

    /// GWP-weighted CO2-equivalent of the three direct gases
    pub fn co2e(&self, co2: f64, ch4: f64, n2o: f64) -> f64 {
        let gwp = self.standard.potentials();
        co2 * gwp.get(Gas::Co2) + ch4 * gwp.get(Gas::Ch4) + n2o * gwp.get(Gas::N2o)
    }

    pub fn calculate(
        &self,
        raw_quantity: f64,
        coefficients: &EmissionFactorCoefficients,
    ) -> Result<EmissionsOutput> {
        if !raw_quantity.is_finite() {
            return Err(CalculatorError::InvalidInput(format!(
                "raw quantity must be finite, got {}",
                raw_quantity
            )));
        }

        let co2 = Self::gas_emission(raw_quantity, coefficients.co2_factor);
        let ch4 = Self::gas_emission(raw_quantity, coefficients.ch4_factor);
        let n2o = Self::gas_emission(raw_quantity, coefficients.n2o_factor);
        let co2e = self.co2e(co2, ch4, n2o);
        let factor = coefficients.combined_factor(self.standard).unwrap_or(0.0);

        Ok(EmissionsOutput {
            calculated_emissions: CalculatedEmissions {
                co2: Quantity::tonnes(co2),
                ch4: Quantity::tonnes(ch4),
                n2o: Quantity::tonnes(n2o),
                co2e: Quantity::tonnes(co2e),
            },
            emissions_factor: Quantity::kg_co2e_per_unit(factor),
        })
    }

    /// Calculate for an event, validating its `raw_data` first
    pub fn calculate_event(
        &self,
        event: &ActivityEvent,
        coefficients: &EmissionFactorCoefficients,
    ) -> Result<EmissionsOutput> {
        let raw_quantity = event.raw_quantity()?;
        self.calculate(raw_quantity, coefficients)
    }
}
