//! Domain types shared across CarbonLake
//!
//! - [`ActivityEvent`]: one reported physical activity read from a source batch
//! - [`EmissionFactorCoefficients`]: conversion constants for a (category, activity) pair
//! - [`EmissionsOutput`]: the `emissions_output` attachment written by the calculator
//! - [`Gas`] / [`GwpStandard`]: global warming potential lookup tables

mod coefficients;
mod emissions;
mod event;
mod gas;

pub use coefficients::{parse_factor, EmissionFactorCoefficients};
pub use emissions::{
    CalculatedEmissions, EmissionsOutput, EnrichedEvent, Quantity, KG_CO2E_PER_UNIT, TONNES,
};
pub use event::{ActivityEvent, GeoPoint, Scope};
pub use gas::{Gas, GwpStandard, GwpTable, AR4_GWP, AR5_GWP};
