//! Greenhouse gases and their global warming potentials (100-year horizon)

use serde::{Deserialize, Serialize};

use crate::error::CommonError;

/// Greenhouse gases tracked by the emission factor tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gas {
    /// Carbon dioxide
    Co2,
    /// Methane
    Ch4,
    /// Nitrous oxide
    N2o,
    /// Nitrogen trifluoride
    Nf3,
    /// Sulfur hexafluoride
    Sf6,
}

impl Gas {
    pub const ALL: [Gas; 5] = [Gas::Co2, Gas::Ch4, Gas::N2o, Gas::Nf3, Gas::Sf6];

    pub fn as_str(self) -> &'static str {
        match self {
            Gas::Co2 => "co2",
            Gas::Ch4 => "ch4",
            Gas::N2o => "n2o",
            Gas::Nf3 => "nf3",
            Gas::Sf6 => "sf6",
        }
    }
}

impl std::fmt::Display for Gas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable gas -> CO2-equivalent multiplier mapping
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GwpTable {
    pub co2: f64,
    pub ch4: f64,
    pub n2o: f64,
    pub nf3: f64,
    pub sf6: f64,
}

impl GwpTable {
    pub const fn get(&self, gas: Gas) -> f64 {
        match gas {
            Gas::Co2 => self.co2,
            Gas::Ch4 => self.ch4,
            Gas::N2o => self.n2o,
            Gas::Nf3 => self.nf3,
            Gas::Sf6 => self.sf6,
        }
    }
}

/// IPCC Fifth Assessment Report values
pub const AR5_GWP: GwpTable = GwpTable {
    co2: 1.0,
    ch4: 28.0,
    n2o: 265.0,
    nf3: 16_100.0,
    sf6: 23_500.0,
};

/// IPCC Fourth Assessment Report values
pub const AR4_GWP: GwpTable = GwpTable {
    co2: 1.0,
    ch4: 25.0,
    n2o: 298.0,
    nf3: 17_200.0,
    sf6: 22_800.0,
};

/// Assessment report whose warming potentials and combined factor are used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GwpStandard {
    Ar4,
    #[default]
    Ar5,
}

impl GwpStandard {
    pub const fn potentials(self) -> &'static GwpTable {
        match self {
            GwpStandard::Ar4 => &AR4_GWP,
            GwpStandard::Ar5 => &AR5_GWP,
        }
    }
}

impl std::str::FromStr for GwpStandard {
    type Err = CommonError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ar4" => Ok(GwpStandard::Ar4),
            "ar5" => Ok(GwpStandard::Ar5),
            other => Err(CommonError::Config(format!("Invalid GWP standard: {}", other))),
        }
    }
}

impl std::fmt::Display for GwpStandard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GwpStandard::Ar4 => write!(f, "ar4"),
            GwpStandard::Ar5 => write!(f, "ar5"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_ar5_potentials() {
        let gwp = GwpStandard::Ar5.potentials();
        assert_eq!(gwp.get(Gas::Co2), 1.0);
        assert_eq!(gwp.get(Gas::Ch4), 28.0);
        assert_eq!(gwp.get(Gas::N2o), 265.0);
        assert_eq!(gwp.get(Gas::Nf3), 16_100.0);
        assert_eq!(gwp.get(Gas::Sf6), 23_500.0);
    }

    #[test]
    fn test_ar4_potentials() {
        let gwp = GwpStandard::Ar4.potentials();
        assert_eq!(gwp.get(Gas::Ch4), 25.0);
        assert_eq!(gwp.get(Gas::N2o), 298.0);
    }

    #[test]
    fn test_default_standard_is_ar5() {
        assert_eq!(GwpStandard::default(), GwpStandard::Ar5);
    }

    #[test]
    fn test_standard_from_str() {
        assert_eq!("AR4".parse::<GwpStandard>().unwrap(), GwpStandard::Ar4);
        assert_eq!(" ar5 ".parse::<GwpStandard>().unwrap(), GwpStandard::Ar5);
        assert!("ar6".parse::<GwpStandard>().is_err());
    }

    #[test]
    fn test_gas_names() {
        let names: Vec<&str> = Gas::ALL.iter().map(|g| g.as_str()).collect();
        assert_eq!(names, vec!["co2", "ch4", "n2o", "nf3", "sf6"]);
    }
}
