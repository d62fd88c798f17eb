// Tech Type module - supply options and their electrification codes
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supply options a settlement can be electrified with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TechKind {
    Grid,
    SaDiesel,
    SaPv,
    MgDiesel,
    MgPv,
    MgWind,
    MgHydro,
}

/// How a technology delivers electricity, which decides its network costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupplyCategory {
    Grid,
    MiniGrid,
    Standalone,
}

impl TechKind {
    pub const ALL: [TechKind; 7] = [
        TechKind::Grid,
        TechKind::SaDiesel,
        TechKind::SaPv,
        TechKind::MgDiesel,
        TechKind::MgPv,
        TechKind::MgWind,
        TechKind::MgHydro,
    ];

    pub const OFF_GRID: [TechKind; 6] = [
        TechKind::SaDiesel,
        TechKind::SaPv,
        TechKind::MgDiesel,
        TechKind::MgPv,
        TechKind::MgWind,
        TechKind::MgHydro,
    ];

    /// Final electrification code written to the results table.
    pub fn code(&self) -> u8 {
        match self {
            TechKind::Grid => 1,
            TechKind::SaDiesel => 2,
            TechKind::SaPv => 3,
            TechKind::MgDiesel => 4,
            TechKind::MgPv => 5,
            TechKind::MgWind => 6,
            TechKind::MgHydro => 7,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        TechKind::ALL.iter().copied().find(|t| t.code() == code)
    }

    pub fn category(&self) -> SupplyCategory {
        match self {
            TechKind::Grid => SupplyCategory::Grid,
            TechKind::SaDiesel | TechKind::SaPv => SupplyCategory::Standalone,
            TechKind::MgDiesel | TechKind::MgPv | TechKind::MgWind | TechKind::MgHydro => {
                SupplyCategory::MiniGrid
            }
        }
    }

    pub fn burns_diesel(&self) -> bool {
        matches!(self, TechKind::SaDiesel | TechKind::MgDiesel)
    }

    /// Column label used in the results table.
    pub fn label(&self) -> &'static str {
        match self {
            TechKind::Grid => "Grid",
            TechKind::SaDiesel => "SA_Diesel",
            TechKind::SaPv => "SA_PV",
            TechKind::MgDiesel => "MG_Diesel",
            TechKind::MgPv => "MG_PV",
            TechKind::MgWind => "MG_Wind",
            TechKind::MgHydro => "MG_Hydro",
        }
    }
}

impl fmt::Display for TechKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for TechKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TechKind::ALL
            .iter()
            .copied()
            .find(|t| t.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown technology: {}", s))
    }
}
