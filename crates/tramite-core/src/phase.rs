//! Procedure lifecycle phases

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One stage of a procedure's lifecycle, in common-flow order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Information,
    Requirements,
    Documentation,
    Payment,
    Tracking,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Information,
        Phase::Requirements,
        Phase::Documentation,
        Phase::Payment,
        Phase::Tracking,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Information => "information",
            Self::Requirements => "requirements",
            Self::Documentation => "documentation",
            Self::Payment => "payment",
            Self::Tracking => "tracking",
        }
    }

    /// Position in the common flow
    pub fn rank(&self) -> u8 {
        match self {
            Self::Information => 0,
            Self::Requirements => 1,
            Self::Documentation => 2,
            Self::Payment => 3,
            Self::Tracking => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Tracking)
    }

    /// Does moving from `self` to `to` leave the requirements gate behind?
    ///
    /// Only forward moves that land beyond `requirements` are gated.
    pub fn crosses_requirements_gate(&self, to: Phase) -> bool {
        to.rank() > self.rank() && to.rank() > Phase::Requirements.rank()
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "information" => Ok(Self::Information),
            "requirements" => Ok(Self::Requirements),
            "documentation" => Ok(Self::Documentation),
            "payment" => Ok(Self::Payment),
            "tracking" => Ok(Self::Tracking),
            _ => Err(format!("Unknown phase: {}", s)),
        }
    }
}
