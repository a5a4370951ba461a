//! Adapter factory
//!
//! Maps the `adapter` field of a channel configuration to a concrete backend.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::simulation::SimulationAdapter;
use super::traits::CanAdapter;

/// Adapter backend selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    /// Virtual bus, frames are only exchanged between clients
    #[default]
    None,
    Simulation,
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterKind::None => write!(f, "none"),
            AdapterKind::Simulation => write!(f, "simulation"),
        }
    }
}

impl FromStr for AdapterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(AdapterKind::None),
            "simulation" | "sim" => Ok(AdapterKind::Simulation),
            other => Err(format!("Unknown adapter type: {other}")),
        }
    }
}

/// Create the adapter for `kind`, `None` for a virtual bus
pub fn create_adapter(kind: AdapterKind, channel_name: &str) -> Option<Box<dyn CanAdapter>> {
    match kind {
        AdapterKind::None => None,
        AdapterKind::Simulation => Some(Box::new(SimulationAdapter::new(format!(
            "Simulation ({channel_name})"
        )))),
    }
}
