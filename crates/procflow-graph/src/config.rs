//! Simulator configuration.

use serde::{Deserialize, Serialize};

/// Configuration for a [`Simulator`](crate::simulator::Simulator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Maximum depth of the validate/run recursion. Default: 256.
    pub max_depth: usize,
    /// Whether to record a [`TraceEntry`](crate::trace::TraceEntry) per
    /// procedure run.
    pub trace_enabled: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            max_depth: 256,
            trace_enabled: false,
        }
    }
}

impl SimulatorConfig {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
