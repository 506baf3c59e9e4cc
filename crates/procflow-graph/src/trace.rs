//! Run trace recording.
//!
//! When tracing is enabled via [`SimulatorConfig::trace_enabled`], the graph
//! records a [`TraceEntry`] for every successful procedure run, in the order
//! the runs completed.
//!
//! [`SimulatorConfig::trace_enabled`]: crate::config::SimulatorConfig::trace_enabled

use procflow_core::ProcId;
use serde::Serialize;
use smallvec::SmallVec;

/// A single entry in the run trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEntry {
    /// The procedure node that ran.
    pub procedure: ProcId,
    /// The procedure's label.
    pub label: String,
    /// Input ports pushed into the procedure during this run.
    pub fed_inputs: SmallVec<[String; 4]>,
    /// Output ports pulled and written during this run.
    pub written_outputs: SmallVec<[String; 4]>,
}
