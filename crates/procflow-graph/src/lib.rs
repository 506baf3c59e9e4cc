pub mod builder;
pub mod config;
pub mod error;
pub mod graph;
pub mod node;
pub mod simulator;
pub mod slot;
pub mod trace;

// Re-export commonly used types
pub use builder::{build, Link, Pattern};
pub use config::SimulatorConfig;
pub use error::{BindError, BuildError, BuildErrorKind, LinkError, RunError, SimulatorError, SlotError};
pub use graph::{Graph, Vertex};
pub use node::ProcedureNode;
pub use simulator::Simulator;
pub use slot::{SlotState, ValueSlot};
pub use trace::TraceEntry;
