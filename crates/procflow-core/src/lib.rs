pub mod coercion;
pub mod error;
pub mod id;
pub mod procedure;
pub mod types;
pub mod value;

// Re-export commonly used types
pub use coercion::{fits, satisfies};
pub use error::ProcedureError;
pub use id::{ProcId, SlotId};
pub use procedure::{port_spec, PortSpec, Procedure};
pub use types::{Complex, TypeTag};
pub use value::{OpaqueValue, Value};
