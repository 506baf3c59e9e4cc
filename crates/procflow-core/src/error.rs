//! Errors reported by procedures.
//!
//! Uses `thiserror` for structured, matchable error variants covering every
//! way an adapter can refuse an input or fail to deliver an output.

use thiserror::Error;

use crate::types::TypeTag;

/// Errors produced by [`Procedure`](crate::procedure::Procedure)
/// implementations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProcedureError {
    /// The port name is not declared by the procedure.
    #[error("invalid port name: '{name}'")]
    InvalidName { name: String },

    /// The value's type does not satisfy the port type.
    #[error("incompatible type for '{name}': expected {expected}, got {got}")]
    IncompatibleType {
        name: String,
        expected: TypeTag,
        got: TypeTag,
    },

    /// The value is well typed but outside the procedure's domain.
    #[error("invalid value for '{name}': {reason}")]
    InvalidValue { name: String, reason: String },

    /// An output was requested before every input received a value.
    #[error("inputs incomplete: missing {}", .missing.join(", "))]
    InputsIncomplete { missing: Vec<String> },

    /// The computation itself failed.
    #[error("run failed: {reason}")]
    RunFailed { reason: String },

    /// The computation succeeded but did not produce a declared output.
    #[error("output '{name}' was not produced")]
    IncompleteOutput { name: String },
}

impl ProcedureError {
    pub fn invalid_name(name: impl Into<String>) -> Self {
        ProcedureError::InvalidName { name: name.into() }
    }

    pub fn run_failed(reason: impl Into<String>) -> Self {
        ProcedureError::RunFailed {
            reason: reason.into(),
        }
    }
}
