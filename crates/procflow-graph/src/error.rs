//! Error types for graph construction and execution.
//!
//! Every fallible operation reports one of a fixed set of outcomes through a
//! `thiserror` enum. Runtime failures nest: a failed `get` wraps the slot
//! failure, which wraps the failed procedure run, which wraps the failure of
//! its input, and so on down to the deepest cause. Walk the chain with
//! [`std::error::Error::source`] or [`SimulatorError::root_cause`].

use procflow_core::{ProcId, ProcedureError, TypeTag};
use serde::Serialize;
use thiserror::Error;

/// Errors from linking a node to a [`ValueSlot`](crate::slot::ValueSlot).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    /// The node is already linked to the slot as producer or consumer.
    #[error("slot '{slot}' is already linked to procedure {node}")]
    AlreadyLinked { slot: String, node: ProcId },

    /// The slot already has a producer.
    #[error("slot '{slot}' already has a producer")]
    TooManyProducers { slot: String },
}

/// Errors from binding a slot to a port of a
/// [`ProcedureNode`](crate::node::ProcedureNode).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindError {
    #[error("'{port}' is not a port of this procedure")]
    InvalidSlotName { port: String },

    #[error("port '{port}' is already bound")]
    SlotOccupied { port: String },

    #[error("port '{port}': slot '{slot}' is already linked to this procedure")]
    AlreadyLinked { port: String, slot: String },

    #[error("port '{port}': slot '{slot}' already has a producer")]
    TooManyProducers { port: String, slot: String },

    #[error("port '{port}': slot '{slot}' has type {slot_type}, port has type {port_type}")]
    IncompatibleType {
        port: String,
        slot: String,
        slot_type: TypeTag,
        port_type: TypeTag,
    },
}

/// Runtime errors of a [`ValueSlot`](crate::slot::ValueSlot).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SlotError {
    /// A written value does not satisfy the slot type.
    #[error("slot '{slot}' expects {expected}, got {got}")]
    IncompatibleType {
        slot: String,
        expected: TypeTag,
        got: TypeTag,
    },

    #[error("procedure {node} is not a consumer of slot '{slot}'")]
    NotAConsumer { slot: String, node: ProcId },

    #[error("slot '{slot}' holds no value to acknowledge")]
    StateIsInvalid { slot: String },

    /// The slot is invalid and nothing can produce it: a dangling input.
    #[error("slot '{slot}' has no value and no producer")]
    NoProducer { slot: String },

    #[error("slot '{slot}' has no value")]
    NoValue { slot: String },

    /// The producer of the slot failed to run.
    #[error("producing slot '{slot}' failed")]
    InputProductionFailed {
        slot: String,
        #[source]
        source: Box<RunError>,
    },

    #[error("validating slot '{slot}' exceeded the depth limit of {limit}")]
    DepthLimitExceeded { slot: String, limit: usize },
}

/// Errors from running a [`ProcedureNode`](crate::node::ProcedureNode).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RunError {
    /// An input slot could not be brought up to date.
    #[error("{procedure}: input '{port}' failed validation")]
    InputValidationFailed {
        procedure: String,
        port: String,
        #[source]
        source: Box<SlotError>,
    },

    /// The procedure refused an input value.
    #[error("{procedure}: input '{port}' was rejected")]
    InputRejected {
        procedure: String,
        port: String,
        #[source]
        source: ProcedureError,
    },

    /// The procedure failed to deliver an output.
    #[error("{procedure}: procedure failed on output '{port}'")]
    ProcedureFailed {
        procedure: String,
        port: String,
        #[source]
        source: ProcedureError,
    },

    /// The procedure delivered an output its slot refused.
    #[error("{procedure}: procedure failed writing output '{port}'")]
    OutputRejected {
        procedure: String,
        port: String,
        #[source]
        source: Box<SlotError>,
    },

    /// The procedure reported success without populating a declared output.
    #[error("{procedure}: output '{port}' was not produced")]
    IncompleteOutput { procedure: String, port: String },
}

/// Category of a [`BuildError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BuildErrorKind {
    DuplicateName,
    NameNotFound,
    AlreadyLinked,
    TooManyProducers,
    AutoValueTypeMismatch,
    IncompatibleSlotTypes,
    IncompleteAdapterBinding,
    InvalidSlotName,
    SlotOccupied,
    CyclicDependency,
}

/// A wiring failure, located by the index of the offending pattern.
///
/// The message names the port and the slot involved, e.g.
/// `Input not found: 'left': 'c'`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{message}")]
pub struct BuildError {
    pub kind: BuildErrorKind,
    /// Index of the pattern being wired, `None` for whole-graph checks.
    pub pattern: Option<usize>,
    pub message: String,
}

impl BuildError {
    pub fn new(kind: BuildErrorKind, pattern: Option<usize>, message: impl Into<String>) -> Self {
        BuildError {
            kind,
            pattern,
            message: message.into(),
        }
    }
}

/// Errors from the [`Simulator`](crate::simulator::Simulator) façade.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulatorError {
    /// Construction failed; the simulator is unusable.
    #[error("simulator is not initialized")]
    NotInitialized,

    #[error("no slot named '{name}'")]
    NotFound { name: String },

    /// The slot is computed by a procedure and cannot be written directly.
    #[error("slot '{name}' is not an input slot")]
    NotAnInputSlot { name: String },

    /// The slot refused the written value.
    #[error("slot '{name}' rejected the value")]
    Rejected {
        name: String,
        #[source]
        source: SlotError,
    },

    /// The wired graph has a dependency cycle through `name`.
    #[error("dependency cycle through '{name}'")]
    Cyclic { name: String },

    /// The slot could not be brought up to date.
    #[error("validating slot '{name}' failed")]
    ValidationFailed {
        name: String,
        #[source]
        source: SlotError,
    },
}

impl SimulatorError {
    /// Returns the deepest error in the source chain.
    pub fn root_cause(&self) -> &(dyn std::error::Error + 'static) {
        let mut current: &(dyn std::error::Error + 'static) = self;
        while let Some(next) = current.source() {
            current = next;
        }
        current
    }

    /// Returns the deepest slot failure in the chain, if any.
    pub fn deepest_slot_error(&self) -> Option<&SlotError> {
        let mut found = None;
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(self);
        while let Some(err) = current {
            // Nested slot errors are boxed to break the type recursion.
            if let Some(slot_err) = err.downcast_ref::<SlotError>() {
                found = Some(slot_err);
            } else if let Some(slot_err) = err.downcast_ref::<Box<SlotError>>() {
                found = Some(slot_err.as_ref());
            }
            current = err.source();
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested_failure() -> SimulatorError {
        let missing = SlotError::NoProducer { slot: "b".into() };
        let run = RunError::InputValidationFailed {
            procedure: "divmod".into(),
            port: "right".into(),
            source: Box::new(missing),
        };
        SimulatorError::ValidationFailed {
            name: "q".into(),
            source: SlotError::InputProductionFailed {
                slot: "q".into(),
                source: Box::new(run),
            },
        }
    }

    #[test]
    fn root_cause_is_the_deepest_error() {
        let err = nested_failure();
        assert_eq!(err.root_cause().to_string(), "slot 'b' has no value and no producer");
        assert_eq!(
            err.deepest_slot_error(),
            Some(&SlotError::NoProducer { slot: "b".into() })
        );
    }

    #[test]
    fn root_cause_of_leaf_is_itself() {
        let err = SimulatorError::NotFound { name: "x".into() };
        assert_eq!(err.root_cause().to_string(), "no slot named 'x'");
        assert_eq!(err.deepest_slot_error(), None);
    }

    #[test]
    fn build_error_displays_its_message() {
        let err = BuildError::new(
            BuildErrorKind::NameNotFound,
            Some(1),
            "Input not found: 'left': 'c'",
        );
        assert_eq!(err.to_string(), "Input not found: 'left': 'c'");
    }

    #[test]
    fn cycle_names_a_vertex_on_it() {
        let err = SimulatorError::Cyclic { name: "q".into() };
        assert_eq!(err.to_string(), "dependency cycle through 'q'");
        assert_eq!(err.deepest_slot_error(), None);
    }
}
