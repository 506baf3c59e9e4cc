//! Procedure nodes: the graph-side wrappers around [`Procedure`]s.
//!
//! A [`ProcedureNode`] binds each port of its procedure to a
//! [`ValueSlot`] and remembers which inputs changed since the procedure last
//! saw them (the dirty set). Only dirty inputs are pushed into the procedure
//! on the next run; every bound output is pulled on every run.
//!
//! The run algorithm itself lives in [`Graph::run`](crate::graph::Graph::run)
//! because it has to reach the slots around the node.

use indexmap::{IndexMap, IndexSet};
use procflow_core::{satisfies, PortSpec, ProcId, Procedure, ProcedureError, SlotId, Value};

use crate::error::{BindError, LinkError, RunError};
use crate::slot::ValueSlot;

/// One procedure instance wired into a graph.
pub struct ProcedureNode {
    id: ProcId,
    procedure: Box<dyn Procedure>,
    input_spec: PortSpec,
    output_spec: PortSpec,
    inputs: IndexMap<String, SlotId>,
    outputs: IndexMap<String, SlotId>,
    /// Input ports whose slot changed since the procedure last received it.
    dirty: IndexSet<String>,
    sealed: bool,
}

impl ProcedureNode {
    pub fn new(id: ProcId, procedure: Box<dyn Procedure>) -> Self {
        let input_spec = procedure.input_spec();
        let output_spec = procedure.output_spec();
        ProcedureNode {
            id,
            procedure,
            input_spec,
            output_spec,
            inputs: IndexMap::new(),
            outputs: IndexMap::new(),
            dirty: IndexSet::new(),
            sealed: false,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn id(&self) -> ProcId {
        self.id
    }

    pub fn label(&self) -> &str {
        self.procedure.label()
    }

    pub fn input_spec(&self) -> &PortSpec {
        &self.input_spec
    }

    pub fn output_spec(&self) -> &PortSpec {
        &self.output_spec
    }

    /// Bound input ports, in binding order.
    pub fn inputs(&self) -> &IndexMap<String, SlotId> {
        &self.inputs
    }

    /// Bound output ports, in binding order.
    pub fn outputs(&self) -> &IndexMap<String, SlotId> {
        &self.outputs
    }

    pub fn dirty_inputs(&self) -> &IndexSet<String> {
        &self.dirty
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Declared input ports that have no slot bound.
    pub fn unbound_inputs(&self) -> Vec<&str> {
        self.input_spec
            .keys()
            .filter(|port| !self.inputs.contains_key(*port))
            .map(String::as_str)
            .collect()
    }

    // -----------------------------------------------------------------------
    // Wiring
    // -----------------------------------------------------------------------

    /// Binds `slot` to input port `port`, registering this node as one of
    /// the slot's consumers.
    ///
    /// The slot type must satisfy the port type.
    pub fn bind_input(
        &mut self,
        port: &str,
        slot_id: SlotId,
        slot: &mut ValueSlot,
    ) -> Result<(), BindError> {
        self.assert_unsealed();
        let port_type = self
            .input_spec
            .get(port)
            .ok_or_else(|| BindError::InvalidSlotName { port: port.into() })?;
        if self.inputs.contains_key(port) {
            return Err(BindError::SlotOccupied { port: port.into() });
        }
        if self.outputs.values().any(|&s| s == slot_id) {
            return Err(BindError::AlreadyLinked {
                port: port.into(),
                slot: slot.name().into(),
            });
        }
        if !satisfies(slot.ty(), port_type) {
            return Err(BindError::IncompatibleType {
                port: port.into(),
                slot: slot.name().into(),
                slot_type: slot.ty().clone(),
                port_type: port_type.clone(),
            });
        }
        slot.bind_as_input_of(self.id)
            .map_err(|err| link_to_bind(port, err))?;
        self.inputs.insert(port.to_string(), slot_id);
        self.dirty.insert(port.to_string());
        Ok(())
    }

    /// Binds `slot` to output port `port`, registering this node as the
    /// slot's producer.
    ///
    /// The port type must satisfy the slot type.
    pub fn bind_output(
        &mut self,
        port: &str,
        slot_id: SlotId,
        slot: &mut ValueSlot,
    ) -> Result<(), BindError> {
        self.assert_unsealed();
        let port_type = self
            .output_spec
            .get(port)
            .ok_or_else(|| BindError::InvalidSlotName { port: port.into() })?;
        if self.outputs.contains_key(port) {
            return Err(BindError::SlotOccupied { port: port.into() });
        }
        if self.inputs.values().any(|&s| s == slot_id) {
            return Err(BindError::AlreadyLinked {
                port: port.into(),
                slot: slot.name().into(),
            });
        }
        if !satisfies(port_type, slot.ty()) {
            return Err(BindError::IncompatibleType {
                port: port.into(),
                slot: slot.name().into(),
                slot_type: slot.ty().clone(),
                port_type: port_type.clone(),
            });
        }
        slot.bind_as_output_of(self.id)
            .map_err(|err| link_to_bind(port, err))?;
        self.outputs.insert(port.to_string(), slot_id);
        Ok(())
    }

    /// Lets the procedure adapt its outputs to the types bound to its inputs,
    /// then refreshes the cached output spec.
    pub fn specialize(&mut self, bound_inputs: &PortSpec) -> Result<(), ProcedureError> {
        self.assert_unsealed();
        self.procedure.specialize(bound_inputs)?;
        self.output_spec = self.procedure.output_spec();
        Ok(())
    }

    /// Freezes the bindings.
    ///
    /// # Panics
    ///
    /// Panics if the node is already sealed.
    pub fn seal(&mut self) {
        assert!(!self.sealed, "procedure {} is already sealed", self.id);
        self.sealed = true;
    }

    // -----------------------------------------------------------------------
    // Runtime
    // -----------------------------------------------------------------------

    /// Records that input slot `from` changed.
    ///
    /// Returns the output slots, which the caller must invalidate.
    pub fn invalidate(&mut self, from: SlotId) -> Vec<SlotId> {
        self.assert_sealed();
        for (port, &slot) in &self.inputs {
            if slot == from {
                self.dirty.insert(port.clone());
            }
        }
        self.outputs.values().copied().collect()
    }

    /// Pushes one input value into the procedure and clears its dirty flag.
    pub fn feed(&mut self, port: &str, value: Value) -> Result<(), RunError> {
        self.assert_sealed();
        self.procedure
            .put(port, value)
            .map_err(|source| RunError::InputRejected {
                procedure: self.label().to_string(),
                port: port.to_string(),
                source,
            })?;
        self.dirty.shift_remove(port);
        Ok(())
    }

    /// Pulls one output value from the procedure.
    pub fn pull(&mut self, port: &str) -> Result<Value, RunError> {
        self.assert_sealed();
        self.procedure.get(port).map_err(|source| match source {
            ProcedureError::IncompleteOutput { .. } => RunError::IncompleteOutput {
                procedure: self.label().to_string(),
                port: port.to_string(),
            },
            source => RunError::ProcedureFailed {
                procedure: self.label().to_string(),
                port: port.to_string(),
                source,
            },
        })
    }

    fn assert_sealed(&self) {
        assert!(self.sealed, "procedure {} is used before it is sealed", self.id);
    }

    fn assert_unsealed(&self) {
        assert!(!self.sealed, "procedure {} is sealed, bindings are frozen", self.id);
    }
}

impl std::fmt::Debug for ProcedureNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcedureNode")
            .field("id", &self.id)
            .field("label", &self.label())
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("dirty", &self.dirty)
            .field("sealed", &self.sealed)
            .finish()
    }
}

fn link_to_bind(port: &str, err: LinkError) -> BindError {
    match err {
        LinkError::AlreadyLinked { slot, .. } => BindError::AlreadyLinked {
            port: port.into(),
            slot,
        },
        LinkError::TooManyProducers { slot } => BindError::TooManyProducers {
            port: port.into(),
            slot,
        },
    }
}
