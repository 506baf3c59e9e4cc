//! Graph: the bipartite network of value slots and procedure nodes.
//!
//! [`Graph`] owns every [`ValueSlot`] and [`ProcedureNode`] and delivers the
//! messages between them:
//!
//! - **Invalidation** is eager and push-based. A write to a slot marks the
//!   matching input of each consumer dirty and invalidates the consumer's
//!   outputs, transitively, before the write returns.
//! - **Validation** is lazy and pull-based. Validating an invalid slot runs
//!   its producer, which first validates the producer's own inputs. Only the
//!   stale part of the graph upstream of the query is recomputed.
//!
//! Slots and nodes live in two tables indexed by [`SlotId`] and [`ProcId`].
//! No ordering is stored: the validate recursion discovers it. The petgraph
//! [`topology`](Graph::topology) view is derived on demand for cycle
//! detection and inspection.

use std::collections::VecDeque;

use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use procflow_core::{PortSpec, ProcId, Procedure, ProcedureError, SlotId, TypeTag, Value};
use smallvec::SmallVec;

use crate::config::SimulatorConfig;
use crate::error::{BindError, RunError, SlotError};
use crate::node::ProcedureNode;
use crate::slot::{SlotState, ValueSlot};
use crate::trace::TraceEntry;

/// A vertex of the derived topology graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vertex {
    Slot(SlotId),
    Procedure(ProcId),
}

/// The slot/procedure network.
#[derive(Debug)]
pub struct Graph {
    /// Slots indexed by SlotId.0
    slots: Vec<ValueSlot>,
    /// Procedure nodes indexed by ProcId.0
    nodes: Vec<ProcedureNode>,
    /// Slot name lookup
    names: IndexMap<String, SlotId>,
    config: SimulatorConfig,
    /// Run trace (when enabled).
    trace: Option<Vec<TraceEntry>>,
    sealed: bool,
}

impl Graph {
    /// Creates an empty, unsealed graph.
    pub fn new(config: SimulatorConfig) -> Self {
        let trace = config.trace_enabled.then(Vec::new);
        Graph {
            slots: Vec::new(),
            nodes: Vec::new(),
            names: IndexMap::new(),
            config,
            trace,
            sealed: false,
        }
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Looks up a slot by name.
    pub fn slot_id(&self, name: &str) -> Option<SlotId> {
        self.names.get(name).copied()
    }

    pub fn slot(&self, id: SlotId) -> &ValueSlot {
        &self.slots[id.index()]
    }

    pub fn node(&self, id: ProcId) -> &ProcedureNode {
        &self.nodes[id.index()]
    }

    /// All slots in creation order.
    pub fn slots(&self) -> impl Iterator<Item = (SlotId, &ValueSlot)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, slot)| (SlotId(i as u32), slot))
    }

    /// All procedure nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &ProcedureNode> {
        self.nodes.iter()
    }

    /// Slots nothing produces: the graph's inputs.
    ///
    /// Slots linked to no procedure at all are neither inputs nor outputs.
    pub fn source_spec(&self) -> PortSpec {
        self.slots
            .iter()
            .filter(|slot| slot.producer().is_none() && !slot.consumers().is_empty())
            .map(|slot| (slot.name().to_string(), slot.ty().clone()))
            .collect()
    }

    /// Slots nothing consumes: the graph's outputs.
    pub fn sink_spec(&self) -> PortSpec {
        self.slots
            .iter()
            .filter(|slot| slot.consumers().is_empty() && slot.producer().is_some())
            .map(|slot| (slot.name().to_string(), slot.ty().clone()))
            .collect()
    }

    /// Recorded run trace. Empty when tracing is disabled.
    pub fn trace(&self) -> &[TraceEntry] {
        self.trace.as_deref().unwrap_or_default()
    }

    /// Drains the recorded run trace.
    pub fn take_trace(&mut self) -> Vec<TraceEntry> {
        self.trace.as_mut().map(std::mem::take).unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// Adds a slot named `name`.
    ///
    /// # Panics
    ///
    /// Panics if the graph is sealed or the name is taken; check with
    /// [`slot_id`](Self::slot_id) first.
    pub fn add_slot(&mut self, name: &str, ty: TypeTag) -> SlotId {
        assert!(!self.sealed, "graph is sealed");
        assert!(!self.names.contains_key(name), "slot '{name}' already exists");
        let id = SlotId(self.slots.len() as u32);
        self.slots.push(ValueSlot::new(name, ty));
        self.names.insert(name.to_string(), id);
        id
    }

    /// Adds a procedure node with no bindings.
    pub fn add_node(&mut self, procedure: Box<dyn Procedure>) -> ProcId {
        assert!(!self.sealed, "graph is sealed");
        let id = ProcId(self.nodes.len() as u32);
        self.nodes.push(ProcedureNode::new(id, procedure));
        id
    }

    /// Binds `slot` to input `port` of `node`.
    pub fn bind_input(&mut self, node: ProcId, port: &str, slot: SlotId) -> Result<(), BindError> {
        self.nodes[node.index()].bind_input(port, slot, &mut self.slots[slot.index()])
    }

    /// Binds `slot` to output `port` of `node`.
    pub fn bind_output(&mut self, node: ProcId, port: &str, slot: SlotId) -> Result<(), BindError> {
        self.nodes[node.index()].bind_output(port, slot, &mut self.slots[slot.index()])
    }

    /// Hands `node` the declared types of the slots bound to its inputs.
    pub fn specialize(&mut self, node: ProcId) -> Result<(), ProcedureError> {
        let bound: PortSpec = self.nodes[node.index()]
            .inputs()
            .iter()
            .map(|(port, slot)| (port.clone(), self.slots[slot.index()].ty().clone()))
            .collect();
        self.nodes[node.index()].specialize(&bound)
    }

    /// Seals every slot and node. Links are frozen from here on.
    pub fn seal(&mut self) {
        assert!(!self.sealed, "graph is already sealed");
        self.slots.iter_mut().for_each(ValueSlot::seal);
        self.nodes.iter_mut().for_each(ProcedureNode::seal);
        self.sealed = true;
    }

    // -----------------------------------------------------------------------
    // Topology
    // -----------------------------------------------------------------------

    /// Builds the directed slot -> procedure -> slot graph.
    pub fn topology(&self) -> DiGraph<Vertex, ()> {
        let mut graph = DiGraph::new();
        let slot_indices: Vec<NodeIndex> = (0..self.slots.len())
            .map(|i| graph.add_node(Vertex::Slot(SlotId(i as u32))))
            .collect();
        for node in &self.nodes {
            let ix = graph.add_node(Vertex::Procedure(node.id()));
            for slot in node.inputs().values() {
                graph.add_edge(slot_indices[slot.index()], ix, ());
            }
            for slot in node.outputs().values() {
                graph.add_edge(ix, slot_indices[slot.index()], ());
            }
        }
        graph
    }

    /// Returns a vertex on a dependency cycle, if there is one.
    pub fn find_cycle(&self) -> Option<Vertex> {
        let topology = self.topology();
        toposort(&topology, None)
            .err()
            .map(|cycle| topology[cycle.node_id()])
    }

    /// Procedure nodes ordered so that every producer precedes its consumers.
    ///
    /// Returns the offending vertex if the graph is cyclic.
    pub fn topological_order(&self) -> Result<Vec<ProcId>, Vertex> {
        let topology = self.topology();
        let order = toposort(&topology, None).map_err(|cycle| topology[cycle.node_id()])?;
        Ok(order
            .into_iter()
            .filter_map(|ix| match topology[ix] {
                Vertex::Procedure(id) => Some(id),
                Vertex::Slot(_) => None,
            })
            .collect())
    }

    /// Display name of a vertex: the slot name or the procedure label.
    pub fn vertex_name(&self, vertex: Vertex) -> &str {
        match vertex {
            Vertex::Slot(id) => self.slot(id).name(),
            Vertex::Procedure(id) => self.node(id).label(),
        }
    }

    // -----------------------------------------------------------------------
    // Runtime
    // -----------------------------------------------------------------------

    /// Writes `value` into `slot` and invalidates everything downstream.
    pub fn write(&mut self, slot: SlotId, value: Value) -> Result<(), SlotError> {
        self.slots[slot.index()].write(value)?;
        tracing::trace!(
            slot = %self.slots[slot.index()].name(),
            state = ?self.slots[slot.index()].state(),
            "slot written"
        );
        self.notify_consumers(slot);
        Ok(())
    }

    /// Drops the value of `slot` and invalidates everything downstream.
    pub fn invalidate(&mut self, slot: SlotId) {
        if self.slots[slot.index()].invalidate() {
            tracing::trace!(slot = %self.slots[slot.index()].name(), "slot invalidated");
            self.notify_consumers(slot);
        }
    }

    /// Brings `slot` up to date, running upstream procedures as needed.
    pub fn validate(&mut self, slot: SlotId) -> Result<(), SlotError> {
        self.validate_at(slot, 0)
    }

    /// Borrows the current value of `slot` without validating it.
    pub fn read(&self, slot: SlotId) -> Result<&Value, SlotError> {
        self.slots[slot.index()].read()
    }

    /// Runs procedure `node`: validate inputs, feed the changed ones, pull
    /// and write every bound output, acknowledge the inputs.
    ///
    /// A failed run leaves whatever the completed steps did. The outputs that
    /// were not written stay invalid, so a later validation runs the node
    /// again.
    pub fn run(&mut self, node: ProcId) -> Result<(), RunError> {
        self.run_at(node, 0)
    }

    /// Delivers invalidation from `changed` to its consumers, transitively.
    fn notify_consumers(&mut self, changed: SlotId) {
        let mut queue: VecDeque<(ProcId, SlotId)> = self.slots[changed.index()]
            .consumers()
            .iter()
            .map(|&consumer| (consumer, changed))
            .collect();
        while let Some((node, from)) = queue.pop_front() {
            for output in self.nodes[node.index()].invalidate(from) {
                let slot = &mut self.slots[output.index()];
                if slot.invalidate() {
                    queue.extend(slot.consumers().iter().map(|&consumer| (consumer, output)));
                }
            }
        }
    }

    fn validate_at(&mut self, slot: SlotId, depth: usize) -> Result<(), SlotError> {
        let Some(producer) = self.slots[slot.index()].validation_target()? else {
            return Ok(());
        };
        let name = self.slots[slot.index()].name().to_string();
        if depth >= self.config.max_depth {
            return Err(SlotError::DepthLimitExceeded {
                slot: name,
                limit: self.config.max_depth,
            });
        }
        tracing::trace!(slot = %name, procedure = %producer, "validating through producer");
        self.run_at(producer, depth + 1)
            .map_err(|err| SlotError::InputProductionFailed {
                slot: name,
                source: Box::new(err),
            })?;
        self.slots[slot.index()].read().map(|_| ())
    }

    fn run_at(&mut self, id: ProcId, depth: usize) -> Result<(), RunError> {
        let node = &self.nodes[id.index()];
        let label = node.label().to_string();
        let inputs: Vec<(String, SlotId)> = node
            .inputs()
            .iter()
            .map(|(port, &slot)| (port.clone(), slot))
            .collect();
        let outputs: Vec<(String, SlotId)> = node
            .outputs()
            .iter()
            .map(|(port, &slot)| (port.clone(), slot))
            .collect();
        let input_failure = |port: &str, err: SlotError| RunError::InputValidationFailed {
            procedure: label.clone(),
            port: port.to_string(),
            source: Box::new(err),
        };

        for (port, slot) in &inputs {
            self.validate_at(*slot, depth)
                .map_err(|err| input_failure(port.as_str(), err))?;
        }
        // Producers run above may rewrite sibling outputs and thereby
        // invalidate an input validated earlier in the loop.
        let mut passes = 0;
        while let Some((port, slot)) = inputs
            .iter()
            .find(|(_, slot)| self.slots[slot.index()].state() == SlotState::Invalid)
        {
            passes += 1;
            if passes > self.config.max_depth {
                let err = SlotError::DepthLimitExceeded {
                    slot: self.slots[slot.index()].name().to_string(),
                    limit: self.config.max_depth,
                };
                return Err(input_failure(port.as_str(), err));
            }
            self.validate_at(*slot, depth)
                .map_err(|err| input_failure(port.as_str(), err))?;
        }

        let mut fed = SmallVec::new();
        for (port, slot) in &inputs {
            if !self.nodes[id.index()].dirty_inputs().contains(port) {
                continue;
            }
            let value = self.slots[slot.index()]
                .read()
                .map_err(|err| input_failure(port.as_str(), err))?
                .clone();
            self.nodes[id.index()].feed(port, value)?;
            fed.push(port.clone());
        }

        let mut written = SmallVec::new();
        for (port, slot) in &outputs {
            let value = self.nodes[id.index()].pull(port)?;
            self.write(*slot, value)
                .map_err(|err| RunError::OutputRejected {
                    procedure: label.clone(),
                    port: port.clone(),
                    source: Box::new(err),
                })?;
            written.push(port.clone());
        }

        for (port, slot) in &inputs {
            self.slots[slot.index()]
                .acknowledge_consumed(id)
                .map_err(|err| input_failure(port.as_str(), err))?;
        }

        tracing::debug!(procedure = %label, fed = ?fed, written = ?written, "procedure ran");
        if let Some(trace) = &mut self.trace {
            trace.push(TraceEntry {
                procedure: id,
                label,
                fed_inputs: fed,
                written_outputs: written,
            });
        }
        Ok(())
    }
}
