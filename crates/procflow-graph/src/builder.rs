//! Building a [`Graph`] from a declarative pattern list.
//!
//! A pipeline is described by an ordered list of [`Pattern`]s. A pattern
//! either declares a value slot or wires a procedure, where each port link
//! names an existing slot ([`Link::ByName`]) or asks for a slot named after
//! the port to be created on first mention ([`Link::ByType`]).
//!
//! Wiring runs in two passes: every declared slot is created first, so a
//! procedure may reference a slot declared later in the list. Procedures are
//! then wired in list order. The first failure aborts the build with a
//! [`BuildError`] carrying the pattern index and a message naming the port
//! and slot, e.g. `Already linked: 'left': 'a'`.

use indexmap::IndexMap;
use procflow_core::{ProcId, Procedure, SlotId, TypeTag};

use crate::config::SimulatorConfig;
use crate::error::{BindError, BuildError, BuildErrorKind};
use crate::graph::{Graph, Vertex};

/// How a procedure port finds its slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    /// An explicitly declared or previously auto-created slot.
    ByName(String),
    /// A slot named after the port, created on first mention.
    ByType(TypeTag),
}

impl From<&str> for Link {
    fn from(name: &str) -> Self {
        Link::ByName(name.to_string())
    }
}

impl From<String> for Link {
    fn from(name: String) -> Self {
        Link::ByName(name)
    }
}

impl From<TypeTag> for Link {
    fn from(ty: TypeTag) -> Self {
        Link::ByType(ty)
    }
}

/// One entry of a pipeline description.
pub enum Pattern {
    /// Declares a value slot.
    Value { name: String, ty: TypeTag },
    /// Wires a procedure: port name -> link, for inputs and outputs.
    Procedure {
        procedure: Box<dyn Procedure>,
        inputs: IndexMap<String, Link>,
        outputs: IndexMap<String, Link>,
    },
}

impl Pattern {
    pub fn value(name: impl Into<String>, ty: TypeTag) -> Self {
        Pattern::Value {
            name: name.into(),
            ty,
        }
    }

    pub fn procedure<P, I, O, K, L, M, N>(procedure: P, inputs: I, outputs: O) -> Self
    where
        P: Procedure + 'static,
        I: IntoIterator<Item = (K, L)>,
        O: IntoIterator<Item = (M, N)>,
        K: Into<String>,
        L: Into<Link>,
        M: Into<String>,
        N: Into<Link>,
    {
        Pattern::Procedure {
            procedure: Box::new(procedure),
            inputs: inputs
                .into_iter()
                .map(|(port, link)| (port.into(), link.into()))
                .collect(),
            outputs: outputs
                .into_iter()
                .map(|(port, link)| (port.into(), link.into()))
                .collect(),
        }
    }
}

impl std::fmt::Debug for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pattern::Value { name, ty } => f
                .debug_struct("Value")
                .field("name", name)
                .field("ty", ty)
                .finish(),
            Pattern::Procedure {
                procedure,
                inputs,
                outputs,
            } => f
                .debug_struct("Procedure")
                .field("procedure", &procedure.label())
                .field("inputs", inputs)
                .field("outputs", outputs)
                .finish(),
        }
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Input,
    Output,
}

impl Direction {
    fn noun(self) -> &'static str {
        match self {
            Direction::Input => "Input",
            Direction::Output => "Output",
        }
    }
}

/// Wires `patterns` into a sealed graph.
pub fn build(patterns: Vec<Pattern>, config: SimulatorConfig) -> Result<Graph, BuildError> {
    let mut graph = Graph::new(config);

    // First pass: explicitly declared slots.
    for (index, pattern) in patterns.iter().enumerate() {
        if let Pattern::Value { name, ty } = pattern {
            if graph.slot_id(name).is_some() {
                return Err(BuildError::new(
                    BuildErrorKind::DuplicateName,
                    Some(index),
                    format!("Duplicate name: '{name}'"),
                ));
            }
            graph.add_slot(name, ty.clone());
        }
    }

    // Second pass: procedures, in list order.
    for (index, pattern) in patterns.into_iter().enumerate() {
        let Pattern::Procedure {
            procedure,
            inputs,
            outputs,
        } = pattern
        else {
            continue;
        };
        let node = graph.add_node(procedure);

        for (port, link) in &inputs {
            wire(&mut graph, index, node, Direction::Input, port, link)?;
        }
        if let Some(port) = graph.node(node).unbound_inputs().first() {
            return Err(BuildError::new(
                BuildErrorKind::IncompleteAdapterBinding,
                Some(index),
                format!("Unbound input: '{port}'"),
            ));
        }
        graph.specialize(node).map_err(|err| {
            BuildError::new(
                BuildErrorKind::IncompatibleSlotTypes,
                Some(index),
                format!("Specialization rejected: {err}"),
            )
        })?;
        for (port, link) in &outputs {
            wire(&mut graph, index, node, Direction::Output, port, link)?;
        }
        tracing::trace!(
            pattern = index,
            procedure = %graph.node(node).label(),
            "procedure wired"
        );
    }

    if let Some(vertex) = graph.find_cycle() {
        let name = graph.vertex_name(vertex);
        let message = match vertex {
            Vertex::Slot(_) => format!("Cyclic dependency: '{name}'"),
            Vertex::Procedure(_) => format!("Cyclic dependency: procedure '{name}'"),
        };
        return Err(BuildError::new(BuildErrorKind::CyclicDependency, None, message));
    }

    graph.seal();
    tracing::debug!(
        slots = graph.slot_count(),
        procedures = graph.node_count(),
        "graph sealed"
    );
    Ok(graph)
}

/// Resolves `link` to a slot and binds it to `port` of `node`.
fn wire(
    graph: &mut Graph,
    index: usize,
    node: ProcId,
    direction: Direction,
    port: &str,
    link: &Link,
) -> Result<(), BuildError> {
    let fail = |kind: BuildErrorKind, message: String| BuildError::new(kind, Some(index), message);

    let spec = match direction {
        Direction::Input => graph.node(node).input_spec(),
        Direction::Output => graph.node(node).output_spec(),
    };
    if !spec.contains_key(port) {
        return Err(fail(
            BuildErrorKind::InvalidSlotName,
            format!("Invalid {}: '{port}'", direction.noun().to_lowercase()),
        ));
    }

    let slot = resolve(graph, port, link)
        .map_err(|(kind, message)| fail(kind, message))?
        .ok_or_else(|| {
            let name = match link {
                Link::ByName(name) => name.as_str(),
                Link::ByType(_) => port,
            };
            fail(
                BuildErrorKind::NameNotFound,
                format!("{} not found: '{port}': '{name}'", direction.noun()),
            )
        })?;

    let bound = match direction {
        Direction::Input => graph.bind_input(node, port, slot),
        Direction::Output => graph.bind_output(node, port, slot),
    };
    bound.map_err(|err| {
        let (kind, message) = match err {
            BindError::InvalidSlotName { port } => (
                BuildErrorKind::InvalidSlotName,
                format!("Invalid {}: '{port}'", direction.noun().to_lowercase()),
            ),
            BindError::SlotOccupied { port } => (
                BuildErrorKind::SlotOccupied,
                format!("{} occupied: '{port}'", direction.noun()),
            ),
            BindError::AlreadyLinked { port, slot } => (
                BuildErrorKind::AlreadyLinked,
                format!("Already linked: '{port}': '{slot}'"),
            ),
            BindError::TooManyProducers { port, slot } => (
                BuildErrorKind::TooManyProducers,
                format!("Too many inputs: '{port}': '{slot}'"),
            ),
            BindError::IncompatibleType {
                port,
                slot,
                slot_type,
                port_type,
            } => (
                BuildErrorKind::IncompatibleSlotTypes,
                format!("Incompatible types: '{port}': '{slot}' ({slot_type} vs {port_type})"),
            ),
        };
        fail(kind, message)
    })
}

/// Finds the slot `link` refers to, creating it for [`Link::ByType`].
///
/// Returns `Ok(None)` when a named slot does not exist.
fn resolve(
    graph: &mut Graph,
    port: &str,
    link: &Link,
) -> Result<Option<SlotId>, (BuildErrorKind, String)> {
    match link {
        Link::ByName(name) => Ok(graph.slot_id(name)),
        Link::ByType(ty) => match graph.slot_id(port) {
            Some(existing) => {
                let existing_ty = graph.slot(existing).ty();
                if existing_ty != ty {
                    return Err((
                        BuildErrorKind::AutoValueTypeMismatch,
                        format!("Auto value type mismatch: '{port}': {existing_ty} vs {ty}"),
                    ));
                }
                Ok(Some(existing))
            }
            None => Ok(Some(graph.add_slot(port, ty.clone()))),
        },
    }
}
