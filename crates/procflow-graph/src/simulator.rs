//! The simulator façade: build once, then `put` and `get` by slot name.
//!
//! A [`Simulator`] wraps a sealed [`Graph`]. Construction never panics: a
//! wiring failure leaves the simulator uninitialized, every operation then
//! reports [`SimulatorError::NotInitialized`] and [`Simulator::build_error`]
//! tells what went wrong.
//!
//! A simulator is itself a [`Procedure`]. Its inputs are the linked slots
//! nothing produces and its outputs are the linked slots nothing consumes,
//! so a whole pipeline can be nested as one step of a larger one.

use procflow_core::{PortSpec, Procedure, ProcedureError, Value};

use crate::builder::{build, Pattern};
use crate::config::SimulatorConfig;
use crate::error::{BuildError, SimulatorError, SlotError};
use crate::graph::Graph;
use crate::slot::SlotState;
use crate::trace::TraceEntry;

pub struct Simulator {
    graph: Result<Graph, BuildError>,
}

impl Simulator {
    /// Builds a simulator with the default configuration.
    pub fn new(patterns: Vec<Pattern>) -> Self {
        Self::with_config(patterns, SimulatorConfig::default())
    }

    pub fn with_config(patterns: Vec<Pattern>, config: SimulatorConfig) -> Self {
        let graph = build(patterns, config);
        if let Err(err) = &graph {
            tracing::warn!(kind = ?err.kind, pattern = ?err.pattern, "{err}");
        }
        Simulator { graph }
    }

    /// Builds a simulator, returning the wiring failure instead of an
    /// uninitialized simulator.
    pub fn try_new(patterns: Vec<Pattern>, config: SimulatorConfig) -> Result<Self, BuildError> {
        let graph = build(patterns, config)?;
        Ok(Simulator { graph: Ok(graph) })
    }

    pub fn is_initialized(&self) -> bool {
        self.graph.is_ok()
    }

    /// The construction failure, if any.
    pub fn build_error(&self) -> Option<&BuildError> {
        self.graph.as_ref().err()
    }

    /// The underlying graph, if construction succeeded.
    pub fn graph(&self) -> Option<&Graph> {
        self.graph.as_ref().ok()
    }

    fn graph_mut(&mut self) -> Result<&mut Graph, SimulatorError> {
        self.graph.as_mut().map_err(|_| SimulatorError::NotInitialized)
    }

    fn graph_ref(&self) -> Result<&Graph, SimulatorError> {
        self.graph.as_ref().map_err(|_| SimulatorError::NotInitialized)
    }

    /// Writes `value` into the input slot `name`.
    ///
    /// Everything downstream is invalidated before this returns; nothing is
    /// recomputed until a `get`.
    pub fn put(&mut self, name: &str, value: impl Into<Value>) -> Result<(), SimulatorError> {
        let graph = self.graph_mut()?;
        let slot = graph.slot_id(name).ok_or_else(|| SimulatorError::NotFound {
            name: name.to_string(),
        })?;
        if graph.slot(slot).producer().is_some() {
            return Err(SimulatorError::NotAnInputSlot {
                name: name.to_string(),
            });
        }
        graph
            .write(slot, value.into())
            .map_err(|source| SimulatorError::Rejected {
                name: name.to_string(),
                source,
            })
    }

    /// Brings slot `name` up to date and returns its value.
    pub fn get(&mut self, name: &str) -> Result<Value, SimulatorError> {
        let graph = self.graph_mut()?;
        let slot = graph.slot_id(name).ok_or_else(|| SimulatorError::NotFound {
            name: name.to_string(),
        })?;
        let validated = graph.validate(slot).and_then(|()| graph.read(slot).cloned());
        validated.map_err(|source| {
            let err = SimulatorError::ValidationFailed {
                name: name.to_string(),
                source,
            };
            tracing::warn!(slot = %name, cause = %err.root_cause(), "get failed");
            err
        })
    }

    /// Current state of slot `name`, without validating it.
    pub fn state(&self, name: &str) -> Result<SlotState, SimulatorError> {
        let graph = self.graph_ref()?;
        let slot = graph.slot_id(name).ok_or_else(|| SimulatorError::NotFound {
            name: name.to_string(),
        })?;
        Ok(graph.slot(slot).state())
    }

    /// Slot names in creation order.
    pub fn slot_names(&self) -> Vec<&str> {
        match &self.graph {
            Ok(graph) => graph.slots().map(|(_, slot)| slot.name()).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Procedure labels, producers before consumers.
    pub fn topological_order(&self) -> Result<Vec<&str>, SimulatorError> {
        let graph = self.graph_ref()?;
        let order = graph
            .topological_order()
            .map_err(|vertex| SimulatorError::Cyclic {
                name: graph.vertex_name(vertex).to_string(),
            })?;
        Ok(order.into_iter().map(|id| graph.node(id).label()).collect())
    }

    /// Recorded procedure runs. Empty unless `trace_enabled` is set.
    pub fn trace(&self) -> &[TraceEntry] {
        match &self.graph {
            Ok(graph) => graph.trace(),
            Err(_) => &[],
        }
    }

    pub fn take_trace(&mut self) -> Vec<TraceEntry> {
        match &mut self.graph {
            Ok(graph) => graph.take_trace(),
            Err(_) => Vec::new(),
        }
    }
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.graph {
            Ok(graph) => f.debug_struct("Simulator").field("graph", graph).finish(),
            Err(err) => f.debug_struct("Simulator").field("build_error", err).finish(),
        }
    }
}

impl Procedure for Simulator {
    fn input_spec(&self) -> PortSpec {
        self.graph().map(Graph::source_spec).unwrap_or_default()
    }

    fn output_spec(&self) -> PortSpec {
        self.graph().map(Graph::sink_spec).unwrap_or_default()
    }

    fn put(&mut self, name: &str, value: Value) -> Result<(), ProcedureError> {
        Simulator::put(self, name, value).map_err(|err| match err {
            SimulatorError::NotFound { name } | SimulatorError::NotAnInputSlot { name } => {
                ProcedureError::InvalidName { name }
            }
            SimulatorError::Rejected {
                name,
                source: SlotError::IncompatibleType { expected, got, .. },
            } => ProcedureError::IncompatibleType {
                name,
                expected,
                got,
            },
            other => ProcedureError::run_failed(other.to_string()),
        })
    }

    fn get(&mut self, name: &str) -> Result<Value, ProcedureError> {
        Simulator::get(self, name).map_err(|err| {
            if let SimulatorError::NotFound { name } = err {
                return ProcedureError::InvalidName { name };
            }
            match err.deepest_slot_error() {
                Some(SlotError::NoProducer { slot } | SlotError::NoValue { slot }) => {
                    ProcedureError::InputsIncomplete {
                        missing: vec![slot.clone()],
                    }
                }
                Some(SlotError::IncompatibleType {
                    slot,
                    expected,
                    got,
                }) => ProcedureError::IncompatibleType {
                    name: slot.clone(),
                    expected: expected.clone(),
                    got: got.clone(),
                },
                _ => ProcedureError::run_failed(format!("{err}: {}", err.root_cause())),
            }
        })
    }

    fn label(&self) -> &str {
        "simulator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Link;
    use crate::error::{BuildErrorKind, RunError};
    use procflow_core::{port_spec, TypeTag};

    /// `out = -in`.
    struct Negate {
        input: Option<i64>,
    }

    impl Procedure for Negate {
        fn input_spec(&self) -> PortSpec {
            port_spec([("in", TypeTag::Int)])
        }

        fn output_spec(&self) -> PortSpec {
            port_spec([("out", TypeTag::Int)])
        }

        fn put(&mut self, _name: &str, value: Value) -> Result<(), ProcedureError> {
            self.input = value.as_int();
            Ok(())
        }

        fn get(&mut self, _name: &str) -> Result<Value, ProcedureError> {
            self.input
                .map(|v| Value::Int(-v))
                .ok_or_else(|| ProcedureError::run_failed("no input"))
        }

        fn label(&self) -> &str {
            "negate"
        }
    }

    fn negation() -> Simulator {
        Simulator::new(vec![
            Pattern::value("x", TypeTag::Int),
            Pattern::value("y", TypeTag::Int),
            Pattern::procedure(Negate { input: None }, [("in", "x")], [("out", "y")]),
        ])
    }

    #[test]
    fn put_then_get() {
        let mut sim = negation();
        sim.put("x", 4).unwrap();
        assert_eq!(sim.state("y").unwrap(), SlotState::Invalid);
        assert_eq!(sim.get("y").unwrap(), Value::Int(-4));
        assert_eq!(sim.state("x").unwrap(), SlotState::Stable);
        assert_eq!(sim.slot_names(), vec!["x", "y"]);
        assert_eq!(sim.topological_order().unwrap(), vec!["negate"]);
    }

    #[test]
    fn put_errors() {
        let mut sim = negation();
        assert_eq!(
            sim.put("z", 1),
            Err(SimulatorError::NotFound { name: "z".into() })
        );
        assert_eq!(
            sim.put("y", 1),
            Err(SimulatorError::NotAnInputSlot { name: "y".into() })
        );
        assert!(matches!(
            sim.put("x", "text"),
            Err(SimulatorError::Rejected {
                source: SlotError::IncompatibleType { .. },
                ..
            })
        ));
    }

    #[test]
    fn get_without_input_fails_with_no_producer() {
        let mut sim = negation();
        let err = sim.get("y").unwrap_err();
        assert_eq!(
            err.deepest_slot_error(),
            Some(&SlotError::NoProducer { slot: "x".into() })
        );
    }

    #[test]
    fn failed_build_leaves_simulator_uninitialized() {
        let mut sim = Simulator::new(vec![
            Pattern::value("x", TypeTag::Int),
            Pattern::value("x", TypeTag::Int),
        ]);
        assert!(!sim.is_initialized());
        assert_eq!(
            sim.build_error().map(|err| err.kind),
            Some(BuildErrorKind::DuplicateName)
        );
        assert_eq!(sim.put("x", 1), Err(SimulatorError::NotInitialized));
        assert_eq!(sim.get("x"), Err(SimulatorError::NotInitialized));
        assert!(sim.slot_names().is_empty());
        assert!(Procedure::input_spec(&sim).is_empty());
    }

    #[test]
    fn try_new_reports_the_build_error() {
        let err = Simulator::try_new(
            vec![Pattern::procedure(
                Negate { input: None },
                [("in", "nowhere")],
                Vec::<(&str, Link)>::new(),
            )],
            SimulatorConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.message, "Input not found: 'in': 'nowhere'");
    }

    #[test]
    fn as_procedure() {
        let mut sim = negation();
        assert_eq!(Procedure::input_spec(&sim), port_spec([("x", TypeTag::Int)]));
        assert_eq!(Procedure::output_spec(&sim), port_spec([("y", TypeTag::Int)]));

        assert_eq!(
            Procedure::get(&mut sim, "y"),
            Err(ProcedureError::InputsIncomplete {
                missing: vec!["x".into()]
            })
        );
        assert_eq!(
            Procedure::put(&mut sim, "y", Value::Int(1)),
            Err(ProcedureError::InvalidName { name: "y".into() })
        );
        Procedure::put(&mut sim, "x", Value::Int(2)).unwrap();
        assert_eq!(Procedure::get(&mut sim, "y"), Ok(Value::Int(-2)));
    }

    #[test]
    fn simulator_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Simulator>();
    }

    /// Declares an output it never delivers.
    struct Silent;

    impl Procedure for Silent {
        fn input_spec(&self) -> PortSpec {
            port_spec([("in", TypeTag::Int)])
        }

        fn output_spec(&self) -> PortSpec {
            port_spec([("out", TypeTag::Int)])
        }

        fn put(&mut self, _name: &str, _value: Value) -> Result<(), ProcedureError> {
            Ok(())
        }

        fn get(&mut self, name: &str) -> Result<Value, ProcedureError> {
            Err(ProcedureError::IncompleteOutput { name: name.into() })
        }

        fn label(&self) -> &str {
            "silent"
        }
    }

    #[test]
    fn incomplete_output_fails_get() {
        let mut sim = Simulator::new(vec![
            Pattern::value("x", TypeTag::Int),
            Pattern::value("y", TypeTag::Int),
            Pattern::procedure(Silent, [("in", "x")], [("out", "y")]),
        ]);
        sim.put("x", 1).unwrap();
        let err = sim.get("y").unwrap_err();
        assert_eq!(
            err,
            SimulatorError::ValidationFailed {
                name: "y".into(),
                source: SlotError::InputProductionFailed {
                    slot: "y".into(),
                    source: Box::new(RunError::IncompleteOutput {
                        procedure: "silent".into(),
                        port: "out".into(),
                    }),
                },
            }
        );
        assert_eq!(
            err.root_cause().to_string(),
            "silent: output 'out' was not produced"
        );
        assert_eq!(sim.state("y").unwrap(), SlotState::Invalid);
        assert!(matches!(
            Procedure::get(&mut sim, "y"),
            Err(ProcedureError::RunFailed { .. })
        ));
    }
}
