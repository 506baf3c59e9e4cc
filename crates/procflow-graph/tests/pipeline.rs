//! End-to-end tests for the simulator façade.
//!
//! Each test describes a pipeline as a pattern list, builds a `Simulator`
//! from it and drives it through `put`/`get`, checking values, slot states
//! and which procedures actually ran.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use procflow_core::{port_spec, PortSpec, Procedure, ProcedureError, TypeTag, Value};
use procflow_graph::{
    BuildErrorKind, Link, Pattern, Simulator, SimulatorConfig, SimulatorError, SlotError,
    SlotState,
};
use procflow_procs::{Calculate, Calculator, Wrapper};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

/// `quotient, remainder = divmod(left, right)`, floor semantics.
struct DivMod;

impl Calculate for DivMod {
    fn inputs(&self) -> PortSpec {
        port_spec([("left", TypeTag::Int), ("right", TypeTag::Int)])
    }

    fn outputs(&self) -> PortSpec {
        port_spec([("quotient", TypeTag::Int), ("remainder", TypeTag::Int)])
    }

    fn check(&self, port: &str, value: &Value) -> Result<(), String> {
        if port == "right" && value.as_int() == Some(0) {
            return Err("division by zero".into());
        }
        Ok(())
    }

    fn calculate(
        &mut self,
        inputs: &IndexMap<String, Value>,
    ) -> Result<IndexMap<String, Value>, String> {
        let left = inputs["left"].as_int().ok_or("left is not an int")?;
        let right = inputs["right"].as_int().ok_or("right is not an int")?;
        let mut out = IndexMap::new();
        let (quotient, remainder) = floor_divmod(left, right);
        out.insert("quotient".to_string(), Value::Int(quotient));
        out.insert("remainder".to_string(), Value::Int(remainder));
        Ok(out)
    }

    fn label(&self) -> &str {
        "divmod"
    }
}

/// Python-style `divmod`: the quotient rounds toward negative infinity and
/// the remainder takes the sign of the divisor.
fn floor_divmod(left: i64, right: i64) -> (i64, i64) {
    let (q, r) = (left / right, left % right);
    if r != 0 && (r < 0) != (right < 0) {
        (q - 1, r + right)
    } else {
        (q, r)
    }
}

fn divmod(left: &str, right: &str, quotient: &str, remainder: &str) -> Pattern {
    Pattern::procedure(
        Calculator::new(DivMod),
        [("left", left), ("right", right)],
        [("quotient", quotient), ("remainder", remainder)],
    )
}

/// `q, r = divmod(a, b)` then `q2, r2 = divmod(r, c)`.
fn two_stage_patterns() -> Vec<Pattern> {
    let mut patterns: Vec<Pattern> = ["a", "b", "c", "q", "r", "q2", "r2"]
        .into_iter()
        .map(|name| Pattern::value(name, TypeTag::Int))
        .collect();
    patterns.push(divmod("a", "b", "q", "r"));
    patterns.push(divmod("r", "c", "q2", "r2"));
    patterns
}

fn expected_q2(a: i64, b: i64, c: i64) -> i64 {
    floor_divmod(floor_divmod(a, b).1, c).0
}

/// `out = in`, counting every `put` and `get`.
struct Counting {
    value: Option<Value>,
    calls: Arc<AtomicUsize>,
}

impl Procedure for Counting {
    fn input_spec(&self) -> PortSpec {
        port_spec([("in", TypeTag::Float)])
    }

    fn output_spec(&self) -> PortSpec {
        port_spec([("out", TypeTag::Float)])
    }

    fn put(&mut self, _name: &str, value: Value) -> Result<(), ProcedureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.value = Some(value);
        Ok(())
    }

    fn get(&mut self, _name: &str) -> Result<Value, ProcedureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.value
            .clone()
            .ok_or_else(|| ProcedureError::run_failed("no value"))
    }

    fn label(&self) -> &str {
        "counting"
    }
}

// ---------------------------------------------------------------------------
// Pipelines
// ---------------------------------------------------------------------------

#[test]
fn two_stage_divmod() {
    init_logging();
    let mut sim = Simulator::new(two_stage_patterns());
    assert!(sim.is_initialized());

    sim.put("a", 101).unwrap();
    sim.put("b", 7).unwrap();
    sim.put("c", 3).unwrap();
    assert_eq!(sim.get("q2").unwrap(), Value::Int(1));
    assert_eq!(sim.get("q").unwrap(), Value::Int(14));

    sim.put("c", 2).unwrap();
    assert_eq!(sim.state("r").unwrap(), SlotState::Stable);
    assert_eq!(sim.state("q2").unwrap(), SlotState::Invalid);
    assert_eq!(sim.get("q2").unwrap(), Value::Int(expected_q2(101, 7, 2)));
    assert_eq!(sim.get("r2").unwrap(), Value::Int(1));
}

#[test]
fn changing_one_input_reruns_only_downstream() {
    let mut sim = Simulator::with_config(
        two_stage_patterns(),
        SimulatorConfig {
            trace_enabled: true,
            ..SimulatorConfig::default()
        },
    );
    sim.put("a", 101).unwrap();
    sim.put("b", 7).unwrap();
    sim.put("c", 3).unwrap();
    sim.get("q2").unwrap();
    let first: Vec<u32> = sim.take_trace().iter().map(|e| e.procedure.0).collect();
    assert_eq!(first, vec![0, 1]);

    sim.put("c", 2).unwrap();
    sim.get("q2").unwrap();
    insta::assert_json_snapshot!(sim.trace(), @r###"
    [
      {
        "procedure": 1,
        "label": "divmod",
        "fed_inputs": [
          "right"
        ],
        "written_outputs": [
          "quotient",
          "remainder"
        ]
      }
    ]
    "###);
}

#[test]
fn second_get_runs_nothing() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut sim = Simulator::new(vec![
        Pattern::value("x", TypeTag::Float),
        Pattern::value("y", TypeTag::Float),
        Pattern::procedure(
            Counting {
                value: None,
                calls: Arc::clone(&calls),
            },
            [("in", "x")],
            [("out", "y")],
        ),
    ]);
    sim.put("x", 2.5).unwrap();
    assert_eq!(sim.get("y").unwrap(), Value::Float(2.5));
    let after_first = calls.load(Ordering::SeqCst);
    assert_eq!(after_first, 2);

    assert_eq!(sim.get("y").unwrap(), Value::Float(2.5));
    assert_eq!(calls.load(Ordering::SeqCst), after_first);
}

#[test]
fn source_slot_read_back_is_stable() {
    let mut sim = Simulator::new(vec![Pattern::value("lonely", TypeTag::Str)]);
    sim.put("lonely", "hello").unwrap();
    assert_eq!(sim.get("lonely").unwrap(), Value::from("hello"));
    assert_eq!(sim.state("lonely").unwrap(), SlotState::Stable);
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[test]
fn type_rejection_and_widening() {
    let mut sim = Simulator::new(vec![
        Pattern::value("f", TypeTag::Float),
        Pattern::value("z", TypeTag::Complex),
        Pattern::value("i", TypeTag::Int),
    ]);
    sim.put("i", 7).unwrap();

    let err = sim.put("i", 1.5).unwrap_err();
    assert_eq!(
        err,
        SimulatorError::Rejected {
            name: "i".into(),
            source: SlotError::IncompatibleType {
                slot: "i".into(),
                expected: TypeTag::Int,
                got: TypeTag::Float,
            },
        }
    );
    assert_eq!(sim.get("i").unwrap(), Value::Int(7));

    // Ints widen into float and complex slots and keep their own type.
    sim.put("f", 3).unwrap();
    sim.put("z", 4).unwrap();
    assert_eq!(sim.get("f").unwrap(), Value::Int(3));
    assert_eq!(sim.get("z").unwrap().as_complex().map(|c| c.re), Some(4.0));
}

// ---------------------------------------------------------------------------
// Wiring diagnostics
// ---------------------------------------------------------------------------

#[test]
fn missing_input_slot_is_named() {
    let sim = Simulator::new(vec![
        Pattern::value("a", TypeTag::Int),
        Pattern::procedure(
            Calculator::new(DivMod),
            [("left", "c")],
            Vec::<(&str, Link)>::new(),
        ),
    ]);
    let err = sim.build_error().cloned().unwrap();
    assert_eq!(err.kind, BuildErrorKind::NameNotFound);
    insta::assert_json_snapshot!(err, @r###"
    {
      "kind": "NameNotFound",
      "pattern": 1,
      "message": "Input not found: 'left': 'c'"
    }
    "###);
}

#[test]
fn uninitialized_simulator_refuses_everything() {
    let mut sim = Simulator::new(vec![
        Pattern::value("r", TypeTag::Int),
        divmod("a", "b", "q", "r"),
    ]);
    assert!(!sim.is_initialized());
    assert_eq!(sim.put("r", 1), Err(SimulatorError::NotInitialized));
    assert_eq!(sim.get("r"), Err(SimulatorError::NotInitialized));
    assert_eq!(sim.state("r"), Err(SimulatorError::NotInitialized));
    assert!(sim.topological_order().is_err());
}

#[test]
fn computed_slots_cannot_be_written() {
    let mut sim = Simulator::new(two_stage_patterns());
    assert_eq!(
        sim.put("q", 5),
        Err(SimulatorError::NotAnInputSlot { name: "q".into() })
    );
    assert_eq!(
        sim.put("nope", 5),
        Err(SimulatorError::NotFound {
            name: "nope".into()
        })
    );
}

#[test]
fn auto_created_slots_connect_by_port_name() {
    let square = Wrapper::new([("x", TypeTag::Int)], [("y", TypeTag::Int)], |args| {
        let x = args[0].as_int().ok_or("x is not an int")?;
        Ok(vec![Value::Int(x * x)])
    })
    .with_label("square");
    let negate = Wrapper::new([("y", TypeTag::Int)], [("z", TypeTag::Int)], |args| {
        let y = args[0].as_int().ok_or("y is not an int")?;
        Ok(vec![Value::Int(-y)])
    })
    .with_label("negate");

    let mut sim = Simulator::new(vec![
        Pattern::procedure(negate.create(), [("y", TypeTag::Int)], [("z", TypeTag::Int)]),
        Pattern::procedure(square.create(), [("x", TypeTag::Int)], [("y", TypeTag::Int)]),
    ]);
    assert_eq!(sim.slot_names(), vec!["y", "z", "x"]);
    assert_eq!(sim.topological_order().unwrap(), vec!["square", "negate"]);

    sim.put("x", 6).unwrap();
    assert_eq!(sim.get("z").unwrap(), Value::Int(-36));
}

// ---------------------------------------------------------------------------
// Failures at query time
// ---------------------------------------------------------------------------

#[test]
fn dangling_input_surfaces_as_deepest_cause() {
    let mut sim = Simulator::new(two_stage_patterns());
    sim.put("a", 101).unwrap();
    sim.put("c", 3).unwrap();
    let err = sim.get("q2").unwrap_err();
    assert!(matches!(err, SimulatorError::ValidationFailed { .. }));
    assert_eq!(
        err.deepest_slot_error(),
        Some(&SlotError::NoProducer { slot: "b".into() })
    );
    assert_eq!(
        err.root_cause().to_string(),
        "slot 'b' has no value and no producer"
    );

    // A retry after supplying the input recomputes.
    sim.put("b", 7).unwrap();
    assert_eq!(sim.get("q2").unwrap(), Value::Int(1));
}

#[test]
fn rejected_input_is_reported_and_recoverable() {
    let mut sim = Simulator::new(two_stage_patterns());
    sim.put("a", 101).unwrap();
    sim.put("b", 7).unwrap();
    // The slot accepts any int; the divisor check runs when the value is fed.
    sim.put("c", 0).unwrap();
    let err = sim.get("q2").unwrap_err();
    let root = err.root_cause().to_string();
    assert_eq!(root, "invalid value for 'right': division by zero");
    assert_eq!(sim.state("q2").unwrap(), SlotState::Invalid);
    assert_eq!(sim.get("q").unwrap(), Value::Int(14));

    sim.put("c", 2).unwrap();
    assert_eq!(sim.get("q2").unwrap(), Value::Int(1));
    assert_eq!(sim.get("r2").unwrap(), Value::Int(1));
}

// ---------------------------------------------------------------------------
// Nesting and hosting
// ---------------------------------------------------------------------------

#[test]
fn nested_simulator_matches_inlined_pipeline() {
    let inner = Simulator::new(vec![
        Pattern::value("a", TypeTag::Int),
        Pattern::value("b", TypeTag::Int),
        Pattern::value("q", TypeTag::Int),
        Pattern::value("r", TypeTag::Int),
        divmod("a", "b", "q", "r"),
    ]);
    assert_eq!(
        inner.input_spec(),
        port_spec([("a", TypeTag::Int), ("b", TypeTag::Int)])
    );

    let mut nested = Simulator::new(vec![
        Pattern::value("a", TypeTag::Int),
        Pattern::value("b", TypeTag::Int),
        Pattern::value("c", TypeTag::Int),
        Pattern::value("r", TypeTag::Int),
        Pattern::value("q2", TypeTag::Int),
        Pattern::value("r2", TypeTag::Int),
        Pattern::procedure(inner, [("a", "a"), ("b", "b")], [("r", "r")]),
        divmod("r", "c", "q2", "r2"),
    ]);
    let mut inlined = Simulator::new(two_stage_patterns());
    assert!(nested.is_initialized());

    for (a, b, c) in [(101, 7, 3), (101, 7, 2), (50, 9, 4), (50, 9, 4)] {
        for sim in [&mut nested, &mut inlined] {
            sim.put("a", a).unwrap();
            sim.put("b", b).unwrap();
            sim.put("c", c).unwrap();
        }
        assert_eq!(nested.get("q2").unwrap(), inlined.get("q2").unwrap());
        assert_eq!(nested.get("r2").unwrap(), inlined.get("r2").unwrap());
        assert_eq!(nested.get("q2").unwrap(), Value::Int(expected_q2(a, b, c)));
    }
}

#[test]
fn nested_failure_maps_to_procedure_error() {
    let mut inner = Simulator::new(vec![
        Pattern::value("a", TypeTag::Int),
        Pattern::value("b", TypeTag::Int),
        Pattern::value("q", TypeTag::Int),
        Pattern::value("r", TypeTag::Int),
        divmod("a", "b", "q", "r"),
    ]);
    Procedure::put(&mut inner, "a", Value::Int(3)).unwrap();
    assert_eq!(
        Procedure::get(&mut inner, "q"),
        Err(ProcedureError::InputsIncomplete {
            missing: vec!["b".into()]
        })
    );
    assert_eq!(
        Procedure::put(&mut inner, "b", Value::from("x")),
        Err(ProcedureError::IncompatibleType {
            name: "b".into(),
            expected: TypeTag::Int,
            got: TypeTag::Str,
        })
    );
}

#[test]
fn simulator_can_be_shared_behind_a_mutex() {
    let sim = Arc::new(Mutex::new(Simulator::new(two_stage_patterns())));
    let handles: Vec<_> = (1..=4)
        .map(|c| {
            let sim = Arc::clone(&sim);
            std::thread::spawn(move || {
                let mut sim = sim.lock().unwrap();
                sim.put("a", 101).unwrap();
                sim.put("b", 7).unwrap();
                sim.put("c", c).unwrap();
                sim.get("q2").unwrap()
            })
        })
        .collect();
    for (c, handle) in (1..=4).zip(handles) {
        assert_eq!(handle.join().unwrap(), Value::Int(expected_q2(101, 7, c)));
    }
}
