//! Calculator: a procedure built around a single `calculate` step.
//!
//! Implement [`Calculate`] to declare the ports and the computation, then
//! wrap it in a [`Calculator`]. The calculator stores every input it is
//! given, type-checks it against the declared port and runs the optional
//! domain check. Outputs are computed on the first `get` after an input
//! changed and cached until the next `put`.

use indexmap::IndexMap;
use procflow_core::{fits, PortSpec, Procedure, ProcedureError, Value};

/// The computation behind a [`Calculator`].
pub trait Calculate: Send {
    /// Declared input ports.
    fn inputs(&self) -> PortSpec;

    /// Declared output ports.
    fn outputs(&self) -> PortSpec;

    /// Domain check for one well-typed input value. `Err` carries the reason.
    fn check(&self, _port: &str, _value: &Value) -> Result<(), String> {
        Ok(())
    }

    /// Computes the outputs from a complete set of inputs.
    ///
    /// Returning fewer outputs than declared is allowed; asking for a missing
    /// one later reports [`ProcedureError::IncompleteOutput`].
    fn calculate(&mut self, inputs: &IndexMap<String, Value>)
        -> Result<IndexMap<String, Value>, String>;

    fn label(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

pub struct Calculator<C> {
    calc: C,
    input_spec: PortSpec,
    output_spec: PortSpec,
    inputs: IndexMap<String, Value>,
    outputs: IndexMap<String, Value>,
    needs_run: bool,
    runs: usize,
}

impl<C: Calculate> Calculator<C> {
    pub fn new(calc: C) -> Self {
        let input_spec = calc.inputs();
        let output_spec = calc.outputs();
        Calculator {
            calc,
            input_spec,
            output_spec,
            inputs: IndexMap::new(),
            outputs: IndexMap::new(),
            needs_run: true,
            runs: 0,
        }
    }

    /// Input ports that have not received a value yet, in declaration order.
    pub fn missing_inputs(&self) -> Vec<&str> {
        self.input_spec
            .keys()
            .filter(|port| !self.inputs.contains_key(*port))
            .map(String::as_str)
            .collect()
    }

    /// Whether an input changed since the last successful run.
    pub fn needs_run(&self) -> bool {
        self.needs_run
    }

    /// How many times `calculate` has been called.
    pub fn run_count(&self) -> usize {
        self.runs
    }

    /// Whether the input or output port `name` currently holds a value.
    pub fn has_value(&self, name: &str) -> Result<bool, ProcedureError> {
        if self.input_spec.contains_key(name) {
            Ok(self.inputs.contains_key(name))
        } else if self.output_spec.contains_key(name) {
            Ok(self.outputs.contains_key(name))
        } else {
            Err(ProcedureError::invalid_name(name))
        }
    }

    pub fn inner(&self) -> &C {
        &self.calc
    }

    /// Runs `calculate` on the current inputs.
    pub fn run(&mut self) -> Result<(), ProcedureError> {
        let missing = self.missing_inputs();
        if !missing.is_empty() {
            return Err(ProcedureError::InputsIncomplete {
                missing: missing.into_iter().map(String::from).collect(),
            });
        }
        self.runs += 1;
        let produced = self
            .calc
            .calculate(&self.inputs)
            .map_err(ProcedureError::run_failed)?;
        let mut outputs = IndexMap::with_capacity(produced.len());
        for (port, value) in produced {
            let Some(ty) = self.output_spec.get(&port) else {
                return Err(ProcedureError::run_failed(format!(
                    "produced undeclared output '{port}'"
                )));
            };
            if !fits(&value, ty) {
                return Err(ProcedureError::run_failed(format!(
                    "output '{port}' expects {ty}, got {}",
                    value.type_tag()
                )));
            }
            outputs.insert(port, value);
        }
        self.outputs = outputs;
        self.needs_run = false;
        tracing::trace!(
            calculator = %self.calc.label(),
            runs = self.runs,
            "calculate ran"
        );
        Ok(())
    }
}

impl<C: Calculate> Procedure for Calculator<C> {
    fn input_spec(&self) -> PortSpec {
        self.input_spec.clone()
    }

    fn output_spec(&self) -> PortSpec {
        self.output_spec.clone()
    }

    fn put(&mut self, name: &str, value: Value) -> Result<(), ProcedureError> {
        let ty = self
            .input_spec
            .get(name)
            .ok_or_else(|| ProcedureError::invalid_name(name))?;
        if !fits(&value, ty) {
            return Err(ProcedureError::IncompatibleType {
                name: name.to_string(),
                expected: ty.clone(),
                got: value.type_tag(),
            });
        }
        self.calc
            .check(name, &value)
            .map_err(|reason| ProcedureError::InvalidValue {
                name: name.to_string(),
                reason,
            })?;
        self.inputs.insert(name.to_string(), value);
        self.outputs.clear();
        self.needs_run = true;
        Ok(())
    }

    fn get(&mut self, name: &str) -> Result<Value, ProcedureError> {
        if !self.output_spec.contains_key(name) {
            return Err(ProcedureError::invalid_name(name));
        }
        if self.needs_run {
            self.run()?;
        }
        self.outputs
            .get(name)
            .cloned()
            .ok_or_else(|| ProcedureError::IncompleteOutput {
                name: name.to_string(),
            })
    }

    fn label(&self) -> &str {
        self.calc.label()
    }
}
