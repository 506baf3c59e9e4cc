//! Wrapper: procedures made from plain closures.
//!
//! A [`Wrapper`] holds a closure together with its ordered input ports and
//! ordered output ports. The closure receives the inputs as a slice in port
//! order and returns the outputs as a vector in port order. Each call to
//! [`Wrapper::create`] yields a fresh [`FnProcedure`] with no values, all
//! sharing the same closure.

use std::sync::Arc;

use indexmap::IndexMap;
use procflow_core::{fits, port_spec, PortSpec, Procedure, ProcedureError, TypeTag, Value};

type Func = dyn Fn(&[Value]) -> Result<Vec<Value>, String> + Send + Sync;

/// Factory of [`FnProcedure`]s sharing one closure.
#[derive(Clone)]
pub struct Wrapper {
    label: Arc<str>,
    func: Arc<Func>,
    inputs: PortSpec,
    outputs: PortSpec,
}

impl Wrapper {
    pub fn new<I, O, S, T, F>(inputs: I, outputs: O, func: F) -> Self
    where
        I: IntoIterator<Item = (S, TypeTag)>,
        O: IntoIterator<Item = (T, TypeTag)>,
        S: Into<String>,
        T: Into<String>,
        F: Fn(&[Value]) -> Result<Vec<Value>, String> + Send + Sync + 'static,
    {
        Wrapper {
            label: Arc::from("wrapper"),
            func: Arc::new(func),
            inputs: port_spec(inputs),
            outputs: port_spec(outputs),
        }
    }

    /// Sets the label every created procedure reports.
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Arc::from(label);
        self
    }

    pub fn input_spec(&self) -> &PortSpec {
        &self.inputs
    }

    pub fn output_spec(&self) -> &PortSpec {
        &self.outputs
    }

    /// Creates a procedure with no input or output values.
    pub fn create(&self) -> FnProcedure {
        FnProcedure {
            wrapper: self.clone(),
            inputs: IndexMap::new(),
            outputs: IndexMap::new(),
        }
    }
}

impl std::fmt::Debug for Wrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wrapper")
            .field("label", &self.label)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

/// A procedure running a [`Wrapper`]'s closure.
#[derive(Debug)]
pub struct FnProcedure {
    wrapper: Wrapper,
    inputs: IndexMap<String, Value>,
    outputs: IndexMap<String, Value>,
}

impl FnProcedure {
    /// Whether the input or output port `name` currently holds a value.
    pub fn has_value(&self, name: &str) -> Result<bool, ProcedureError> {
        if self.wrapper.inputs.contains_key(name) {
            Ok(self.inputs.contains_key(name))
        } else if self.wrapper.outputs.contains_key(name) {
            Ok(self.outputs.contains_key(name))
        } else {
            Err(ProcedureError::invalid_name(name))
        }
    }

    /// Calls the closure with the current inputs.
    pub fn run(&mut self) -> Result<(), ProcedureError> {
        let mut args = Vec::with_capacity(self.wrapper.inputs.len());
        let mut missing = Vec::new();
        for port in self.wrapper.inputs.keys() {
            match self.inputs.get(port) {
                Some(value) => args.push(value.clone()),
                None => missing.push(port.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(ProcedureError::InputsIncomplete { missing });
        }

        let results = (self.wrapper.func)(&args).map_err(ProcedureError::run_failed)?;
        if results.len() != self.wrapper.outputs.len() {
            return Err(ProcedureError::run_failed(format!(
                "expected {} outputs, got {}",
                self.wrapper.outputs.len(),
                results.len()
            )));
        }
        let mut outputs = IndexMap::with_capacity(results.len());
        for ((port, ty), value) in self.wrapper.outputs.iter().zip(results) {
            if !fits(&value, ty) {
                return Err(ProcedureError::run_failed(format!(
                    "output '{port}' expects {ty}, got {}",
                    value.type_tag()
                )));
            }
            outputs.insert(port.clone(), value);
        }
        self.outputs = outputs;
        tracing::trace!(procedure = %self.wrapper.label, "wrapped function ran");
        Ok(())
    }
}

impl Procedure for FnProcedure {
    fn input_spec(&self) -> PortSpec {
        self.wrapper.inputs.clone()
    }

    fn output_spec(&self) -> PortSpec {
        self.wrapper.outputs.clone()
    }

    fn put(&mut self, name: &str, value: Value) -> Result<(), ProcedureError> {
        let ty = self
            .wrapper
            .inputs
            .get(name)
            .ok_or_else(|| ProcedureError::invalid_name(name))?;
        if !fits(&value, ty) {
            return Err(ProcedureError::IncompatibleType {
                name: name.to_string(),
                expected: ty.clone(),
                got: value.type_tag(),
            });
        }
        self.inputs.insert(name.to_string(), value);
        self.outputs.clear();
        Ok(())
    }

    fn get(&mut self, name: &str) -> Result<Value, ProcedureError> {
        if !self.wrapper.outputs.contains_key(name) {
            return Err(ProcedureError::invalid_name(name));
        }
        if self.outputs.is_empty() {
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
        &self.wrapper.label
    }
}
