//! The [`Procedure`] trait defining the contract between the graph and the
//! computations it schedules.
//!
//! A procedure declares named, typed input and output ports. The graph pushes
//! each changed input with [`Procedure::put`] and pulls each output with
//! [`Procedure::get`]; a procedure never sees slots, nodes or other
//! procedures. Whether `get` recomputes or returns a cached result is the
//! procedure's own business.
//!
//! The trait is synchronous and the graph drives it from a single thread. The
//! `Send` bound only exists so that a whole simulator can be moved behind a
//! host-side mutex.

use indexmap::IndexMap;

use crate::error::ProcedureError;
use crate::types::TypeTag;
use crate::value::Value;

/// Ordered port name -> declared type mapping.
pub type PortSpec = IndexMap<String, TypeTag>;

/// Builds a [`PortSpec`] from `(name, type)` pairs, keeping their order.
pub fn port_spec<I, S>(ports: I) -> PortSpec
where
    I: IntoIterator<Item = (S, TypeTag)>,
    S: Into<String>,
{
    ports
        .into_iter()
        .map(|(name, ty)| (name.into(), ty))
        .collect()
}

/// A unit of computation with named typed inputs and outputs.
pub trait Procedure: Send {
    /// Declared input ports.
    fn input_spec(&self) -> PortSpec;

    /// Declared output ports.
    ///
    /// May change after [`specialize`](Self::specialize) for procedures whose
    /// output schema depends on the types bound to their inputs.
    fn output_spec(&self) -> PortSpec;

    /// Called once at wiring time with the declared types of the slots bound
    /// to each input port, before any output port is bound.
    fn specialize(&mut self, _bound_inputs: &PortSpec) -> Result<(), ProcedureError> {
        Ok(())
    }

    /// Accepts one freshly changed input value.
    ///
    /// Must reject unknown names with [`ProcedureError::InvalidName`],
    /// ill-typed values with [`ProcedureError::IncompatibleType`] and values
    /// outside the procedure's domain with [`ProcedureError::InvalidValue`].
    fn put(&mut self, name: &str, value: Value) -> Result<(), ProcedureError>;

    /// Returns the current value of an output port, computing it if needed.
    fn get(&mut self, name: &str) -> Result<Value, ProcedureError>;

    /// Human-readable name used in diagnostics and traces.
    fn label(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<P: Procedure + ?Sized> Procedure for Box<P> {
    fn input_spec(&self) -> PortSpec {
        (**self).input_spec()
    }

    fn output_spec(&self) -> PortSpec {
        (**self).output_spec()
    }

    fn specialize(&mut self, bound_inputs: &PortSpec) -> Result<(), ProcedureError> {
        (**self).specialize(bound_inputs)
    }

    fn put(&mut self, name: &str, value: Value) -> Result<(), ProcedureError> {
        (**self).put(name, value)
    }

    fn get(&mut self, name: &str) -> Result<Value, ProcedureError> {
        (**self).get(name)
    }

    fn label(&self) -> &str {
        (**self).label()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coercion::fits;

    /// Echoes its single input.
    struct Echo {
        value: Option<Value>,
    }

    impl Procedure for Echo {
        fn input_spec(&self) -> PortSpec {
            port_spec([("in", TypeTag::Any)])
        }

        fn output_spec(&self) -> PortSpec {
            port_spec([("out", TypeTag::Any)])
        }

        fn put(&mut self, name: &str, value: Value) -> Result<(), ProcedureError> {
            if name != "in" {
                return Err(ProcedureError::invalid_name(name));
            }
            debug_assert!(fits(&value, &TypeTag::Any));
            self.value = Some(value);
            Ok(())
        }

        fn get(&mut self, name: &str) -> Result<Value, ProcedureError> {
            if name != "out" {
                return Err(ProcedureError::invalid_name(name));
            }
            self.value
                .clone()
                .ok_or_else(|| ProcedureError::InputsIncomplete {
                    missing: vec!["in".into()],
                })
        }

        fn label(&self) -> &str {
            "echo"
        }
    }

    #[test]
    fn port_spec_keeps_order() {
        let spec = port_spec([("z", TypeTag::Int), ("a", TypeTag::Str)]);
        let names: Vec<&str> = spec.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["z", "a"]);
    }

    #[test]
    fn boxed_procedure_delegates() {
        let mut boxed: Box<dyn Procedure> = Box::new(Echo { value: None });
        assert_eq!(boxed.label(), "echo");
        assert!(matches!(
            boxed.get("out"),
            Err(ProcedureError::InputsIncomplete { .. })
        ));
        boxed.put("in", Value::Int(4)).unwrap();
        assert_eq!(boxed.get("out").unwrap(), Value::Int(4));
        assert_eq!(
            boxed.put("nope", Value::Unit),
            Err(ProcedureError::invalid_name("nope"))
        );
    }
}
