//! The procflow type tags.
//!
//! A [`TypeTag`] is the static identity of the values a slot or port accepts.
//! Patterns carry tags instead of runtime type objects: a link given as a tag
//! asks the builder to materialize a slot of that type.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared type of a value slot or procedure port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    /// Top type: every value satisfies it.
    Any,
    Unit,
    Bool,
    Int,
    Float,
    Complex,
    Str,
    /// Heterogeneous list of values.
    List,
    /// String-keyed record with insertion-ordered fields.
    Map,
    /// Embedder-defined payload, identified by name only.
    Opaque(String),
}

impl TypeTag {
    /// Shorthand for an opaque tag.
    pub fn opaque(name: impl Into<String>) -> Self {
        TypeTag::Opaque(name.into())
    }

    /// Returns `true` for `Bool`, `Int`, `Float` and `Complex`.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            TypeTag::Bool | TypeTag::Int | TypeTag::Float | TypeTag::Complex
        )
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Any => write!(f, "any"),
            TypeTag::Unit => write!(f, "unit"),
            TypeTag::Bool => write!(f, "bool"),
            TypeTag::Int => write!(f, "int"),
            TypeTag::Float => write!(f, "float"),
            TypeTag::Complex => write!(f, "complex"),
            TypeTag::Str => write!(f, "str"),
            TypeTag::List => write!(f, "list"),
            TypeTag::Map => write!(f, "map"),
            TypeTag::Opaque(name) => write!(f, "{name}"),
        }
    }
}

/// Complex number payload for [`TypeTag::Complex`] values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub fn new(re: f64, im: f64) -> Self {
        Complex { re, im }
    }
}

impl From<f64> for Complex {
    fn from(re: f64) -> Self {
        Complex { re, im: 0.0 }
    }
}

impl fmt::Display for Complex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.im < 0.0 {
            write!(f, "({}-{}j)", self.re, -self.im)
        } else {
            write!(f, "({}+{}j)", self.re, self.im)
        }
    }
}
