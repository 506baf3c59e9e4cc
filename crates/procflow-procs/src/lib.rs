//! Ready-made [`Procedure`](procflow_core::Procedure) implementations.
//!
//! - [`Calculator`] turns a plain [`Calculate`] step into a procedure that
//!   validates its inputs and recomputes lazily.
//! - [`Wrapper`] turns a closure into a factory of independent
//!   [`FnProcedure`] instances.

pub mod calculator;
pub mod wrapper;

pub use calculator::{Calculate, Calculator};
pub use wrapper::{FnProcedure, Wrapper};
