//! Typed single-value storage cells.
//!
//! A [`ValueSlot`] holds at most one [`Value`] of its declared type and tracks
//! its freshness:
//!
//! - `Invalid`: no usable value.
//! - `Fresh`: a new value that at least one consumer has not acknowledged.
//! - `Stable`: a value every consumer has acknowledged, or a value nobody
//!   consumes.
//!
//! The slot only manages its own state. Messages to linked procedures
//! (invalidation after a write, running the producer during validation) are
//! delivered by the owning [`Graph`](crate::graph::Graph), which asks the slot
//! what to notify.

use indexmap::IndexSet;
use procflow_core::{fits, ProcId, TypeTag, Value};
use serde::{Deserialize, Serialize};

use crate::error::{LinkError, SlotError};

/// Freshness of a slot's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotState {
    Invalid,
    Fresh,
    Stable,
}

/// A named, typed storage cell with at most one producer and any number of
/// consumers.
#[derive(Debug, Clone)]
pub struct ValueSlot {
    name: String,
    ty: TypeTag,
    state: SlotState,
    value: Option<Value>,
    producer: Option<ProcId>,
    consumers: IndexSet<ProcId>,
    /// Consumers that have not acknowledged the current value.
    pending: IndexSet<ProcId>,
    sealed: bool,
}

impl ValueSlot {
    /// Creates an empty, unsealed slot.
    pub fn new(name: impl Into<String>, ty: TypeTag) -> Self {
        ValueSlot {
            name: name.into(),
            ty,
            state: SlotState::Invalid,
            value: None,
            producer: None,
            consumers: IndexSet::new(),
            pending: IndexSet::new(),
            sealed: false,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &TypeTag {
        &self.ty
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn producer(&self) -> Option<ProcId> {
        self.producer
    }

    pub fn consumers(&self) -> &IndexSet<ProcId> {
        &self.consumers
    }

    /// Consumers that still owe an acknowledgement of the current value.
    pub fn pending_consumers(&self) -> &IndexSet<ProcId> {
        &self.pending
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Returns `true` if `node` is linked to this slot in any role.
    pub fn is_linked(&self, node: ProcId) -> bool {
        self.producer == Some(node) || self.consumers.contains(&node)
    }

    // -----------------------------------------------------------------------
    // Wiring
    // -----------------------------------------------------------------------

    /// Freezes the link set.
    ///
    /// # Panics
    ///
    /// Panics if the slot is already sealed.
    pub fn seal(&mut self) {
        assert!(!self.sealed, "slot '{}' is already sealed", self.name);
        self.sealed = true;
    }

    /// Records `producer` as the procedure writing this slot.
    pub fn bind_as_output_of(&mut self, producer: ProcId) -> Result<(), LinkError> {
        self.assert_unsealed();
        if self.is_linked(producer) {
            return Err(LinkError::AlreadyLinked {
                slot: self.name.clone(),
                node: producer,
            });
        }
        if self.producer.is_some() {
            return Err(LinkError::TooManyProducers {
                slot: self.name.clone(),
            });
        }
        self.producer = Some(producer);
        Ok(())
    }

    /// Records `consumer` as a procedure reading this slot.
    pub fn bind_as_input_of(&mut self, consumer: ProcId) -> Result<(), LinkError> {
        self.assert_unsealed();
        if self.is_linked(consumer) {
            return Err(LinkError::AlreadyLinked {
                slot: self.name.clone(),
                node: consumer,
            });
        }
        self.consumers.insert(consumer);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Runtime
    // -----------------------------------------------------------------------

    /// Stores `value`.
    ///
    /// On success the slot is `Fresh` with every consumer pending, or
    /// `Stable` when nobody consumes it. The caller must then invalidate every
    /// consumer. A rejected value leaves the slot untouched.
    pub fn write(&mut self, value: Value) -> Result<(), SlotError> {
        self.assert_sealed();
        if !fits(&value, &self.ty) {
            return Err(SlotError::IncompatibleType {
                slot: self.name.clone(),
                expected: self.ty.clone(),
                got: value.type_tag(),
            });
        }
        self.value = Some(value);
        self.pending = self.consumers.clone();
        self.state = if self.consumers.is_empty() {
            SlotState::Stable
        } else {
            SlotState::Fresh
        };
        Ok(())
    }

    /// Drops the current value.
    ///
    /// Returns `true` if the state changed, in which case the caller must
    /// invalidate every consumer. Invalidating an invalid slot is a no-op.
    pub fn invalidate(&mut self) -> bool {
        self.assert_sealed();
        if self.state == SlotState::Invalid {
            return false;
        }
        self.state = SlotState::Invalid;
        self.value = None;
        self.pending.clear();
        true
    }

    /// Marks the current value as used by `consumer`.
    pub fn acknowledge_consumed(&mut self, consumer: ProcId) -> Result<(), SlotError> {
        self.assert_sealed();
        if !self.consumers.contains(&consumer) {
            return Err(SlotError::NotAConsumer {
                slot: self.name.clone(),
                node: consumer,
            });
        }
        if self.state == SlotState::Invalid {
            return Err(SlotError::StateIsInvalid {
                slot: self.name.clone(),
            });
        }
        self.pending.shift_remove(&consumer);
        if self.pending.is_empty() {
            self.state = SlotState::Stable;
        }
        Ok(())
    }

    /// Decides what validating this slot requires.
    ///
    /// Returns `Ok(None)` when the slot already holds a value and
    /// `Ok(Some(producer))` when the producer must run first.
    pub fn validation_target(&self) -> Result<Option<ProcId>, SlotError> {
        self.assert_sealed();
        if self.state != SlotState::Invalid {
            return Ok(None);
        }
        match self.producer {
            Some(producer) => Ok(Some(producer)),
            None => Err(SlotError::NoProducer {
                slot: self.name.clone(),
            }),
        }
    }

    /// Borrows the current value.
    pub fn read(&self) -> Result<&Value, SlotError> {
        self.assert_sealed();
        match (&self.state, &self.value) {
            (SlotState::Invalid, _) | (_, None) => Err(SlotError::NoValue {
                slot: self.name.clone(),
            }),
            (_, Some(value)) => Ok(value),
        }
    }

    fn assert_sealed(&self) {
        assert!(self.sealed, "slot '{}' is used before it is sealed", self.name);
    }

    fn assert_unsealed(&self) {
        assert!(!self.sealed, "slot '{}' is sealed, links are frozen", self.name);
    }
}
