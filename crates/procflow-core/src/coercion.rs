//! Type assignability and numeric widening rules.
//!
//! Defines when a value of one declared type may flow into a slot or port of
//! another. The policy is a small whitelist:
//!
//! - Every type satisfies itself and [`TypeTag::Any`].
//! - `Bool` is a declared subtype of `Int`.
//! - Numeric widening: `Int` -> `Float` -> `Complex` (transitively, so `Bool`
//!   also widens to `Float` and `Complex`).
//! - NO narrowing, NO conversion between unrelated types (`Int` never fits
//!   `Str`, an opaque type fits only an opaque type of the same name).
//!
//! Satisfying a wider type never converts the value: an `Int` stored in a
//! `Float` slot stays an `Int`. Consumers read it through the widening
//! accessors on [`Value`].

use crate::types::TypeTag;
use crate::value::Value;

/// Returns `true` if a value of type `actual` may be used where `required`
/// is declared.
pub fn satisfies(actual: &TypeTag, required: &TypeTag) -> bool {
    if actual == required || *required == TypeTag::Any {
        return true;
    }

    // Numeric tower: a narrower kind widens to any wider kind.
    match (numeric_rank(actual), numeric_rank(required)) {
        (Some(from), Some(to)) => from < to,
        _ => false,
    }
}

/// Returns `true` if `value`'s runtime type satisfies `required`.
pub fn fits(value: &Value, required: &TypeTag) -> bool {
    satisfies(&value.type_tag(), required)
}

/// Returns the widening rank of a numeric type.
/// Higher rank means wider type. Non-numeric types have no rank.
fn numeric_rank(tag: &TypeTag) -> Option<u8> {
    match tag {
        TypeTag::Bool => Some(1),
        TypeTag::Int => Some(2),
        TypeTag::Float => Some(3),
        TypeTag::Complex => Some(4),
        _ => None,
    }
}
