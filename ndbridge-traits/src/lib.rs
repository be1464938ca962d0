//! Shared element-level traits for `ndbridge`.
//!
//! This crate holds everything that describes a single array element:
//! dtype descriptors, the [`Element`] mapping between Rust types and dtypes,
//! host-object handles, and the Value Type Traits used by the iterator facade
//! to read and write elements without knowing their type statically.

pub mod dtype;
pub mod element;
pub mod object;
pub mod value;

pub use dtype::{CastingMode, DType, DTypeKind};
pub use element::Element;
pub use object::{HostObject, ObjectRef};
pub use value::{
    value_traits_for, NumericValue, ObjectReferenceValue, Value, ValueKind, ValueTypeTraits,
};

/// Errors raised when converting between [`Value`]s and element slots.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    #[error("expected {expected} value, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("value {value} out of range for {dtype}")]
    OutOfRange { value: String, dtype: &'static str },

    #[error("cannot convert complex value with non-zero imaginary part to {0}")]
    ComplexToReal(&'static str),

    #[error("dtype {0} is not numeric")]
    NotNumeric(&'static str),
}
