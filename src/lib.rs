//! Dynamically typed strided arrays with a broadcasting multi-operand iterator.
//!
//! `ndbridge` models arrays the way an array runtime exposes them to native
//! extension code: a raw data pointer, a shape, signed byte strides, a
//! [`DType`] and a set of flag bits, with buffer lifetime managed by shared
//! ownership. On top of that it provides the machinery to traverse several
//! such arrays in lock-step.
//!
//! # Core Types
//!
//! - [`Array`]: a cheap-to-clone view over a reference-counted buffer
//! - [`OperandDescriptor`]: one array plus its access mode, core shape and
//!   optional broadcast-reduction map
//! - [`Cursor`]: the stateful multi-operand traversal engine
//! - [`MultiFlatIter`] / [`MultiIter`]: random-access and forward iterators
//!   over a cursor, with per-operand [`ValueTypeTraits`]
//!
//! # Broadcasting
//!
//! Operand shapes are negotiated with NumPy rules by [`broadcast::resolve`]:
//! shapes are right-aligned and size-1 dimensions stretch.
//!
//! ```rust
//! use ndbridge::{Array, MultiFlatIter, Value};
//!
//! let a = Array::from_vec(&[2, 3], vec![1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
//! let b = Array::from_vec(&[3], vec![10i64, 20, 30]).unwrap();
//!
//! let mut sums = Vec::new();
//! let mut it = MultiFlatIter::new(&[a, b]).unwrap();
//! while let Some(elems) = it.dereference() {
//!     let x: f64 = elems.read(0).unwrap();
//!     let y: i64 = elems.read(1).unwrap();
//!     sums.push(x + y as f64);
//!     it.increment();
//! }
//! assert_eq!(sums, vec![11.0, 22.0, 33.0, 14.0, 25.0, 36.0]);
//! assert_eq!(Value::Int(1), Value::Float(1.0));
//! ```
//!
//! # Iteration Order
//!
//! The cursor may reorder, flip and fuse loop dimensions for memory locality
//! when [`IterationConfig`] allows it. The flattened iteration index always
//! follows the cursor's own traversal order, so random access through
//! [`Cursor::jump_to_iter_index`] stays consistent with [`Cursor::next`].

mod array;
mod auxiliary;
pub mod broadcast;
mod buffer;
mod config;
mod cursor;
mod fuse;
mod iter;
pub mod layout;
mod ops_view;
mod order;
mod utilities;

pub use array::{array, empty, from_data, from_object, require, zeros, Array, ArrayFlags, Base};
pub use broadcast::{broadcast_shapes, BroadcastPlan, CoreShape, OperandDescriptor, OperandFlags};
pub use buffer::Buffer;
pub use config::{IterationConfig, OrderMode};
pub use cursor::Cursor;
pub use iter::{Elements, MultiFlatIter, MultiIter};
pub use layout::Order;
pub use ops_view::{copy_into, Scalarized};
pub use utilities::{all, all_into, any, any_into, empty_like, equal, equal_into};

pub use num_complex::{Complex32, Complex64};

pub use ndbridge_traits::{
    value_traits_for, CastingMode, DType, DTypeKind, Element, HostObject, NumericValue,
    ObjectRef, ObjectReferenceValue, Value, ValueError, ValueKind, ValueTypeTraits,
};

/// Maximum array rank accepted by the runtime.
pub const MAX_DIMS: usize = 32;

// ============================================================================
// Error types
// ============================================================================

/// Failures reported by the array runtime itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// A dtype reinterpretation is incompatible with the array's layout.
    #[error("cannot view {from} array as {to}: {reason}")]
    IncompatibleView {
        from: DType,
        to: DType,
        reason: &'static str,
    },

    /// The allocator returned no memory.
    #[error("failed to allocate {bytes} bytes")]
    AllocationFailed { bytes: usize },

    /// Rank exceeds [`MAX_DIMS`].
    #[error("{ndim} dimensions exceed the maximum of {max}")]
    TooManyDimensions { ndim: usize, max: usize },
}

/// Errors that can occur during array construction, view operations and iteration.
#[derive(Debug, thiserror::Error)]
pub enum NdError {
    /// Stride array length doesn't match the shape.
    #[error("Length of shape and strides arrays do not match")]
    StrideLengthMismatch,

    /// Array ranks do not match.
    #[error("rank mismatch: {0} vs {1}")]
    RankMismatch(usize, usize),

    /// Array shapes are incompatible for the operation.
    #[error("shape mismatch: {0:?} vs {1:?}")]
    ShapeMismatch(Vec<usize>, Vec<usize>),

    /// Two operands disagree on a non-1 size at the same loop position.
    #[error("operands could not be broadcast together: axis {axis} has sizes {left} and {right}")]
    BroadcastMismatch {
        axis: usize,
        left: usize,
        right: usize,
    },

    /// An operand's trailing dimensions differ from its declared core shape.
    #[error("operand {operand}: core shape {expected:?} does not match trailing dims {found:?}")]
    CoreShapeMismatch {
        operand: usize,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// An explicit broadcast-reduction map is malformed.
    #[error("operand {operand}: invalid broadcast map {map:?}")]
    InvalidBroadcastMap {
        operand: usize,
        map: Vec<Option<usize>>,
    },

    /// A writable operand would need to be stretched by broadcasting.
    #[error("output operand {operand} with shape {shape:?} cannot be broadcast to {loop_shape:?}")]
    NonBroadcastableOutput {
        operand: usize,
        shape: Vec<usize>,
        loop_shape: Vec<usize>,
    },

    /// Reshape changes the number of elements.
    #[error("cannot reshape array of size {size} into shape {shape:?}")]
    ReshapeSize { size: usize, shape: Vec<usize> },

    /// Invalid axis index for the given array rank.
    #[error("invalid axis {axis} for rank {rank}")]
    InvalidAxis { axis: usize, rank: usize },

    /// Axes do not form a permutation of `0..rank`.
    #[error("invalid permutation {0:?}")]
    InvalidPermutation(Vec<usize>),

    /// Element index outside the array.
    #[error("index {index:?} out of bounds for shape {shape:?}")]
    IndexOutOfBounds {
        index: Vec<usize>,
        shape: Vec<usize>,
    },

    /// The element count or byte extent of a shape does not fit in `isize`.
    #[error("array of shape {shape:?} with itemsize {itemsize} is too big")]
    ShapeTooLarge { shape: Vec<usize>, itemsize: usize },

    /// Rank outside the range a caller requires.
    #[error("array of rank {ndim} is outside the required range [{min}, {max}]")]
    RankOutOfRange { ndim: usize, min: usize, max: usize },

    /// Flag bits that cannot be enabled on this array.
    #[error("cannot enable {flags:?}")]
    FlagsNotAllowed { flags: crate::array::ArrayFlags },

    /// Object handles and numbers mixed without an explicit dtype.
    #[error("cannot infer a dtype from object elements mixed with numbers")]
    MixedObjectValues,

    /// Integer overflow or out-of-buffer access while computing an offset.
    #[error("offset overflow while computing pointer")]
    OffsetOverflow,

    /// `reset(true)` on a loop with no elements.
    #[error("iteration over an empty loop")]
    EmptyIteration,

    /// `jump_to_iter_index` outside `[0, size)`.
    #[error("iteration index {index} out of range for size {size}")]
    IterIndexOutOfRange { index: usize, size: usize },

    /// Object-dtype operand while object elements are disallowed.
    #[error("operand {operand} has object dtype but object elements are not allowed")]
    ObjectElementsNotAllowed { operand: usize },

    /// Conversion rejected by the configured casting mode.
    #[error("cannot cast {from} to {to} under {casting:?} casting")]
    CastNotAllowed {
        from: DType,
        to: DType,
        casting: CastingMode,
    },

    /// Element type differs from the one requested.
    #[error("dtype mismatch: expected {expected}, found {found}")]
    DTypeMismatch { expected: DType, found: DType },

    /// Write access requested on a read-only array.
    #[error("array is not writeable")]
    NotWriteable,

    /// Iteration needs at least one operand.
    #[error("at least one operand is required")]
    NoOperands,

    /// Number of access flags differs from the number of arrays.
    #[error("{arrays} arrays but {flags} operand flags")]
    OperandCountMismatch { arrays: usize, flags: usize },

    /// Failure delegated from the array runtime.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Element value conversion failure.
    #[error(transparent)]
    Value(#[from] ValueError),
}

/// Result type for array operations.
pub type Result<T> = std::result::Result<T, NdError>;
