//! Iteration configuration.

use ndbridge_traits::CastingMode;

/// Flattened index order of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OrderMode {
    /// The cursor picks the order, possibly reordering and flipping dims.
    #[default]
    Any,
    /// Row-major: the last loop dim varies fastest.
    C,
    /// Column-major: the first loop dim varies fastest.
    F,
}

/// Options passed explicitly to every [`crate::Cursor`].
///
/// The default matches what the iterator facade uses: row-major indexing
/// (`preserve_order`), no casting, object elements allowed, no stride
/// negation and no reductions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IterationConfig {
    pub order: OrderMode,
    pub casting: CastingMode,
    pub allow_object_elements: bool,
    pub negate_strides: bool,
    /// Force row-major indexing regardless of `order`.
    pub preserve_order: bool,
    /// Allow writable operands to be stretched (reduction outputs).
    pub reduce_ok: bool,
}

impl Default for IterationConfig {
    fn default() -> Self {
        Self {
            order: OrderMode::Any,
            casting: CastingMode::No,
            allow_object_elements: true,
            negate_strides: false,
            preserve_order: true,
            reduce_ok: false,
        }
    }
}

impl IterationConfig {
    /// Free ordering with stride negation, for passes whose visiting order is irrelevant.
    pub fn unordered() -> Self {
        Self {
            order: OrderMode::Any,
            negate_strides: true,
            preserve_order: false,
            ..Self::default()
        }
    }

    pub fn with_order(mut self, order: OrderMode) -> Self {
        self.order = order;
        self
    }

    pub fn with_casting(mut self, casting: CastingMode) -> Self {
        self.casting = casting;
        self
    }

    pub fn with_object_elements(mut self, allow: bool) -> Self {
        self.allow_object_elements = allow;
        self
    }

    pub fn with_negate_strides(mut self, allow: bool) -> Self {
        self.negate_strides = allow;
        self
    }

    pub fn with_preserve_order(mut self, preserve: bool) -> Self {
        self.preserve_order = preserve;
        self
    }

    pub fn with_reduce_ok(mut self, reduce_ok: bool) -> Self {
        self.reduce_ok = reduce_ok;
        self
    }

    /// Whether the cursor may choose its own dimension order.
    pub(crate) fn reorder_allowed(&self) -> bool {
        self.order == OrderMode::Any && !self.preserve_order
    }
}
