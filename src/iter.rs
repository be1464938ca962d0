//! Typed iterator facade over [`Cursor`].
//!
//! Both iterator types accept any number of operands. Operand shapes are
//! broadcast together; writable operands must already have the full loop
//! shape. Indexing is row-major.
//!
//! Element access goes through [`Elements`], which delegates every read and
//! write to the operand's [`ValueTypeTraits`]. For object arrays that means
//! reads acquire a reference and writes release the previous object.

use std::rc::Rc;

use ndbridge_traits::{CastingMode, DType, Element, Value, ValueTypeTraits};

use crate::array::Array;
use crate::broadcast::{OperandDescriptor, OperandFlags};
use crate::config::{IterationConfig, OrderMode};
use crate::cursor::Cursor;
use crate::{NdError, Result};

#[derive(Debug, Clone)]
struct OperandAccess {
    /// Reads and writes the operand's own element layout.
    traits: Rc<dyn ValueTypeTraits>,
    /// Requested dtype when it differs from the operand's layout.
    cast_to: Option<DType>,
    /// Convert with `as` semantics (unsafe casting).
    lossy: bool,
    flags: OperandFlags,
}

fn operand_access(
    array: &Array,
    flags: OperandFlags,
    requested: Option<Rc<dyn ValueTypeTraits>>,
    config: &IterationConfig,
) -> Result<OperandAccess> {
    let native = array.dtype();
    let Some(traits) = requested else {
        return Ok(OperandAccess {
            traits: array.value_traits(),
            cast_to: None,
            lossy: false,
            flags,
        });
    };
    let target = traits.dtype();
    if DType::equivalent(&native, &target) {
        return Ok(OperandAccess {
            traits,
            cast_to: None,
            lossy: false,
            flags,
        });
    }
    let reject = |from: DType, to: DType| NdError::CastNotAllowed {
        from,
        to,
        casting: config.casting,
    };
    if native.is_object() != target.is_object() {
        return Err(reject(native, target));
    }
    if flags.is_readable() && !native.can_cast(&target, config.casting) {
        return Err(reject(native, target));
    }
    if flags.is_writable() && !target.can_cast(&native, config.casting) {
        return Err(reject(target, native));
    }
    Ok(OperandAccess {
        traits: array.value_traits(),
        cast_to: Some(target),
        lossy: config.casting == CastingMode::Unsafe,
        flags,
    })
}

/// Cursor plus per-operand access strategies; shared by both facades.
#[derive(Debug, Clone)]
struct IterState {
    cursor: Cursor,
    access: Rc<[OperandAccess]>,
    is_end: bool,
}

impl IterState {
    fn build(
        arrays: &[Array],
        flags: &[OperandFlags],
        traits: Option<Vec<Rc<dyn ValueTypeTraits>>>,
        config: IterationConfig,
    ) -> Result<Self> {
        if arrays.is_empty() {
            return Err(NdError::NoOperands);
        }
        if flags.len() != arrays.len() {
            return Err(NdError::OperandCountMismatch {
                arrays: arrays.len(),
                flags: flags.len(),
            });
        }
        let requested: Vec<Option<Rc<dyn ValueTypeTraits>>> = match traits {
            Some(traits) if traits.len() != arrays.len() => {
                return Err(NdError::OperandCountMismatch {
                    arrays: arrays.len(),
                    flags: traits.len(),
                })
            }
            Some(traits) => traits.into_iter().map(Some).collect(),
            None => vec![None; arrays.len()],
        };
        let access = arrays
            .iter()
            .zip(flags)
            .zip(requested)
            .map(|((array, &f), t)| operand_access(array, f, t, &config))
            .collect::<Result<Vec<_>>>()?;
        let operands = arrays
            .iter()
            .zip(flags)
            .map(|(array, &f)| OperandDescriptor::new(array.clone(), f))
            .collect();
        let cursor = Cursor::new(operands, config)?;
        let is_end = cursor.is_finished();
        Ok(Self {
            cursor,
            access: access.into(),
            is_end,
        })
    }

    fn rewind(&mut self) {
        self.is_end = !matches!(self.cursor.reset(false), Ok(true));
    }

    fn begin(&self) -> Self {
        let mut state = self.clone();
        state.rewind();
        state
    }

    fn end(&self) -> Self {
        let mut state = self.clone();
        state.is_end = true;
        state
    }

    fn step(&mut self) {
        if !self.is_end {
            self.is_end = !self.cursor.next();
        }
    }

    fn index(&self) -> usize {
        if self.is_end {
            self.cursor.get_iter_size()
        } else {
            self.cursor.get_iter_index()
        }
    }

    fn equal(&self, other: &Self) -> bool {
        match (self.is_end, other.is_end) {
            (true, true) => true,
            (false, false) => {
                self.cursor.get_iter_index() == other.cursor.get_iter_index()
                    && self.cursor.get_data(0) == other.cursor.get_data(0)
            }
            _ => false,
        }
    }

    fn dereference(&self) -> Option<Elements<'_>> {
        if self.is_end {
            return None;
        }
        Some(Elements {
            cursor: &self.cursor,
            access: &self.access,
        })
    }

    fn remaining(&self) -> usize {
        self.cursor.get_iter_size() - self.index()
    }
}

fn facade_config() -> IterationConfig {
    IterationConfig::default().with_order(OrderMode::C)
}

// ============================================================================
// Elements
// ============================================================================

/// The operands' current elements.
///
/// Returned by `dereference()`; valid until the iterator moves.
pub struct Elements<'a> {
    cursor: &'a Cursor,
    access: &'a [OperandAccess],
}

impl Elements<'_> {
    /// Number of operands.
    #[inline]
    pub fn len(&self) -> usize {
        self.access.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.access.is_empty()
    }

    /// Raw pointer to operand `i`'s current element.
    #[inline]
    pub fn ptr(&self, i: usize) -> *mut u8 {
        self.cursor.get_data(i)
    }

    /// Current value of operand `i`, converted to the requested dtype if any.
    pub fn get(&self, i: usize) -> Result<Value> {
        let access = &self.access[i];
        // SAFETY: the cursor points at a live element of operand i's dtype.
        let value = unsafe { access.traits.load(self.cursor.get_data(i)) };
        match access.cast_to {
            Some(dtype) if access.lossy => Ok(value.cast_lossy(dtype)?),
            Some(dtype) => Ok(value.cast(dtype)?),
            None => Ok(value),
        }
    }

    /// Store into operand `i`'s current element.
    ///
    /// The operand must have been opened writable; this is checked only in
    /// debug builds.
    pub fn set(&self, i: usize, value: impl Into<Value>) -> Result<()> {
        let access = &self.access[i];
        debug_assert!(
            access.flags.is_writable(),
            "operand {i} is not writable ({:?})",
            access.flags
        );
        let ptr = self.cursor.get_data(i);
        // SAFETY: the cursor points at a live element of operand i's dtype,
        // and construction verified the array is writeable.
        unsafe {
            if access.lossy {
                access.traits.store_lossy(ptr, value.into())?;
            } else {
                access.traits.store(ptr, value.into())?;
            }
        }
        Ok(())
    }

    pub fn read<T: Element>(&self, i: usize) -> Result<T> {
        Ok(T::from_value(self.get(i)?)?)
    }

    pub fn write<T: Element>(&self, i: usize, value: T) -> Result<()> {
        self.set(i, value.into_value())
    }

    /// All operands' current values.
    pub fn values(&self) -> Result<Vec<Value>> {
        (0..self.len()).map(|i| self.get(i)).collect()
    }
}

// ============================================================================
// MultiFlatIter
// ============================================================================

/// Random-access iterator over any number of broadcast operands.
///
/// The iterator is a position; [`begin`](Self::begin) and [`end`](Self::end)
/// produce positions that compare with [`equal`](Self::equal). As a Rust
/// [`Iterator`] it yields the operands' values from the current position on.
#[derive(Debug, Clone)]
pub struct MultiFlatIter {
    state: IterState,
}

impl MultiFlatIter {
    /// All operands read-only.
    pub fn new(arrays: &[Array]) -> Result<Self> {
        let flags = vec![OperandFlags::ReadOnly; arrays.len()];
        Self::with_flags(arrays, &flags)
    }

    pub fn with_flags(arrays: &[Array], flags: &[OperandFlags]) -> Result<Self> {
        Ok(Self {
            state: IterState::build(arrays, flags, None, facade_config())?,
        })
    }

    /// Operands accessed through explicit Value Type Traits.
    ///
    /// A trait whose dtype differs from the operand's must be reachable
    /// under `config.casting`: operand to trait dtype for readable operands,
    /// and back for writable ones.
    pub fn with_value_traits(
        arrays: &[Array],
        flags: &[OperandFlags],
        traits: Vec<Rc<dyn ValueTypeTraits>>,
        config: IterationConfig,
    ) -> Result<Self> {
        Ok(Self {
            state: IterState::build(arrays, flags, Some(traits), config)?,
        })
    }

    /// A fresh iterator at the first element (at the end for empty loops).
    pub fn begin(&self) -> Self {
        Self {
            state: self.state.begin(),
        }
    }

    /// The past-the-end position.
    pub fn end(&self) -> Self {
        Self {
            state: self.state.end(),
        }
    }

    #[inline]
    pub fn is_end(&self) -> bool {
        self.state.is_end
    }

    /// Move one element forward. Stays at the end once reached.
    pub fn increment(&mut self) {
        self.state.step();
    }

    /// Move by `n` elements. Positions before the first element clamp to
    /// the beginning, positions past the last to the end.
    pub fn advance(&mut self, n: isize) {
        let index = self.state.index();
        let target = if n < 0 {
            index.checked_sub(n.unsigned_abs())
        } else {
            index.checked_add(n.unsigned_abs())
        };
        match target {
            None if n < 0 => self.state.rewind(),
            Some(t) if t < self.get_iter_size() => {
                self.state.is_end = self.state.cursor.jump_to_iter_index(t).is_err();
            }
            _ => self.state.is_end = true,
        }
    }

    /// Signed number of increments from `self` to `other`.
    pub fn distance_to(&self, other: &Self) -> isize {
        other.state.index() as isize - self.state.index() as isize
    }

    /// Position equality. Two end positions are equal and an end position
    /// never equals a non-end one. Otherwise both the flattened index and
    /// operand 0's data pointer must match, since a stretched operand 0
    /// revisits the same address at different indices.
    pub fn equal(&self, other: &Self) -> bool {
        self.state.equal(&other.state)
    }

    /// Current elements, or `None` at the end.
    pub fn dereference(&self) -> Option<Elements<'_>> {
        self.state.dereference()
    }

    /// Flattened position; the iteration size at the end.
    pub fn get_iter_index(&self) -> usize {
        self.state.index()
    }

    pub fn get_iter_size(&self) -> usize {
        self.state.cursor.get_iter_size()
    }

    pub fn jump_to_iter_index(&mut self, i: usize) -> Result<()> {
        self.state.cursor.jump_to_iter_index(i)?;
        self.state.is_end = false;
        Ok(())
    }

    pub fn reset(&mut self, throws: bool) -> Result<bool> {
        let started = self.state.cursor.reset(throws);
        self.state.is_end = !matches!(started, Ok(true));
        started
    }

    pub fn nop(&self) -> usize {
        self.state.cursor.nop()
    }

    pub fn cursor(&self) -> &Cursor {
        &self.state.cursor
    }
}

impl PartialEq for MultiFlatIter {
    fn eq(&self, other: &Self) -> bool {
        self.equal(other)
    }
}

impl Iterator for MultiFlatIter {
    type Item = Result<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        let values = self.dereference()?.values();
        self.increment();
        Some(values)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.state.remaining();
        (n, Some(n))
    }
}

impl ExactSizeIterator for MultiFlatIter {}

// ============================================================================
// MultiIter
// ============================================================================

/// Forward-only iterator over any number of broadcast operands.
#[derive(Debug, Clone)]
pub struct MultiIter {
    state: IterState,
}

impl MultiIter {
    /// All operands read-only.
    pub fn new(arrays: &[Array]) -> Result<Self> {
        let flags = vec![OperandFlags::ReadOnly; arrays.len()];
        Self::with_flags(arrays, &flags)
    }

    pub fn with_flags(arrays: &[Array], flags: &[OperandFlags]) -> Result<Self> {
        Ok(Self {
            state: IterState::build(arrays, flags, None, facade_config())?,
        })
    }

    pub fn with_value_traits(
        arrays: &[Array],
        flags: &[OperandFlags],
        traits: Vec<Rc<dyn ValueTypeTraits>>,
        config: IterationConfig,
    ) -> Result<Self> {
        Ok(Self {
            state: IterState::build(arrays, flags, Some(traits), config)?,
        })
    }

    pub fn begin(&self) -> Self {
        Self {
            state: self.state.begin(),
        }
    }

    pub fn end(&self) -> Self {
        Self {
            state: self.state.end(),
        }
    }

    #[inline]
    pub fn is_end(&self) -> bool {
        self.state.is_end
    }

    /// Move one element forward; at the end, start over from the beginning.
    pub fn increment(&mut self) {
        if self.state.is_end {
            self.state.rewind();
        } else {
            self.state.step();
        }
    }

    /// Same rule as [`MultiFlatIter::equal`].
    pub fn equal(&self, other: &Self) -> bool {
        self.state.equal(&other.state)
    }

    pub fn dereference(&self) -> Option<Elements<'_>> {
        self.state.dereference()
    }

    pub fn reset(&mut self, throws: bool) -> Result<bool> {
        let started = self.state.cursor.reset(throws);
        self.state.is_end = !matches!(started, Ok(true));
        started
    }

    pub fn nop(&self) -> usize {
        self.state.cursor.nop()
    }
}

impl PartialEq for MultiIter {
    fn eq(&self, other: &Self) -> bool {
        self.equal(other)
    }
}

impl Iterator for MultiIter {
    type Item = Result<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        let values = self.dereference()?.values();
        self.state.step();
        Some(values)
    }
}
