//! Elementwise reductions and comparisons built on [`Cursor`].

use ndbridge_traits::{DType, Value};

use crate::array::{zeros, Array};
use crate::broadcast::{broadcast_shapes, OperandDescriptor};
use crate::config::IterationConfig;
use crate::cursor::Cursor;
use crate::layout;
use crate::ops_view::{copy_into, Scalarized};
use crate::{NdError, Result};

/// Uninitialized-looking array with `a`'s shape and memory order.
pub fn empty_like(a: &Array, dtype: Option<DType>) -> Result<Array> {
    let dtype = dtype.unwrap_or(a.dtype());
    let strides = layout::keep_order_strides(a.shape(), a.strides(), dtype.itemsize())?;
    Array::allocate(dtype, a.shape(), strides)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reduction {
    All,
    Any,
}

impl Reduction {
    fn identity(self) -> bool {
        self == Reduction::All
    }

    /// `Some(result)` when `element` decides the reduction.
    fn absorbs(self, element: bool) -> Option<bool> {
        match (self, element) {
            (Reduction::All, false) => Some(false),
            (Reduction::Any, true) => Some(true),
            _ => None,
        }
    }
}

fn reduced_shape(a: &Array, axis: Option<usize>) -> Result<Vec<usize>> {
    match axis {
        None => Ok(Vec::new()),
        Some(axis) if axis >= a.nd() => Err(NdError::InvalidAxis {
            axis,
            rank: a.nd(),
        }),
        Some(axis) => Ok(a
            .shape()
            .iter()
            .enumerate()
            .filter(|&(d, _)| d != axis)
            .map(|(_, &n)| n)
            .collect()),
    }
}

fn reduce_into(kind: Reduction, a: &Array, axis: Option<usize>, out: &Array) -> Result<()> {
    let expected = reduced_shape(a, axis)?;
    if out.shape() != expected.as_slice() {
        return Err(NdError::ShapeMismatch(out.shape().to_vec(), expected));
    }
    copy_into(out, &Array::from_vec(&[], vec![kind.identity()])?)?;
    if a.size() == 0 {
        return Ok(());
    }

    // Loop over `a`'s shape; `out` skips the reduced axes with stride 0.
    let map: Vec<Option<usize>> = (0..a.nd())
        .map(|d| match axis {
            None => None,
            Some(axis) if d == axis => None,
            Some(axis) if d > axis => Some(d - 1),
            Some(_) => Some(d),
        })
        .collect();
    let mut cursor = Cursor::new(
        vec![
            OperandDescriptor::readwrite(out.clone()).with_broadcast_map(map),
            OperandDescriptor::readonly(a.clone()),
        ],
        IterationConfig::unordered().with_reduce_ok(true),
    )?;
    let out_traits = out.value_traits();
    let a_traits = a.value_traits();
    cursor.reset(true)?;
    loop {
        // SAFETY: the cursor yields in-bounds pointers of each operand's dtype.
        unsafe {
            let element = a_traits.load(cursor.get_data(1)).is_truthy();
            if let Some(result) = kind.absorbs(element) {
                out_traits.store(cursor.get_data(0), Value::Bool(result))?;
            }
        }
        if !cursor.next() {
            break;
        }
    }
    Ok(())
}

fn reduce(kind: Reduction, a: &Array, axis: Option<usize>) -> Result<Scalarized> {
    let out = zeros(&reduced_shape(a, axis)?, DType::BOOL)?;
    reduce_into(kind, a, axis, &out)?;
    if out.nd() == 0 {
        Ok(out.scalarize())
    } else {
        Ok(Scalarized::Array(out))
    }
}

/// Whether every element along `axis` is truthy (all axes for `None`).
pub fn all(a: &Array, axis: Option<usize>) -> Result<Scalarized> {
    reduce(Reduction::All, a, axis)
}

/// Whether any element along `axis` is truthy (all axes for `None`).
pub fn any(a: &Array, axis: Option<usize>) -> Result<Scalarized> {
    reduce(Reduction::Any, a, axis)
}

/// [`all`] into a caller-supplied array of the reduced shape.
pub fn all_into(a: &Array, axis: Option<usize>, out: &Array) -> Result<()> {
    reduce_into(Reduction::All, a, axis, out)
}

pub fn any_into(a: &Array, axis: Option<usize>, out: &Array) -> Result<()> {
    reduce_into(Reduction::Any, a, axis, out)
}

/// Elementwise equality of two broadcast-compatible arrays.
pub fn equal(x1: &Array, x2: &Array) -> Result<Array> {
    let shape = broadcast_shapes(&[x1.shape(), x2.shape()])?;
    let out = zeros(&shape, DType::BOOL)?;
    equal_into(x1, x2, &out)?;
    Ok(out)
}

/// [`equal`] into `out`, which must already have the broadcast shape.
pub fn equal_into(x1: &Array, x2: &Array, out: &Array) -> Result<()> {
    let shape = broadcast_shapes(&[x1.shape(), x2.shape()])?;
    if out.shape() != shape.as_slice() {
        return Err(NdError::ShapeMismatch(out.shape().to_vec(), shape));
    }
    let mut cursor = Cursor::new(
        vec![
            OperandDescriptor::writeonly(out.clone()),
            OperandDescriptor::readonly(x1.clone()),
            OperandDescriptor::readonly(x2.clone()),
        ],
        IterationConfig::unordered(),
    )?;
    if !cursor.reset(false)? {
        return Ok(());
    }
    let (t_out, t1, t2) = (out.value_traits(), x1.value_traits(), x2.value_traits());
    loop {
        // SAFETY: the cursor yields in-bounds pointers of each operand's dtype.
        unsafe {
            let eq = t1.load(cursor.get_data(1)).equals(&t2.load(cursor.get_data(2)));
            t_out.store(cursor.get_data(0), Value::Bool(eq))?;
        }
        if !cursor.next() {
            break;
        }
    }
    Ok(())
}
