//! View-producing and copying operations on [`Array`].

use ndbridge_traits::{CastingMode, DType, Value};

use crate::array::Array;
use crate::broadcast::{OperandDescriptor, OperandFlags};
use crate::config::IterationConfig;
use crate::cursor::Cursor;
use crate::iter::MultiIter;
use crate::layout::{self, Order};
use crate::{NdError, Result, RuntimeError};

/// Result of auto-unwrapping single-element arrays.
#[derive(Debug, Clone)]
pub enum Scalarized {
    Scalar(Value),
    Array(Array),
}

impl Scalarized {
    pub fn is_scalar(&self) -> bool {
        matches!(self, Scalarized::Scalar(_))
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Scalarized::Scalar(v) => Some(v),
            Scalarized::Array(_) => None,
        }
    }

    pub fn into_array(self) -> Option<Array> {
        match self {
            Scalarized::Array(a) => Some(a),
            Scalarized::Scalar(_) => None,
        }
    }
}

/// Byte strides of a fresh array laid out in `order` relative to `src`.
pub(crate) fn order_strides(src: &Array, order: Order, itemsize: usize) -> Result<Vec<isize>> {
    let shape = src.shape();
    match order {
        Order::C => layout::row_major_strides(shape, itemsize),
        Order::F => layout::col_major_strides(shape, itemsize),
        Order::A if src.is_f_contiguous() && !src.is_c_contiguous() => {
            layout::col_major_strides(shape, itemsize)
        }
        Order::A => layout::row_major_strides(shape, itemsize),
        Order::K => layout::keep_order_strides(shape, src.strides(), itemsize),
    }
}

impl Array {
    /// Reinterpret the same memory as `dtype`.
    ///
    /// With a different itemsize the last axis must be contiguous and its byte
    /// length divisible by the new itemsize; that axis is rescaled.
    pub fn view(&self, dtype: DType) -> Result<Array> {
        let from = self.dtype();
        let incompatible = |reason| RuntimeError::IncompatibleView {
            from,
            to: dtype,
            reason,
        };
        if from.is_object() != dtype.is_object() {
            return Err(incompatible("object arrays can only be viewed as object").into());
        }
        let (old, new) = (from.itemsize(), dtype.itemsize());
        if old == new {
            return Ok(self.derived(
                self.data_ptr(),
                dtype,
                self.shape().to_vec(),
                self.strides().to_vec(),
            ));
        }
        let Some(last) = self.nd().checked_sub(1) else {
            return Err(incompatible("changing the itemsize of a rank-0 array").into());
        };
        let mut shape = self.shape().to_vec();
        let mut strides = self.strides().to_vec();
        if shape[last] > 1 && strides[last] != old as isize {
            return Err(incompatible("the last axis must be contiguous").into());
        }
        let bytes = shape[last] * old;
        if bytes % new != 0 {
            return Err(incompatible("the last axis size is not a multiple of the new itemsize").into());
        }
        shape[last] = bytes / new;
        strides[last] = new as isize;
        Ok(self.derived(self.data_ptr(), dtype, shape, strides))
    }

    /// A newly allocated copy in `order`. Object elements are shared, not
    /// deep-copied.
    pub fn copy(&self, order: Order) -> Result<Array> {
        let out = Array::allocate(
            self.dtype(),
            self.shape(),
            order_strides(self, order, self.itemsize())?,
        )?;
        copy_into(&out, self)?;
        Ok(out)
    }

    /// A rank-1 copy holding the elements in `order`.
    pub fn flatten(&self, order: Order) -> Result<Array> {
        // A fresh copy is dense with non-negative strides, so its memory
        // order is exactly the requested element order.
        let dense = self.copy(order)?;
        let itemsize = dense.itemsize() as isize;
        Ok(dense.derived(dense.data_ptr(), dense.dtype(), vec![dense.size()], vec![itemsize]))
    }

    /// Like [`copy`](Self::copy), but every object element is replaced by its
    /// deep copy.
    pub fn deepcopy(&self, order: Order) -> Result<Array> {
        let out = self.copy(order)?;
        if !out.is_object_array() || out.size() == 0 {
            return Ok(out);
        }
        let mut it = MultiIter::with_flags(&[out.clone()], &[OperandFlags::ReadWrite])?;
        let mut visited = 0usize;
        while let Some(elems) = it.dereference() {
            if let Value::Object(obj) = elems.get(0)? {
                elems.set(0, Value::Object(obj.deep_copy()))?;
            }
            visited += 1;
            it.increment();
        }
        log::trace!("deepcopy replaced {} object elements", visited);
        Ok(out)
    }

    /// Same elements under a new shape. Arrays whose layout is C-contiguous
    /// are viewed, others are copied in C order first.
    pub fn reshape(&self, shape: &[usize]) -> Result<Array> {
        if layout::shape_size(shape)? != self.size() {
            return Err(NdError::ReshapeSize {
                size: self.size(),
                shape: shape.to_vec(),
            });
        }
        if layout::is_c_contiguous(self.shape(), self.strides(), self.itemsize()) {
            return Ok(self.derived(
                self.data_ptr(),
                self.dtype(),
                shape.to_vec(),
                layout::row_major_strides(shape, self.itemsize())?,
            ));
        }
        self.copy(Order::C)?.reshape(shape)
    }

    /// Reverse the axes.
    pub fn transpose(&self) -> Array {
        let shape: Vec<usize> = self.shape().iter().rev().copied().collect();
        let strides: Vec<isize> = self.strides().iter().rev().copied().collect();
        self.derived(self.data_ptr(), self.dtype(), shape, strides)
    }

    /// Reorder the axes; output axis `i` is input axis `axes[i]`.
    pub fn permute(&self, axes: &[usize]) -> Result<Array> {
        let rank = self.nd();
        let mut seen = vec![false; rank];
        let valid = axes.len() == rank
            && axes.iter().all(|&a| a < rank && !std::mem::replace(&mut seen[a], true));
        if !valid {
            return Err(NdError::InvalidPermutation(axes.to_vec()));
        }
        let shape = axes.iter().map(|&a| self.shape()[a]).collect();
        let strides = axes.iter().map(|&a| self.strides()[a]).collect();
        Ok(self.derived(self.data_ptr(), self.dtype(), shape, strides))
    }

    /// Drop every size-1 axis.
    pub fn squeeze(&self) -> Array {
        let (shape, strides): (Vec<usize>, Vec<isize>) = self
            .shape()
            .iter()
            .zip(self.strides())
            .filter(|(&d, _)| d != 1)
            .map(|(&d, &s)| (d, s))
            .unzip();
        self.derived(self.data_ptr(), self.dtype(), shape, strides)
    }

    #[inline]
    pub fn has_shape(&self, shape: &[usize]) -> bool {
        self.shape() == shape
    }

    /// The single element of a rank-0 or one-element rank-1 array, otherwise
    /// the array itself.
    pub fn scalarize(&self) -> Scalarized {
        if self.nd() == 0 || (self.nd() == 1 && self.shape()[0] == 1) {
            // SAFETY: the array holds exactly one element at its data pointer.
            Scalarized::Scalar(unsafe { self.value_traits().load(self.data_ptr()) })
        } else {
            Scalarized::Array(self.clone())
        }
    }

    /// Copy converted to `dtype`, keeping this array's memory order.
    ///
    /// Under [`CastingMode::Unsafe`] values convert with `as` semantics:
    /// integers wrap, floats truncate and imaginary parts are dropped.
    pub fn astype(&self, dtype: DType, casting: CastingMode) -> Result<Array> {
        if !self.dtype().can_cast(&dtype, casting) {
            return Err(NdError::CastNotAllowed {
                from: self.dtype(),
                to: dtype,
                casting,
            });
        }
        let out = crate::utilities::empty_like(self, Some(dtype))?;
        copy_converted(&out, self, casting == CastingMode::Unsafe)?;
        Ok(out)
    }
}

/// Copy `src` into `dst`, broadcasting `src` to `dst`'s shape.
///
/// Elements of different dtypes are converted value by value; a conversion
/// failure aborts the copy with part of `dst` already written.
pub fn copy_into(dst: &Array, src: &Array) -> Result<()> {
    copy_converted(dst, src, false)
}

fn copy_converted(dst: &Array, src: &Array, lossy: bool) -> Result<()> {
    if !dst.is_writeable() {
        return Err(NdError::NotWriteable);
    }
    let itershape: Vec<Option<usize>> = dst.shape().iter().map(|&d| Some(d)).collect();
    let mut cursor = Cursor::with_itershape(
        vec![
            OperandDescriptor::writeonly(dst.clone()),
            OperandDescriptor::readonly(src.clone()),
        ],
        &itershape,
        IterationConfig::unordered(),
    )?;
    if !cursor.reset(false)? {
        return Ok(());
    }
    let dst_traits = dst.value_traits();
    let same_layout = DType::equivalent(&dst.dtype(), &src.dtype());
    let src_traits = src.value_traits();
    loop {
        // SAFETY: the cursor yields in-bounds element pointers of each
        // operand's dtype and dst was checked writeable.
        unsafe {
            if same_layout {
                dst_traits.copy_element(cursor.get_data(1), cursor.get_data(0));
            } else {
                let value = src_traits.load(cursor.get_data(1));
                if lossy {
                    dst_traits.store_lossy(cursor.get_data(0), value)?;
                } else {
                    dst_traits.store(cursor.get_data(0), value)?;
                }
            }
        }
        if !cursor.next() {
            break;
        }
    }
    Ok(())
}
