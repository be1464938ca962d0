//! The dynamically typed strided array.

use std::any::Any;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::rc::Rc;
use std::sync::Arc;

use bytemuck::Pod;
use ndbridge_traits::{
    value_traits_for, CastingMode, DType, Element, ObjectRef, Value, ValueTypeTraits,
};

use crate::broadcast::OperandDescriptor;
use crate::buffer::Buffer;
use crate::config::IterationConfig;
use crate::cursor::Cursor;
use crate::layout::{self, shape_size, Order};
use crate::{NdError, Result, RuntimeError, MAX_DIMS};

// ============================================================================
// Flags
// ============================================================================

/// Array flag bits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ArrayFlags(u32);

impl ArrayFlags {
    pub const C_CONTIGUOUS: ArrayFlags = ArrayFlags(0x0001);
    pub const F_CONTIGUOUS: ArrayFlags = ArrayFlags(0x0002);
    pub const OWNDATA: ArrayFlags = ArrayFlags(0x0004);
    pub const ALIGNED: ArrayFlags = ArrayFlags(0x0100);
    pub const WRITEABLE: ArrayFlags = ArrayFlags(0x0400);

    const NAMES: [(ArrayFlags, &'static str); 5] = [
        (ArrayFlags::C_CONTIGUOUS, "C_CONTIGUOUS"),
        (ArrayFlags::F_CONTIGUOUS, "F_CONTIGUOUS"),
        (ArrayFlags::OWNDATA, "OWNDATA"),
        (ArrayFlags::ALIGNED, "ALIGNED"),
        (ArrayFlags::WRITEABLE, "WRITEABLE"),
    ];

    #[inline]
    pub const fn empty() -> Self {
        ArrayFlags(0)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True when every bit of `other` is set.
    #[inline]
    pub const fn contains(self, other: ArrayFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: ArrayFlags) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove(&mut self, other: ArrayFlags) {
        self.0 &= !other.0;
    }

    /// Contiguity and alignment bits derived from a layout.
    pub fn from_layout(shape: &[usize], strides: &[isize], itemsize: usize) -> Self {
        let mut flags = ArrayFlags::empty();
        if layout::is_c_contiguous(shape, strides, itemsize) {
            flags.insert(ArrayFlags::C_CONTIGUOUS);
        }
        if layout::is_f_contiguous(shape, strides, itemsize) {
            flags.insert(ArrayFlags::F_CONTIGUOUS);
        }
        if layout::is_aligned(strides, itemsize) {
            flags.insert(ArrayFlags::ALIGNED);
        }
        flags
    }
}

impl BitOr for ArrayFlags {
    type Output = ArrayFlags;

    fn bitor(self, rhs: Self) -> Self {
        ArrayFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for ArrayFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ArrayFlags {
    type Output = ArrayFlags;

    fn bitand(self, rhs: Self) -> Self {
        ArrayFlags(self.0 & rhs.0)
    }
}

impl fmt::Debug for ArrayFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = ArrayFlags::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "ArrayFlags({})", names.join(" | "))
    }
}

// ============================================================================
// Ownership
// ============================================================================

/// What keeps an array's memory alive.
#[derive(Clone)]
pub enum Base {
    /// Memory allocated by [`Buffer`].
    Buffer(Rc<Buffer>),
    /// Foreign memory owned by an arbitrary object.
    Object(Rc<dyn Any>),
}

impl fmt::Debug for Base {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Base::Buffer(buffer) => f.debug_tuple("Buffer").field(buffer).finish(),
            Base::Object(_) => f.write_str("Object(..)"),
        }
    }
}

// ============================================================================
// Array
// ============================================================================

/// A strided view over a reference-counted buffer.
///
/// Cloning copies metadata and bumps the base reference count; element data
/// is never copied. All clones and derived views alias the same memory.
#[derive(Clone)]
pub struct Array {
    data: *mut u8,
    dtype: DType,
    shape: Arc<[usize]>,
    strides: Arc<[isize]>,
    flags: ArrayFlags,
    base: Option<Base>,
}

fn check_rank(ndim: usize) -> Result<()> {
    if ndim > MAX_DIMS {
        return Err(RuntimeError::TooManyDimensions {
            ndim,
            max: MAX_DIMS,
        }
        .into());
    }
    Ok(())
}

impl Array {
    fn from_parts(
        data: *mut u8,
        dtype: DType,
        shape: Arc<[usize]>,
        strides: Arc<[isize]>,
        extra: ArrayFlags,
        base: Option<Base>,
    ) -> Array {
        let flags = ArrayFlags::from_layout(&shape, &strides, dtype.itemsize()) | extra;
        Array {
            data,
            dtype,
            shape,
            strides,
            flags,
            base,
        }
    }

    /// Allocate a zeroed array with the given byte strides.
    ///
    /// `strides` must be a dense non-negative layout of `shape`.
    pub(crate) fn allocate(dtype: DType, shape: &[usize], strides: Vec<isize>) -> Result<Array> {
        check_rank(shape.len())?;
        let buffer = Buffer::allocate(dtype, layout::checked_extent(shape, dtype.itemsize())?)?;
        Ok(Array::from_parts(
            buffer.as_ptr(),
            dtype,
            shape.into(),
            strides.into(),
            ArrayFlags::OWNDATA | ArrayFlags::WRITEABLE,
            Some(Base::Buffer(buffer)),
        ))
    }

    /// A view sharing this array's base. OWNDATA is cleared.
    pub(crate) fn derived(
        &self,
        data: *mut u8,
        dtype: DType,
        shape: Vec<usize>,
        strides: Vec<isize>,
    ) -> Array {
        Array::from_parts(
            data,
            dtype,
            shape.into(),
            strides.into(),
            self.flags & ArrayFlags::WRITEABLE,
            self.base.clone(),
        )
    }

    /// Row-major array holding `data`.
    pub fn from_vec<T: Element>(shape: &[usize], data: Vec<T>) -> Result<Array> {
        if data.len() != shape_size(shape)? {
            return Err(NdError::ShapeMismatch(vec![data.len()], shape.to_vec()));
        }
        let itemsize = T::DTYPE.itemsize();
        let out = Array::allocate(T::DTYPE, shape, layout::row_major_strides(shape, itemsize)?)?;
        for (i, value) in data.into_iter().enumerate() {
            // SAFETY: slot i is inside the freshly allocated, initialized buffer.
            unsafe { T::write(out.data.add(i * itemsize), value) };
        }
        Ok(out)
    }

    /// Row-major array copied byte-for-byte from a plain-old-data slice.
    pub fn from_pod_slice<T: Element + Pod>(shape: &[usize], data: &[T]) -> Result<Array> {
        check_rank(shape.len())?;
        if data.len() != shape_size(shape)? {
            return Err(NdError::ShapeMismatch(vec![data.len()], shape.to_vec()));
        }
        let strides = layout::row_major_strides(shape, T::DTYPE.itemsize())?;
        let buffer = Buffer::from_pod_slice(data)?;
        Ok(Array::from_parts(
            buffer.as_ptr(),
            T::DTYPE,
            shape.into(),
            strides.into(),
            ArrayFlags::OWNDATA | ArrayFlags::WRITEABLE,
            Some(Base::Buffer(buffer)),
        ))
    }

    /// Row-major array whose element at each multi-index is `f(index)`.
    pub fn from_shape_fn<T, F>(shape: &[usize], mut f: F) -> Result<Array>
    where
        T: Element,
        F: FnMut(&[usize]) -> T,
    {
        let size = layout::checked_extent(shape, T::DTYPE.itemsize())?;
        let mut values = Vec::with_capacity(size);
        let mut index = vec![0usize; shape.len()];
        for _ in 0..size {
            values.push(f(&index));
            for k in (0..shape.len()).rev() {
                index[k] += 1;
                if index[k] < shape[k] {
                    break;
                }
                index[k] = 0;
            }
        }
        Array::from_vec(shape, values)
    }

    /// View a region of an existing buffer.
    ///
    /// `offset` and `strides` are in bytes. Every addressed element must lie
    /// inside the buffer.
    pub fn from_buffer(
        buffer: Rc<Buffer>,
        offset: usize,
        shape: &[usize],
        strides: &[isize],
    ) -> Result<Array> {
        check_rank(shape.len())?;
        let dtype = buffer.dtype();
        let itemsize = dtype.itemsize();
        shape_size(shape)?;
        let start = isize::try_from(offset).map_err(|_| NdError::OffsetOverflow)?;
        layout::validate_bounds(buffer.nbytes(), shape, strides, start, itemsize)?;
        if dtype.is_object() && (offset % itemsize != 0 || !layout::is_aligned(strides, itemsize)) {
            return Err(RuntimeError::IncompatibleView {
                from: dtype,
                to: dtype,
                reason: "object elements must be slot-aligned",
            }
            .into());
        }
        // SAFETY: offset checked against the buffer size above.
        let data = unsafe { buffer.as_ptr().add(offset) };
        Ok(Array::from_parts(
            data,
            dtype,
            shape.into(),
            strides.into(),
            ArrayFlags::WRITEABLE,
            Some(Base::Buffer(buffer)),
        ))
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    #[inline]
    pub fn nd(&self) -> usize {
        self.shape.len()
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Byte strides.
    #[inline]
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    #[inline]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    #[inline]
    pub fn itemsize(&self) -> usize {
        self.dtype.itemsize()
    }

    /// Number of elements.
    #[inline]
    pub fn size(&self) -> usize {
        if self.shape.contains(&0) {
            return 0;
        }
        // Constructors reject non-empty shapes whose count overflows.
        self.shape.iter().product()
    }

    #[inline]
    pub fn flags(&self) -> ArrayFlags {
        self.flags
    }

    /// True when all bits of `flags` are set.
    #[inline]
    pub fn check_flags(&self, flags: ArrayFlags) -> bool {
        self.flags.contains(flags)
    }

    /// Set flag bits the array actually satisfies.
    ///
    /// Contiguity and alignment bits must hold for the current layout.
    /// WRITEABLE is only granted to arrays over a [`Buffer`]. OWNDATA is
    /// never granted. Bits that are already set are accepted. Any other
    /// request fails with [`NdError::FlagsNotAllowed`] and leaves the flags
    /// unchanged.
    pub fn enable_flags(&mut self, flags: ArrayFlags) -> Result<()> {
        let mut allowed = ArrayFlags::from_layout(&self.shape, &self.strides, self.itemsize());
        if matches!(self.base, Some(Base::Buffer(_))) {
            allowed.insert(ArrayFlags::WRITEABLE);
        }
        let refused = ArrayFlags(flags.0 & !allowed.0 & !self.flags.0);
        if refused != ArrayFlags::empty() {
            return Err(NdError::FlagsNotAllowed { flags: refused });
        }
        self.flags.insert(flags);
        Ok(())
    }

    pub fn clear_flags(&mut self, flags: ArrayFlags) {
        self.flags.remove(flags);
    }

    #[inline]
    pub fn is_c_contiguous(&self) -> bool {
        self.check_flags(ArrayFlags::C_CONTIGUOUS)
    }

    #[inline]
    pub fn is_f_contiguous(&self) -> bool {
        self.check_flags(ArrayFlags::F_CONTIGUOUS)
    }

    #[inline]
    pub fn is_aligned(&self) -> bool {
        self.check_flags(ArrayFlags::ALIGNED)
    }

    #[inline]
    pub fn is_writeable(&self) -> bool {
        self.check_flags(ArrayFlags::WRITEABLE)
    }

    #[inline]
    pub fn is_object_array(&self) -> bool {
        self.dtype.is_object()
    }

    pub fn base(&self) -> Option<&Base> {
        self.base.as_ref()
    }

    /// Replace the owner of this array's memory.
    ///
    /// # Safety
    /// `base` must keep every element addressed by this array valid for as
    /// long as the array and its views live. Dropping the previous base may
    /// release the memory otherwise.
    pub unsafe fn set_base(&mut self, base: Option<Base>) {
        self.base = base;
    }

    /// Address of the element at index `(0, 0, ...)`.
    #[inline]
    pub fn data_ptr(&self) -> *mut u8 {
        self.data
    }

    /// Default Value Type Trait for this array's dtype.
    pub fn value_traits(&self) -> Rc<dyn ValueTypeTraits> {
        value_traits_for(self.dtype)
    }

    // ------------------------------------------------------------------------
    // Element access
    // ------------------------------------------------------------------------

    pub(crate) fn element_ptr(&self, index: &[usize]) -> Result<*mut u8> {
        if index.len() != self.nd() {
            return Err(NdError::RankMismatch(index.len(), self.nd()));
        }
        if index.iter().zip(self.shape.iter()).any(|(&i, &d)| i >= d) {
            return Err(NdError::IndexOutOfBounds {
                index: index.to_vec(),
                shape: self.shape.to_vec(),
            });
        }
        let offset: isize = index
            .iter()
            .zip(self.strides.iter())
            .map(|(&i, &s)| i as isize * s)
            .sum();
        Ok(self.data.wrapping_offset(offset))
    }

    pub fn get(&self, index: &[usize]) -> Result<Value> {
        let ptr = self.element_ptr(index)?;
        // SAFETY: index validated against the shape.
        Ok(unsafe { self.value_traits().load(ptr) })
    }

    /// Store `value`, converted to this array's dtype.
    pub fn set(&self, index: &[usize], value: impl Into<Value>) -> Result<()> {
        if !self.is_writeable() {
            return Err(NdError::NotWriteable);
        }
        let ptr = self.element_ptr(index)?;
        // SAFETY: index validated against the shape; the array is writeable.
        unsafe { self.value_traits().store(ptr, value.into())? };
        Ok(())
    }

    /// Elements in row-major order.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        if T::DTYPE != self.dtype {
            return Err(NdError::DTypeMismatch {
                expected: T::DTYPE,
                found: self.dtype,
            });
        }
        let mut cursor = Cursor::new(
            vec![OperandDescriptor::readonly(self.clone())],
            IterationConfig::default(),
        )?;
        let mut out = Vec::with_capacity(self.size());
        if cursor.reset(false)? {
            loop {
                // SAFETY: the cursor only yields pointers to elements of `self`.
                out.push(unsafe { T::read(cursor.get_data(0)) });
                if !cursor.next() {
                    break;
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("dtype", &self.dtype)
            .field("shape", &self.shape)
            .field("strides", &self.strides)
            .field("flags", &self.flags)
            .finish()
    }
}

// ============================================================================
// Factories
// ============================================================================

/// Zero-filled row-major array.
pub fn zeros(shape: &[usize], dtype: DType) -> Result<Array> {
    Array::allocate(dtype, shape, layout::row_major_strides(shape, dtype.itemsize())?)
}

/// Row-major array with unspecified contents.
///
/// Buffers are always zero-initialized, so the contents are in fact zeros
/// (null handles for object dtype).
pub fn empty(shape: &[usize], dtype: DType) -> Result<Array> {
    zeros(shape, dtype)
}

fn infer_dtype(values: &[Value]) -> Result<DType> {
    let objects = values.iter().filter(|v| matches!(v, Value::Object(_))).count();
    if objects != 0 && objects != values.len() {
        return Err(NdError::MixedObjectValues);
    }
    let rank = |v: &Value| match v {
        Value::Bool(_) => 0,
        Value::UInt(_) => 1,
        Value::Int(_) => 2,
        Value::Float(_) => 3,
        Value::Complex(_) => 4,
        Value::Object(_) => 5,
    };
    Ok(match values.iter().map(rank).max() {
        None | Some(3) => DType::FLOAT64,
        Some(0) => DType::BOOL,
        Some(1) => DType::UINT64,
        Some(2) => DType::INT64,
        Some(4) => DType::COMPLEX128,
        Some(_) => DType::OBJECT,
    })
}

/// Row-major array built from host values.
///
/// Without an explicit dtype the widest kind among the values is used
/// (`bool < uint64 < int64 < float64 < complex128 < object`); an empty list
/// gives float64. Object handles mixed with numbers need an explicit dtype
/// and fail with [`NdError::MixedObjectValues`] otherwise.
pub fn array(shape: &[usize], values: Vec<Value>, dtype: Option<DType>) -> Result<Array> {
    if values.len() != shape_size(shape)? {
        return Err(NdError::ShapeMismatch(vec![values.len()], shape.to_vec()));
    }
    let dtype = match dtype {
        Some(dtype) => dtype,
        None => infer_dtype(&values)?,
    };
    let out = zeros(shape, dtype)?;
    let traits = out.value_traits();
    let itemsize = dtype.itemsize();
    for (i, value) in values.into_iter().enumerate() {
        // SAFETY: slot i is inside the freshly allocated buffer.
        unsafe { traits.store(out.data.add(i * itemsize), value)? };
    }
    Ok(out)
}

/// Object array holding the given host objects in row-major order.
pub fn from_object(shape: &[usize], objects: Vec<ObjectRef>) -> Result<Array> {
    Array::from_vec(shape, objects)
}

/// `a` converted to satisfy a dtype, a rank range and flag requirements.
///
/// The rank must lie in `[nd_min, nd_max]`; an `nd_max` of zero leaves the
/// rank unbounded above. A differing `dtype` is converted under safe
/// casting. C_CONTIGUOUS and F_CONTIGUOUS requirements copy into that order;
/// unmet ALIGNED, WRITEABLE or OWNDATA requirements copy in K order. When
/// nothing needs converting the result is a view of `a`.
pub fn require(
    a: &Array,
    dtype: Option<DType>,
    nd_min: usize,
    nd_max: usize,
    requirements: ArrayFlags,
) -> Result<Array> {
    let ndim = a.nd();
    if ndim < nd_min || (nd_max != 0 && ndim > nd_max) {
        return Err(NdError::RankOutOfRange {
            ndim,
            min: nd_min,
            max: if nd_max == 0 { MAX_DIMS } else { nd_max },
        });
    }
    let mut out = match dtype {
        Some(dtype) if dtype != a.dtype() => a.astype(dtype, CastingMode::Safe)?,
        _ => a.clone(),
    };
    let order = if requirements.contains(ArrayFlags::C_CONTIGUOUS) {
        Some(Order::C)
    } else if requirements.contains(ArrayFlags::F_CONTIGUOUS) {
        Some(Order::F)
    } else {
        None
    };
    let missing = ArrayFlags(requirements.0 & !out.flags.0);
    if missing != ArrayFlags::empty() {
        log::trace!("require: copying to satisfy {:?}", missing);
        out = out.copy(order.unwrap_or(Order::K))?;
    }
    Ok(out)
}

/// Wrap foreign memory.
///
/// With an `owner` the array keeps it alive and does not own the data;
/// without one the array is marked OWNDATA and the caller guarantees the
/// memory outlives every view.
///
/// # Safety
/// Every element addressed by `shape`/`strides` from `data` must be valid,
/// initialized memory of `dtype` for as long as the array or any view of it
/// lives, and writable if `writeable` is set.
pub unsafe fn from_data(
    data: *mut u8,
    dtype: DType,
    shape: &[usize],
    strides: &[isize],
    owner: Option<Rc<dyn Any>>,
    writeable: bool,
) -> Result<Array> {
    if shape.len() != strides.len() {
        return Err(NdError::StrideLengthMismatch);
    }
    check_rank(shape.len())?;
    shape_size(shape)?;
    let mut extra = ArrayFlags::empty();
    if owner.is_none() {
        extra.insert(ArrayFlags::OWNDATA);
    }
    if writeable {
        extra.insert(ArrayFlags::WRITEABLE);
    }
    Ok(Array::from_parts(
        data,
        dtype,
        shape.into(),
        strides.into(),
        extra,
        owner.map(Base::Object),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_vec_flags() {
        let a = Array::from_vec(&[2, 3], vec![1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(a.strides(), &[24, 8]);
        assert!(a.is_c_contiguous());
        assert!(!a.is_f_contiguous());
        assert!(a.is_aligned());
        assert!(a.check_flags(ArrayFlags::OWNDATA | ArrayFlags::WRITEABLE));
        assert_eq!(a.size(), 6);
    }

    #[test]
    fn test_from_vec_length_mismatch() {
        assert!(matches!(
            Array::from_vec(&[2, 2], vec![1i32, 2, 3]),
            Err(NdError::ShapeMismatch(_, _))
        ));
    }

    #[test]
    fn test_from_data_f_order() {
        let mut data = vec![1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0];
        let ptr = data.as_mut_ptr() as *mut u8;
        let owner: Rc<dyn Any> = Rc::new(data);
        let a = unsafe { from_data(ptr, DType::FLOAT64, &[2, 3], &[8, 16], Some(owner), true) }
            .unwrap();
        assert!(a.is_f_contiguous());
        assert!(!a.is_c_contiguous());
        assert!(!a.check_flags(ArrayFlags::OWNDATA));
        assert!(matches!(a.base(), Some(Base::Object(_))));
        match a.get(&[1, 0]).unwrap() {
            Value::Float(v) => assert_relative_eq!(v, 2.0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_from_data_without_owner_owns_data() {
        let mut data = [0u8; 4];
        let a = unsafe { from_data(data.as_mut_ptr(), DType::UINT8, &[4], &[1], None, false) }
            .unwrap();
        assert!(a.check_flags(ArrayFlags::OWNDATA));
        assert!(!a.is_writeable());
        assert!(matches!(a.set(&[0], Value::UInt(1)), Err(NdError::NotWriteable)));
    }

    #[test]
    fn test_from_data_stride_length_mismatch() {
        let mut data = [0u8; 8];
        let err = unsafe { from_data(data.as_mut_ptr(), DType::UINT8, &[2, 4], &[4], None, true) }
            .unwrap_err();
        assert!(matches!(err, NdError::StrideLengthMismatch));
        assert_eq!(err.to_string(), "Length of shape and strides arrays do not match");
    }

    #[test]
    fn test_get_set() {
        let a = zeros(&[2, 2], DType::INT16).unwrap();
        a.set(&[1, 0], Value::Int(-3)).unwrap();
        assert_eq!(a.get(&[1, 0]).unwrap(), Value::Int(-3));
        assert_eq!(a.to_vec::<i16>().unwrap(), vec![0, 0, -3, 0]);
        assert!(matches!(a.get(&[2, 0]), Err(NdError::IndexOutOfBounds { .. })));
        assert!(matches!(a.get(&[0]), Err(NdError::RankMismatch(1, 2))));
        assert!(matches!(a.set(&[0, 0], Value::Int(1 << 20)), Err(NdError::Value(_))));
    }

    #[test]
    fn test_clone_shares_data() {
        let a = Array::from_vec(&[3], vec![1u8, 2, 3]).unwrap();
        let b = a.clone();
        b.set(&[0], Value::UInt(9)).unwrap();
        assert_eq!(a.get(&[0]).unwrap(), Value::UInt(9));
        assert_eq!(a.data_ptr(), b.data_ptr());
    }

    #[test]
    fn test_from_shape_fn() {
        let a = Array::from_shape_fn(&[2, 3], |idx| (idx[0] * 10 + idx[1]) as i32).unwrap();
        assert_eq!(a.to_vec::<i32>().unwrap(), vec![0, 1, 2, 10, 11, 12]);
    }

    #[test]
    fn test_from_buffer_bounds() {
        let buffer = Buffer::allocate(DType::FLOAT32, 6).unwrap();
        let a = Array::from_buffer(buffer.clone(), 4, &[5], &[4]).unwrap();
        assert!(!a.check_flags(ArrayFlags::OWNDATA));
        assert!(Array::from_buffer(buffer.clone(), 8, &[5], &[4]).is_err());
        let reversed = Array::from_buffer(buffer, 20, &[6], &[-4]).unwrap();
        assert!(!reversed.is_c_contiguous());
    }

    #[test]
    fn test_array_infers_dtype() {
        let a = array(&[3], vec![Value::Bool(true), Value::Int(2), Value::Float(0.5)], None).unwrap();
        assert_eq!(a.dtype(), DType::FLOAT64);
        assert_eq!(a.to_vec::<f64>().unwrap(), vec![1.0, 2.0, 0.5]);
        let b = array(&[2], vec![Value::UInt(1), Value::Int(-1)], None).unwrap();
        assert_eq!(b.dtype(), DType::INT64);
        let c = array(&[1], vec![Value::Int(7)], Some(DType::UINT8)).unwrap();
        assert_eq!(c.to_vec::<u8>().unwrap(), vec![7]);
    }

    #[test]
    fn test_array_rejects_mixed_objects_and_numbers() {
        let mixed = vec![Value::Object(ObjectRef::none()), Value::Int(1)];
        assert!(matches!(
            array(&[2], mixed.clone(), None),
            Err(NdError::MixedObjectValues)
        ));
        assert!(matches!(array(&[2], mixed, Some(DType::OBJECT)), Err(NdError::Value(_))));
        let objects = array(&[1], vec![Value::Object(ObjectRef::none())], None).unwrap();
        assert_eq!(objects.dtype(), DType::OBJECT);
    }

    #[test]
    fn test_oversized_shapes_rejected() {
        assert!(matches!(
            zeros(&[1 << 62, 4], DType::UINT8),
            Err(NdError::ShapeTooLarge { .. })
        ));
        assert!(matches!(
            zeros(&[1 << 61], DType::FLOAT64),
            Err(NdError::ShapeTooLarge { .. })
        ));
        assert!(matches!(
            Array::from_vec(&[1usize << 63, 2], Vec::<u8>::new()),
            Err(NdError::ShapeTooLarge { .. })
        ));
        assert!(Array::from_shape_fn(&[usize::MAX, 2], |_| 0u8).is_err());
        assert!(array(&[1 << 63, 4], vec![], None).is_err());

        let buffer = Buffer::allocate(DType::UINT8, 1).unwrap();
        assert!(Array::from_buffer(buffer.clone(), 0, &[1 << 63, 4], &[0, 0]).is_err());
        let empty = Array::from_buffer(buffer, 0, &[1 << 63, 4, 0], &[0, 0, 0]).unwrap();
        assert_eq!(empty.size(), 0);
    }

    #[test]
    fn test_enable_flags_checks_layout() {
        let mut a = zeros(&[2, 3], DType::INT32).unwrap();
        let mut t = a.transpose();
        assert!(matches!(
            t.enable_flags(ArrayFlags::C_CONTIGUOUS),
            Err(NdError::FlagsNotAllowed { .. })
        ));
        assert!(!t.is_c_contiguous());
        t.enable_flags(ArrayFlags::F_CONTIGUOUS | ArrayFlags::ALIGNED).unwrap();

        a.clear_flags(ArrayFlags::C_CONTIGUOUS | ArrayFlags::WRITEABLE);
        a.enable_flags(ArrayFlags::C_CONTIGUOUS | ArrayFlags::WRITEABLE).unwrap();
        assert!(a.is_c_contiguous() && a.is_writeable());
        assert!(a.enable_flags(ArrayFlags::OWNDATA).is_ok());

        let mut view = a.transpose();
        assert!(matches!(
            view.enable_flags(ArrayFlags::OWNDATA),
            Err(NdError::FlagsNotAllowed { flags }) if flags == ArrayFlags::OWNDATA
        ));
    }

    #[test]
    fn test_enable_writeable_on_foreign_memory() {
        let data = [1u16, 2];
        let owner: Rc<dyn Any> = Rc::new(());
        // SAFETY: `data` outlives `a` and is only read.
        let mut a = unsafe {
            from_data(data.as_ptr() as *mut u8, DType::UINT16, &[2], &[2], Some(owner), false)
        }
        .unwrap();
        assert!(matches!(
            a.enable_flags(ArrayFlags::WRITEABLE),
            Err(NdError::FlagsNotAllowed { .. })
        ));
        assert!(matches!(a.set(&[0], Value::UInt(9)), Err(NdError::NotWriteable)));
        assert_eq!(data, [1, 2]);
    }

    #[test]
    fn test_set_base_keeps_memory_alive() {
        let a = Array::from_vec(&[3], vec![1i64, 2, 3]).unwrap();
        let Some(Base::Buffer(buffer)) = a.base().cloned() else {
            panic!("expected a buffer base");
        };
        let mut b = a.transpose();
        drop(a);
        let owner: Rc<dyn Any> = buffer.clone();
        // SAFETY: the new owner holds the buffer `b` points into.
        unsafe { b.set_base(Some(Base::Object(owner))) };
        assert_eq!(Rc::strong_count(&buffer), 2);
        drop(buffer);
        assert_eq!(b.to_vec::<i64>().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_require_rank_and_flags() {
        let a = Array::from_shape_fn(&[2, 3], |i| (i[0] * 3 + i[1]) as i32).unwrap();
        assert!(matches!(
            require(&a, None, 3, 0, ArrayFlags::empty()),
            Err(NdError::RankOutOfRange { ndim: 2, min: 3, .. })
        ));
        assert!(matches!(
            require(&a, None, 0, 1, ArrayFlags::empty()),
            Err(NdError::RankOutOfRange { ndim: 2, max: 1, .. })
        ));

        let same = require(&a, None, 1, 2, ArrayFlags::C_CONTIGUOUS).unwrap();
        assert_eq!(same.data_ptr(), a.data_ptr());

        let t = a.transpose();
        let c = require(&t, None, 0, 0, ArrayFlags::C_CONTIGUOUS).unwrap();
        assert_ne!(c.data_ptr(), t.data_ptr());
        assert!(c.is_c_contiguous());
        assert_eq!(c.to_vec::<i32>().unwrap(), t.to_vec::<i32>().unwrap());

        let f = require(&a, Some(DType::FLOAT64), 0, 0, ArrayFlags::F_CONTIGUOUS).unwrap();
        assert_eq!(f.dtype(), DType::FLOAT64);
        assert!(f.is_f_contiguous());
        assert!(matches!(
            require(&f, Some(DType::INT32), 0, 0, ArrayFlags::empty()),
            Err(NdError::CastNotAllowed { .. })
        ));

        let mut ro = a.clone();
        ro.clear_flags(ArrayFlags::WRITEABLE);
        let w = require(&ro, None, 0, 0, ArrayFlags::WRITEABLE | ArrayFlags::ALIGNED).unwrap();
        assert!(w.is_writeable());
        assert_ne!(w.data_ptr(), a.data_ptr());
    }

    #[test]
    fn test_to_vec_dtype_mismatch() {
        let a = zeros(&[2], DType::FLOAT32).unwrap();
        assert!(matches!(a.to_vec::<f64>(), Err(NdError::DTypeMismatch { .. })));
    }

    #[test]
    fn test_too_many_dimensions() {
        let shape = vec![1usize; MAX_DIMS + 1];
        assert!(matches!(
            zeros(&shape, DType::BOOL),
            Err(NdError::Runtime(RuntimeError::TooManyDimensions { .. }))
        ));
    }
}
