//! Value Type Traits: per-operand strategies that turn a raw element pointer
//! into a [`Value`] and back.
//!
//! Only two value kinds exist. [`NumericValue`] reads and writes plain bytes
//! of a numeric dtype. [`ObjectReferenceValue`] treats each slot as an
//! [`ObjectRef`] handle, so writes release the previous object and acquire
//! the new one.

use std::fmt;
use std::rc::Rc;

use num_complex::{Complex, Complex64};

use crate::dtype::{DType, DTypeKind};
use crate::element::Element;
use crate::object::ObjectRef;
use crate::ValueError;

/// A dynamically typed element value.
#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Complex(Complex64),
    Object(ObjectRef),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::Complex(_) => "complex",
            Value::Object(_) => "object",
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Object(_) => ValueKind::ObjectReference,
            _ => ValueKind::Numeric,
        }
    }

    /// Truth value: non-zero for numbers, [`ObjectRef::is_truthy`] for objects.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(v) => *v != 0,
            Value::UInt(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Complex(c) => c.re != 0.0 || c.im != 0.0,
            Value::Object(o) => o.is_truthy(),
        }
    }

    /// Numeric equality across kinds (`Int(1) == Float(1.0) == Bool(true)`).
    /// Objects compare only with objects.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => a.equals(b),
            (Value::Object(_), _) | (_, Value::Object(_)) => false,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Int(a), Value::UInt(b)) | (Value::UInt(b), Value::Int(a)) => {
                u64::try_from(*a).is_ok_and(|a| a == *b)
            }
            (a, b) => a.as_complex() == b.as_complex(),
        }
    }

    fn as_complex(&self) -> Complex64 {
        match self {
            Value::Bool(b) => Complex64::new(*b as u8 as f64, 0.0),
            Value::Int(v) => Complex64::new(*v as f64, 0.0),
            Value::UInt(v) => Complex64::new(*v as f64, 0.0),
            Value::Float(v) => Complex64::new(*v, 0.0),
            Value::Complex(c) => *c,
            Value::Object(_) => Complex64::new(f64::NAN, 0.0),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Complex(c) => write!(f, "({}{:+}j)", c.re, c.im),
            Value::Object(o) => write!(f, "{o:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<Complex64> for Value {
    fn from(v: Complex64) -> Self {
        Value::Complex(v)
    }
}

impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self {
        Value::Object(v)
    }
}

/// The closed set of value kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Numeric,
    ObjectReference,
}

/// Strategy translating raw element pointers of one dtype into values.
pub trait ValueTypeTraits: fmt::Debug {
    fn value_kind(&self) -> ValueKind;

    /// Element layout this strategy reads and writes.
    fn dtype(&self) -> DType;

    /// # Safety
    /// `ptr` must address an initialized element of [`Self::dtype`].
    unsafe fn load(&self, ptr: *const u8) -> Value;

    /// Convert `value` to [`Self::dtype`] and store it at `ptr`.
    ///
    /// # Safety
    /// `ptr` must address an initialized, writable element of [`Self::dtype`].
    unsafe fn store(&self, ptr: *mut u8, value: Value) -> Result<(), ValueError>;

    /// Like [`store`](Self::store) with the conversion of [`Value::cast_lossy`].
    ///
    /// # Safety
    /// Same contract as [`store`](Self::store).
    unsafe fn store_lossy(&self, ptr: *mut u8, value: Value) -> Result<(), ValueError> {
        self.store(ptr, value)
    }

    /// Copy one element between two slots of [`Self::dtype`].
    ///
    /// # Safety
    /// Both pointers must address initialized elements; `dst` must be writable.
    unsafe fn copy_element(&self, src: *const u8, dst: *mut u8);
}

// Binds `$t` to the native Rust type of a dtype and evaluates `$body`.
macro_rules! with_native_type {
    ($dtype:expr, |$t:ident| $body:expr) => {{
        match ($dtype.kind(), $dtype.itemsize()) {
            (DTypeKind::Bool, _) => {
                type $t = bool;
                $body
            }
            (DTypeKind::Int, 1) => {
                type $t = i8;
                $body
            }
            (DTypeKind::Int, 2) => {
                type $t = i16;
                $body
            }
            (DTypeKind::Int, 4) => {
                type $t = i32;
                $body
            }
            (DTypeKind::Int, _) => {
                type $t = i64;
                $body
            }
            (DTypeKind::UInt, 1) => {
                type $t = u8;
                $body
            }
            (DTypeKind::UInt, 2) => {
                type $t = u16;
                $body
            }
            (DTypeKind::UInt, 4) => {
                type $t = u32;
                $body
            }
            (DTypeKind::UInt, _) => {
                type $t = u64;
                $body
            }
            (DTypeKind::Float, 4) => {
                type $t = f32;
                $body
            }
            (DTypeKind::Float, _) => {
                type $t = f64;
                $body
            }
            (DTypeKind::Complex, 8) => {
                type $t = Complex<f32>;
                $body
            }
            (DTypeKind::Complex, _) => {
                type $t = Complex<f64>;
                $body
            }
            (DTypeKind::Object, _) => {
                type $t = ObjectRef;
                $body
            }
        }
    }};
}

impl Value {
    /// Convert to the value representation of `dtype`.
    ///
    /// Numeric conversions truncate floats toward zero and fail when the
    /// result is out of range; objects only convert to the object dtype.
    pub fn cast(self, dtype: DType) -> Result<Value, ValueError> {
        with_native_type!(dtype, |T| Ok(T::from_value(self)?.into_value()))
    }

    /// Like [`cast`](Self::cast) but with `as` semantics, as used by unsafe
    /// casting: integers wrap, floats truncate and imaginary parts are
    /// dropped.
    pub fn cast_lossy(self, dtype: DType) -> Result<Value, ValueError> {
        with_native_type!(dtype, |T| Ok(T::from_value_lossy(self)?.into_value()))
    }
}

/// Plain-bytes access for a numeric dtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericValue {
    dtype: DType,
}

impl NumericValue {
    pub fn new(dtype: DType) -> Result<Self, ValueError> {
        if !dtype.is_numeric() {
            return Err(ValueError::NotNumeric(dtype.name()));
        }
        Ok(Self { dtype })
    }
}

impl ValueTypeTraits for NumericValue {
    fn value_kind(&self) -> ValueKind {
        ValueKind::Numeric
    }

    fn dtype(&self) -> DType {
        self.dtype
    }

    unsafe fn load(&self, ptr: *const u8) -> Value {
        with_native_type!(self.dtype, |T| T::read(ptr).into_value())
    }

    unsafe fn store(&self, ptr: *mut u8, value: Value) -> Result<(), ValueError> {
        with_native_type!(self.dtype, |T| {
            T::write(ptr, T::from_value(value)?);
            Ok(())
        })
    }

    unsafe fn store_lossy(&self, ptr: *mut u8, value: Value) -> Result<(), ValueError> {
        with_native_type!(self.dtype, |T| {
            T::write(ptr, T::from_value_lossy(value)?);
            Ok(())
        })
    }

    unsafe fn copy_element(&self, src: *const u8, dst: *mut u8) {
        std::ptr::copy(src, dst, self.dtype.itemsize());
    }
}

/// Reference-counted host-object handle access.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectReferenceValue;

impl ValueTypeTraits for ObjectReferenceValue {
    fn value_kind(&self) -> ValueKind {
        ValueKind::ObjectReference
    }

    fn dtype(&self) -> DType {
        DType::OBJECT
    }

    unsafe fn load(&self, ptr: *const u8) -> Value {
        Value::Object(ObjectRef::read(ptr))
    }

    unsafe fn store(&self, ptr: *mut u8, value: Value) -> Result<(), ValueError> {
        ObjectRef::write(ptr, ObjectRef::from_value(value)?);
        Ok(())
    }

    unsafe fn copy_element(&self, src: *const u8, dst: *mut u8) {
        ObjectRef::write(dst, ObjectRef::read(src));
    }
}

/// Default strategy for a dtype.
pub fn value_traits_for(dtype: DType) -> Rc<dyn ValueTypeTraits> {
    match dtype.kind() {
        DTypeKind::Object => Rc::new(ObjectReferenceValue),
        _ => Rc::new(NumericValue { dtype }),
    }
}
