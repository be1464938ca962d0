//! Native element types and their raw slot encoding.

use std::fmt;
use std::ptr;

use num_complex::{Complex, Complex64};
use num_traits::{AsPrimitive, NumCast};

use crate::dtype::{DType, DTypeKind};
use crate::object::ObjectRef;
use crate::value::Value;
use crate::ValueError;

/// A Rust type that can live in an array slot.
///
/// # Safety
/// Implementors guarantee `DTYPE.itemsize() == size_of::<Self>()` and that
/// `read`/`write` only touch `DTYPE.itemsize()` bytes at the given address.
pub unsafe trait Element: Clone + fmt::Debug + 'static {
    /// Built-in descriptor for this type.
    const DTYPE: DType;

    /// Read the element stored at `ptr`.
    ///
    /// # Safety
    /// `ptr` must point to a live, initialized slot of `Self::DTYPE`.
    unsafe fn read(ptr: *const u8) -> Self;

    /// Overwrite the element stored at `ptr`, releasing the previous value.
    ///
    /// # Safety
    /// `ptr` must point to a live, initialized, writable slot of `Self::DTYPE`.
    unsafe fn write(ptr: *mut u8, value: Self);

    /// Write into a slot that holds no value yet.
    ///
    /// # Safety
    /// `ptr` must point to writable memory of `Self::DTYPE`; its previous
    /// contents are not dropped.
    unsafe fn init(ptr: *mut u8, value: Self) {
        Self::write(ptr, value)
    }

    fn into_value(self) -> Value;

    fn from_value(value: Value) -> Result<Self, ValueError>;

    /// Conversion with `as` semantics: integers wrap, floats truncate
    /// toward zero (NaN becomes zero) and imaginary parts are dropped.
    /// Only kind mismatches with objects fail.
    fn from_value_lossy(value: Value) -> Result<Self, ValueError> {
        Self::from_value(value)
    }
}

fn cast_real<T: NumCast + Element>(value: Value) -> Result<T, ValueError> {
    let out = match &value {
        Value::Bool(b) => T::from(*b as u8),
        Value::Int(v) => T::from(*v),
        Value::UInt(v) => T::from(*v),
        Value::Float(v) => T::from(*v),
        Value::Complex(c) => {
            if c.im != 0.0 {
                return Err(ValueError::ComplexToReal(T::DTYPE.name()));
            }
            T::from(c.re)
        }
        Value::Object(_) => {
            return Err(ValueError::TypeMismatch {
                expected: T::DTYPE.name(),
                found: value.type_name(),
            })
        }
    };
    out.ok_or_else(|| ValueError::OutOfRange {
        value: value.to_string(),
        dtype: T::DTYPE.name(),
    })
}

fn wrap_real<T>(value: Value) -> Result<T, ValueError>
where
    T: Element + Copy,
    i64: AsPrimitive<T>,
    u64: AsPrimitive<T>,
    f64: AsPrimitive<T>,
{
    let float = |v: f64| -> T {
        match T::DTYPE.kind() {
            DTypeKind::Float => v.as_(),
            // Through a 64-bit integer first, so out-of-range values wrap.
            _ if v >= 0.0 => (v as u64).as_(),
            _ => (v as i64).as_(),
        }
    };
    match value {
        Value::Bool(b) => Ok((b as u64).as_()),
        Value::Int(v) => Ok(v.as_()),
        Value::UInt(v) => Ok(v.as_()),
        Value::Float(v) => Ok(float(v)),
        Value::Complex(c) => Ok(float(c.re)),
        Value::Object(_) => Err(ValueError::TypeMismatch {
            expected: T::DTYPE.name(),
            found: "object",
        }),
    }
}

macro_rules! impl_real_element {
    ($($t:ty => $dtype:ident, $variant:ident as $wide:ty;)*) => {
        $(
            unsafe impl Element for $t {
                const DTYPE: DType = DType::$dtype;

                #[inline]
                unsafe fn read(ptr: *const u8) -> Self {
                    ptr::read_unaligned(ptr as *const $t)
                }

                #[inline]
                unsafe fn write(ptr: *mut u8, value: Self) {
                    ptr::write_unaligned(ptr as *mut $t, value)
                }

                #[inline]
                fn into_value(self) -> Value {
                    Value::$variant(self as $wide)
                }

                fn from_value(value: Value) -> Result<Self, ValueError> {
                    cast_real::<$t>(value)
                }

                fn from_value_lossy(value: Value) -> Result<Self, ValueError> {
                    wrap_real::<$t>(value)
                }
            }
        )*
    };
}

impl_real_element! {
    i8 => INT8, Int as i64;
    i16 => INT16, Int as i64;
    i32 => INT32, Int as i64;
    i64 => INT64, Int as i64;
    u8 => UINT8, UInt as u64;
    u16 => UINT16, UInt as u64;
    u32 => UINT32, UInt as u64;
    u64 => UINT64, UInt as u64;
    f32 => FLOAT32, Float as f64;
    f64 => FLOAT64, Float as f64;
}

macro_rules! impl_complex_element {
    ($($f:ty => $dtype:ident;)*) => {
        $(
            unsafe impl Element for Complex<$f> {
                const DTYPE: DType = DType::$dtype;

                #[inline]
                unsafe fn read(ptr: *const u8) -> Self {
                    ptr::read_unaligned(ptr as *const Complex<$f>)
                }

                #[inline]
                unsafe fn write(ptr: *mut u8, value: Self) {
                    ptr::write_unaligned(ptr as *mut Complex<$f>, value)
                }

                #[inline]
                fn into_value(self) -> Value {
                    Value::Complex(Complex64::new(self.re as f64, self.im as f64))
                }

                fn from_value(value: Value) -> Result<Self, ValueError> {
                    match value {
                        Value::Complex(c) => Ok(Complex::new(c.re as $f, c.im as $f)),
                        Value::Object(_) => Err(ValueError::TypeMismatch {
                            expected: Self::DTYPE.name(),
                            found: "object",
                        }),
                        real => Ok(Complex::new(cast_real::<f64>(real)? as $f, 0.0)),
                    }
                }
            }
        )*
    };
}

impl_complex_element! {
    f32 => COMPLEX64;
    f64 => COMPLEX128;
}

unsafe impl Element for bool {
    const DTYPE: DType = DType::BOOL;

    // Any non-zero byte reads as true, so reinterpreted integer buffers stay sound.
    #[inline]
    unsafe fn read(ptr: *const u8) -> Self {
        *ptr != 0
    }

    #[inline]
    unsafe fn write(ptr: *mut u8, value: Self) {
        *ptr = value as u8;
    }

    #[inline]
    fn into_value(self) -> Value {
        Value::Bool(self)
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Object(_) => Err(ValueError::TypeMismatch {
                expected: "bool",
                found: "object",
            }),
            numeric => Ok(numeric.is_truthy()),
        }
    }
}

// Object slots are always allocated with `DType::OBJECT` alignment.
unsafe impl Element for ObjectRef {
    const DTYPE: DType = DType::OBJECT;

    #[inline]
    unsafe fn read(ptr: *const u8) -> Self {
        (*(ptr as *const ObjectRef)).clone()
    }

    #[inline]
    unsafe fn write(ptr: *mut u8, value: Self) {
        *(ptr as *mut ObjectRef) = value;
    }

    #[inline]
    unsafe fn init(ptr: *mut u8, value: Self) {
        ptr::write(ptr as *mut ObjectRef, value)
    }

    #[inline]
    fn into_value(self) -> Value {
        Value::Object(self)
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Object(obj) => Ok(obj),
            other => Err(ValueError::TypeMismatch {
                expected: "object",
                found: other.type_name(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex32;

    fn roundtrip_slot<T: Element>(value: T) -> T {
        let mut slot = vec![0u8; T::DTYPE.itemsize() + 1];
        // Deliberately misaligned by one byte.
        let p = unsafe { slot.as_mut_ptr().add(1) };
        unsafe {
            T::init(p, value);
            T::read(p)
        }
    }

    #[test]
    fn test_unaligned_numeric_slots() {
        assert_eq!(roundtrip_slot(-7i32), -7);
        assert_eq!(roundtrip_slot(3.5f64), 3.5);
        assert_eq!(roundtrip_slot(u64::MAX), u64::MAX);
        assert_eq!(roundtrip_slot(Complex32::new(1.0, -2.0)), Complex32::new(1.0, -2.0));
        assert!(roundtrip_slot(true));
    }

    #[test]
    fn test_from_value_conversions() {
        assert_eq!(i8::from_value(Value::Int(-5)), Ok(-5));
        assert_eq!(f32::from_value(Value::UInt(3)), Ok(3.0));
        assert_eq!(i32::from_value(Value::Float(2.9)), Ok(2));
        assert_eq!(u8::from_value(Value::Bool(true)), Ok(1));
        assert!(bool::from_value(Value::Float(0.5)).unwrap());
        assert_eq!(
            Complex64::from_value(Value::Int(4)),
            Ok(Complex64::new(4.0, 0.0))
        );
    }

    #[test]
    fn test_lossy_conversions_wrap_and_truncate() {
        assert_eq!(i8::from_value_lossy(Value::Float(300.0)), Ok(44));
        assert_eq!(i8::from_value_lossy(Value::Int(200)), Ok(-56));
        assert_eq!(u8::from_value_lossy(Value::Float(-1.0)), Ok(255));
        assert_eq!(u32::from_value_lossy(Value::Int(-1)), Ok(u32::MAX));
        assert_eq!(i32::from_value_lossy(Value::Float(f64::NAN)), Ok(0));
        assert_eq!(i32::from_value_lossy(Value::Float(-2.9)), Ok(-2));
        assert_eq!(
            f64::from_value_lossy(Value::Complex(Complex64::new(1.5, 2.0))),
            Ok(1.5)
        );
        assert_eq!(f32::from_value_lossy(Value::Float(0.5)), Ok(0.5));
        assert_eq!(
            Complex64::from_value_lossy(Value::Float(2.0)),
            Ok(Complex64::new(2.0, 0.0))
        );
        assert!(matches!(
            i64::from_value_lossy(Value::Object(ObjectRef::none())),
            Err(ValueError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_from_value_errors() {
        assert!(matches!(
            u8::from_value(Value::Int(300)),
            Err(ValueError::OutOfRange { .. })
        ));
        assert!(matches!(
            u32::from_value(Value::Int(-1)),
            Err(ValueError::OutOfRange { .. })
        ));
        assert!(matches!(
            f64::from_value(Value::Complex(Complex64::new(1.0, 1.0))),
            Err(ValueError::ComplexToReal("float64"))
        ));
        assert!(matches!(
            f64::from_value(Value::Object(ObjectRef::none())),
            Err(ValueError::TypeMismatch { .. })
        ));
        assert!(matches!(
            ObjectRef::from_value(Value::Int(1)),
            Err(ValueError::TypeMismatch { .. })
        ));
    }
}
