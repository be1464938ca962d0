//! Data-type descriptors.
//!
//! A [`DType`] is a lightweight `Copy` handle describing how one array element
//! is laid out in memory. Only the built-in descriptors exist; they are looked
//! up by native type through [`crate::Element::DTYPE`] or by name with
//! [`DType::from_name`].

use std::fmt;

use crate::object::ObjectRef;

/// Broad category of a dtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DTypeKind {
    Bool,
    Int,
    UInt,
    Float,
    Complex,
    /// Slots hold reference-counted host objects ([`ObjectRef`]).
    Object,
}

impl DTypeKind {
    /// Position in the `bool < uint < int < float < complex` promotion chain.
    fn rank(self) -> Option<u8> {
        match self {
            DTypeKind::Bool => Some(0),
            DTypeKind::UInt => Some(1),
            DTypeKind::Int => Some(2),
            DTypeKind::Float => Some(3),
            DTypeKind::Complex => Some(4),
            DTypeKind::Object => None,
        }
    }
}

/// How permissive a dtype conversion may be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CastingMode {
    /// Only identical dtypes.
    #[default]
    No,
    /// Identical dtypes up to byte order (all dtypes here are native-endian).
    Equiv,
    /// Conversions that preserve every value.
    Safe,
    /// Safe conversions plus downcasts within the same kind.
    SameKind,
    /// Any numeric conversion, with wrapping and truncating `as` semantics.
    Unsafe,
}

/// Element layout descriptor.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DType {
    kind: DTypeKind,
    itemsize: usize,
    alignment: usize,
    name: &'static str,
}

impl DType {
    pub const BOOL: DType = DType::builtin(DTypeKind::Bool, 1, 1, "bool");
    pub const INT8: DType = DType::builtin(DTypeKind::Int, 1, 1, "int8");
    pub const INT16: DType = DType::builtin(DTypeKind::Int, 2, 2, "int16");
    pub const INT32: DType = DType::builtin(DTypeKind::Int, 4, 4, "int32");
    pub const INT64: DType = DType::builtin(DTypeKind::Int, 8, 8, "int64");
    pub const UINT8: DType = DType::builtin(DTypeKind::UInt, 1, 1, "uint8");
    pub const UINT16: DType = DType::builtin(DTypeKind::UInt, 2, 2, "uint16");
    pub const UINT32: DType = DType::builtin(DTypeKind::UInt, 4, 4, "uint32");
    pub const UINT64: DType = DType::builtin(DTypeKind::UInt, 8, 8, "uint64");
    pub const FLOAT32: DType = DType::builtin(DTypeKind::Float, 4, 4, "float32");
    pub const FLOAT64: DType = DType::builtin(DTypeKind::Float, 8, 8, "float64");
    pub const COMPLEX64: DType = DType::builtin(DTypeKind::Complex, 8, 4, "complex64");
    pub const COMPLEX128: DType = DType::builtin(DTypeKind::Complex, 16, 8, "complex128");
    pub const OBJECT: DType = DType::builtin(
        DTypeKind::Object,
        std::mem::size_of::<ObjectRef>(),
        std::mem::align_of::<ObjectRef>(),
        "object",
    );

    const ALL: [DType; 14] = [
        DType::BOOL,
        DType::INT8,
        DType::INT16,
        DType::INT32,
        DType::INT64,
        DType::UINT8,
        DType::UINT16,
        DType::UINT32,
        DType::UINT64,
        DType::FLOAT32,
        DType::FLOAT64,
        DType::COMPLEX64,
        DType::COMPLEX128,
        DType::OBJECT,
    ];

    const fn builtin(kind: DTypeKind, itemsize: usize, alignment: usize, name: &'static str) -> Self {
        Self {
            kind,
            itemsize,
            alignment,
            name,
        }
    }

    /// Built-in dtype for a native Rust element type.
    #[inline]
    pub fn of<T: crate::Element>() -> DType {
        T::DTYPE
    }

    /// Look up a built-in dtype by its canonical name (`"float64"`, `"object"`, ...).
    pub fn from_name(name: &str) -> Option<DType> {
        DType::ALL.iter().copied().find(|dt| dt.name == name)
    }

    #[inline]
    pub fn kind(&self) -> DTypeKind {
        self.kind
    }

    /// Size of one element in bytes. Always positive.
    #[inline]
    pub fn itemsize(&self) -> usize {
        self.itemsize
    }

    #[inline]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn is_object(&self) -> bool {
        self.kind == DTypeKind::Object
    }

    #[inline]
    pub fn is_numeric(&self) -> bool {
        !self.is_object()
    }

    /// Two descriptors are equivalent when they describe the same element layout.
    #[inline]
    pub fn equivalent(a: &DType, b: &DType) -> bool {
        a.kind == b.kind && a.itemsize == b.itemsize
    }

    /// Whether values of `self` may be converted to `to` under `mode`.
    ///
    /// Object dtypes only ever convert to object dtypes.
    pub fn can_cast(&self, to: &DType, mode: CastingMode) -> bool {
        if DType::equivalent(self, to) {
            return true;
        }
        let (Some(from_rank), Some(to_rank)) = (self.kind.rank(), to.kind.rank()) else {
            return false;
        };
        match mode {
            CastingMode::No | CastingMode::Equiv => false,
            CastingMode::Safe => self.safe_cast(to),
            CastingMode::SameKind => self.safe_cast(to) || from_rank <= to_rank,
            CastingMode::Unsafe => true,
        }
    }

    fn safe_cast(&self, to: &DType) -> bool {
        use DTypeKind::*;
        let (a, b) = (self.itemsize, to.itemsize);
        match (self.kind, to.kind) {
            (Bool, _) => true,
            (Int, Int) | (UInt, UInt) | (Float, Float) | (Complex, Complex) => b >= a,
            (UInt, Int) => b > a,
            (Int | UInt, Float) => b > a || (a == 8 && b == 8),
            (Int | UInt, Complex) => b / 2 > a || (a == 8 && b == 16),
            (Float, Complex) => b >= 2 * a,
            _ => false,
        }
    }
}

impl fmt::Debug for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dtype({})", self.name)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    #[test]
    fn test_builtin_lookup() {
        assert_eq!(DType::of::<f64>(), DType::FLOAT64);
        assert_eq!(DType::of::<bool>(), DType::BOOL);
        assert_eq!(DType::of::<Complex64>(), DType::COMPLEX128);
        assert_eq!(DType::of::<ObjectRef>(), DType::OBJECT);
        assert_eq!(DType::from_name("uint16"), Some(DType::UINT16));
        assert_eq!(DType::from_name("float128"), None);
    }

    #[test]
    fn test_itemsize_positive() {
        for dt in DType::ALL {
            assert!(dt.itemsize() > 0, "{dt} has zero itemsize");
            assert_eq!(dt.itemsize() % dt.alignment(), 0);
        }
    }

    #[test]
    fn test_equivalent() {
        assert!(DType::equivalent(&DType::INT32, &DType::of::<i32>()));
        assert!(!DType::equivalent(&DType::INT32, &DType::UINT32));
        assert!(!DType::equivalent(&DType::INT32, &DType::FLOAT32));
    }

    #[test]
    fn test_can_cast_safe() {
        assert!(DType::INT16.can_cast(&DType::FLOAT32, CastingMode::Safe));
        assert!(!DType::INT32.can_cast(&DType::FLOAT32, CastingMode::Safe));
        assert!(DType::INT64.can_cast(&DType::FLOAT64, CastingMode::Safe));
        assert!(DType::UINT8.can_cast(&DType::INT16, CastingMode::Safe));
        assert!(!DType::UINT8.can_cast(&DType::INT8, CastingMode::Safe));
        assert!(DType::FLOAT32.can_cast(&DType::COMPLEX64, CastingMode::Safe));
        assert!(!DType::FLOAT64.can_cast(&DType::COMPLEX64, CastingMode::Safe));
        assert!(DType::BOOL.can_cast(&DType::UINT8, CastingMode::Safe));
    }

    #[test]
    fn test_can_cast_modes() {
        assert!(!DType::FLOAT64.can_cast(&DType::FLOAT32, CastingMode::No));
        assert!(!DType::FLOAT64.can_cast(&DType::FLOAT32, CastingMode::Safe));
        assert!(DType::FLOAT64.can_cast(&DType::FLOAT32, CastingMode::SameKind));
        assert!(!DType::FLOAT64.can_cast(&DType::INT64, CastingMode::SameKind));
        assert!(DType::FLOAT64.can_cast(&DType::INT64, CastingMode::Unsafe));
        assert!(!DType::FLOAT64.can_cast(&DType::OBJECT, CastingMode::Unsafe));
        assert!(!DType::OBJECT.can_cast(&DType::FLOAT64, CastingMode::Unsafe));
        assert!(DType::OBJECT.can_cast(&DType::OBJECT, CastingMode::No));
    }
}
