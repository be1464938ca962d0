//! Host-object references stored in object-dtype arrays.
//!
//! An object array holds one [`ObjectRef`] per element. The handle is
//! reference-counted: reading an element acquires a new reference, overwriting
//! an element releases the old one. A null handle plays the role of the host's
//! "none" object.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// Capabilities the array layer needs from a host object.
pub trait HostObject: fmt::Debug {
    /// A recursively independent copy of this object.
    fn deep_copy(&self) -> ObjectRef;

    /// Truth value used by `all`/`any`.
    fn is_truthy(&self) -> bool {
        true
    }

    /// Value equality used by `equal`. Identity is checked before this is called.
    fn equals(&self, _other: &dyn HostObject) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any;
}

/// Nullable, reference-counted handle to a [`HostObject`].
#[derive(Clone, Default)]
pub struct ObjectRef(Option<Rc<dyn HostObject>>);

impl ObjectRef {
    pub fn new<O: HostObject + 'static>(object: O) -> Self {
        ObjectRef(Some(Rc::new(object)))
    }

    /// The null handle.
    #[inline]
    pub fn none() -> Self {
        ObjectRef(None)
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    pub fn get(&self) -> Option<&dyn HostObject> {
        self.0.as_deref()
    }

    pub fn downcast_ref<O: 'static>(&self) -> Option<&O> {
        self.get().and_then(|obj| obj.as_any().downcast_ref::<O>())
    }

    /// Number of live handles to the referenced object (0 for the null handle).
    pub fn ref_count(&self) -> usize {
        self.0.as_ref().map_or(0, Rc::strong_count)
    }

    /// True when both handles reference the same object, or both are null.
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    pub fn deep_copy(&self) -> ObjectRef {
        match self.get() {
            Some(obj) => obj.deep_copy(),
            None => ObjectRef::none(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        self.get().is_some_and(|obj| obj.is_truthy())
    }

    pub fn equals(&self, other: &ObjectRef) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        match (self.get(), other.get()) {
            (Some(a), Some(b)) => a.equals(b),
            _ => false,
        }
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(obj) => write!(f, "ObjectRef({obj:?})"),
            None => f.write_str("ObjectRef(None)"),
        }
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}
