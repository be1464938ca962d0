//! Reference-counted element storage.

use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::{self, NonNull};
use std::rc::Rc;

use bytemuck::Pod;
use ndbridge_traits::{DType, Element, ObjectRef};

use crate::{Result, RuntimeError};

/// Alignment of every allocation; covers all built-in dtypes.
const BUFFER_ALIGN: usize = 16;

/// A zero-initialized block of `len` elements of one dtype.
///
/// Object buffers start with every slot set to the null handle and release
/// all handles when dropped.
pub struct Buffer {
    ptr: NonNull<u8>,
    layout: Layout,
    dtype: DType,
    len: usize,
}

impl Buffer {
    pub fn allocate(dtype: DType, len: usize) -> Result<Rc<Buffer>> {
        let nbytes = len
            .checked_mul(dtype.itemsize())
            .ok_or(RuntimeError::AllocationFailed { bytes: usize::MAX })?;
        let layout = Layout::from_size_align(nbytes.max(BUFFER_ALIGN), BUFFER_ALIGN)
            .map_err(|_| RuntimeError::AllocationFailed { bytes: nbytes })?;
        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(RuntimeError::AllocationFailed { bytes: nbytes })?;
        if dtype.is_object() {
            for i in 0..len {
                // SAFETY: slot i lies inside the allocation and is suitably aligned.
                unsafe { ObjectRef::init(raw.add(i * dtype.itemsize()), ObjectRef::none()) };
            }
        }
        log::trace!("allocated {} x {} ({} bytes)", len, dtype, nbytes);
        Ok(Rc::new(Buffer {
            ptr,
            layout,
            dtype,
            len,
        }))
    }

    /// Copy a slice of plain-old-data elements into a new buffer.
    pub fn from_pod_slice<T: Element + Pod>(data: &[T]) -> Result<Rc<Buffer>> {
        let buffer = Buffer::allocate(T::DTYPE, data.len())?;
        let bytes: &[u8] = bytemuck::cast_slice(data);
        // SAFETY: the buffer holds exactly `bytes.len()` bytes of storage.
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), buffer.as_ptr(), bytes.len()) };
        Ok(buffer)
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn nbytes(&self) -> usize {
        self.len * self.dtype.itemsize()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if self.dtype.is_object() {
            log::trace!("releasing {} object slots", self.len);
            for i in 0..self.len {
                // SAFETY: every slot was initialized in `allocate` and is dropped once.
                unsafe {
                    ptr::drop_in_place(self.ptr.as_ptr().add(i * self.dtype.itemsize()) as *mut ObjectRef)
                };
            }
        }
        // SAFETY: allocated in `allocate` with this exact layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("dtype", &self.dtype)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndbridge_traits::HostObject;
    use std::any::Any;

    #[derive(Debug)]
    struct Probe;

    impl HostObject for Probe {
        fn deep_copy(&self) -> ObjectRef {
            ObjectRef::new(Probe)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_allocate_zeroed() {
        let buf = Buffer::allocate(DType::FLOAT64, 4).unwrap();
        assert_eq!(buf.nbytes(), 32);
        assert_eq!(buf.as_ptr() as usize % BUFFER_ALIGN, 0);
        for i in 0..4 {
            assert_eq!(unsafe { f64::read(buf.as_ptr().add(i * 8)) }, 0.0);
        }
    }

    #[test]
    fn test_allocate_empty() {
        let buf = Buffer::allocate(DType::INT32, 0).unwrap();
        assert!(buf.is_empty());
        assert_eq!(buf.nbytes(), 0);
    }

    #[test]
    fn test_object_slots_released_on_drop() {
        let obj = ObjectRef::new(Probe);
        let buf = Buffer::allocate(DType::OBJECT, 3).unwrap();
        for i in 0..3 {
            unsafe { ObjectRef::write(buf.as_ptr().add(i * DType::OBJECT.itemsize()), obj.clone()) };
        }
        assert_eq!(obj.ref_count(), 4);
        drop(buf);
        assert_eq!(obj.ref_count(), 1);
    }

    #[test]
    fn test_from_pod_slice() {
        let buf = Buffer::from_pod_slice(&[1i32, -2, 3]).unwrap();
        assert_eq!(buf.dtype(), DType::INT32);
        assert_eq!(unsafe { i32::read(buf.as_ptr().add(4)) }, -2);
    }
}
