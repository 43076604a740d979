use std::ptr::NonNull;

/// A pointer to the payload of a heap cell.
///
/// The cell's header word sits immediately below the payload address. The
/// pointer itself is never null; references that may be absent cross the
/// runtime boundary as `Option<CellPtr>`, so the tracer cannot be handed a
/// null object.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct CellPtr {
    ptr: NonNull<u8>,
}

impl CellPtr {
    /// Wrap a bare payload pointer, which must not be null.
    pub fn from_raw(ptr: *mut u8) -> CellPtr {
        assert!(!ptr.is_null(), "null payload pointer");
        CellPtr {
            ptr: unsafe { NonNull::new_unchecked(ptr) },
        }
    }

    /// Get a bare copy of the payload pointer
    pub fn as_ptr(self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// The payload address as an integer, for range and identity checks
    pub fn addr(self) -> usize {
        self.ptr.as_ptr() as usize
    }
}
