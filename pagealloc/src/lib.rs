//! OS-level memory acquisition for a pool-allocating collector.
//!
//! Two flavors are provided: `alloc_aligned` returns a block aligned to its
//! own (power of two) size, suitable for fixed-size heap pages; `alloc_raw`
//! returns a block with only the platform's default alignment, suitable for
//! oversize allocations that live on an intrusive list. Blocks from either
//! flavor are returned with `dealloc`.
//!
//! The caller owns the returned memory outright. Heap structures that link
//! blocks together intrusively free them one at a time mid-sweep, so no
//! owning wrapper type is offered at this level.

use std::ptr::NonNull;

pub type BlockPtr = NonNull<u8>;
pub type BlockSize = usize;

/// Set of possible block allocation failures
#[derive(Debug, PartialEq)]
pub enum BlockError {
    /// Usually means the requested block size, and therefore alignment, wasn't a power of two
    BadRequest,
    /// Insufficient memory, couldn't allocate a block
    OOM,
}

/// Allocate a block of the given size, aligned to that size. Size must be a
/// power of two.
pub fn alloc_aligned(size: BlockSize) -> Result<BlockPtr, BlockError> {
    if !(size > 0 && (size & (size - 1) == 0)) {
        return Err(BlockError::BadRequest);
    }

    internal::alloc_aligned(size)
}

/// Allocate a block of the given size with the platform's default alignment.
pub fn alloc_raw(size: BlockSize) -> Result<BlockPtr, BlockError> {
    if size == 0 {
        return Err(BlockError::BadRequest);
    }

    internal::alloc_raw(size)
}

/// Return a block obtained from `alloc_aligned` or `alloc_raw`.
///
/// Unsafe: the pointer must have come from one of the allocation functions
/// in this crate and must not be used again afterward.
pub unsafe fn dealloc(ptr: BlockPtr) {
    internal::dealloc(ptr)
}

#[cfg(unix)]
mod internal {
    use libc::{c_void, free, malloc, posix_memalign, EINVAL, ENOMEM};
    use std::ptr::{null_mut, NonNull};

    use crate::{BlockError, BlockPtr, BlockSize};

    pub fn alloc_aligned(size: BlockSize) -> Result<BlockPtr, BlockError> {
        unsafe {
            let mut address = null_mut();
            let rval = posix_memalign(&mut address, size, size);

            match rval {
                0 => Ok(NonNull::new_unchecked(address as *mut u8)),
                EINVAL => Err(BlockError::BadRequest),
                ENOMEM => Err(BlockError::OOM),
                _ => unreachable!(),
            }
        }
    }

    pub fn alloc_raw(size: BlockSize) -> Result<BlockPtr, BlockError> {
        unsafe {
            let address = malloc(size);

            match NonNull::new(address as *mut u8) {
                Some(ptr) => Ok(ptr),
                None => Err(BlockError::OOM),
            }
        }
    }

    pub unsafe fn dealloc(ptr: BlockPtr) {
        free(ptr.as_ptr() as *mut c_void);
    }
}

#[cfg(not(unix))]
mod internal {
    // maybe? https://docs.microsoft.com/en-us/cpp/c-runtime-library/reference/aligned-malloc

    use crate::{BlockError, BlockPtr, BlockSize};

    pub fn alloc_aligned(_size: BlockSize) -> Result<BlockPtr, BlockError> {
        unimplemented!()
    }

    pub fn alloc_raw(_size: BlockSize) -> Result<BlockPtr, BlockError> {
        unimplemented!()
    }

    pub unsafe fn dealloc(_ptr: BlockPtr) {
        unimplemented!()
    }
}
