//! The big-object allocator.
//!
//! Allocations above the largest size class get their own OS block and live
//! on one global intrusive list. A record is a link word, the shared header
//! word, then the payload; it is never subdivided and never migrates into a
//! pool.

use std::ptr::NonNull;

use pagealloc::BlockError;

use crate::cellptr::CellPtr;
use crate::constants::WORD;
use crate::header::CellHeader;
use crate::memsource::MemorySource;

/// Prefix of every big-object block: list link, the total block size as
/// recorded at allocation, then the flags word shared with pool cells, so
/// the payload still sits one word past its header.
#[repr(C)]
struct BigObject {
    next: Option<NonNull<BigObject>>,
    size: usize,
    header: CellHeader,
}

/// Words of prefix in front of a big object's payload.
const PREFIX_WORDS: usize = 3;

/// What one big-object sweep kept and released.
#[derive(Default)]
pub(crate) struct BigTally {
    pub(crate) released: usize,
    /// Bytes of the released blocks, prefix included.
    pub(crate) bytes_freed: usize,
    pub(crate) live: usize,
    pub(crate) bytes_live: usize,
}

/// The global list of big objects.
pub struct BigList {
    head: Option<NonNull<BigObject>>,
}

impl BigList {
    pub(crate) fn new() -> BigList {
        BigList { head: None }
    }

    /// Acquire a block of `size + PREFIX_WORDS * WORD` bytes, prepend its
    /// record to the list and return the zero-flagged, uninitialized payload.
    pub(crate) fn alloc<M: MemorySource>(
        &mut self,
        source: &mut M,
        size: usize,
    ) -> Result<CellPtr, BlockError> {
        let total = size + PREFIX_WORDS * WORD;
        let raw = source.big_block(total)?;
        let record = raw.cast::<BigObject>();

        unsafe {
            record.as_ptr().write(BigObject {
                next: self.head,
                size: total,
                header: CellHeader::live(),
            });
        }
        self.head = Some(record);

        Ok(CellPtr::from_raw(unsafe { raw.as_ptr().add(PREFIX_WORDS * WORD) }))
    }

    /// Walk the list with a previous-link cursor: marked records survive
    /// with the bit cleared, the rest are unlinked and released.
    pub(crate) fn sweep<M: MemorySource>(&mut self, source: &mut M) -> BigTally {
        let mut tally = BigTally::default();

        let mut current = self.head;
        let mut prev: Option<NonNull<BigObject>> = None;

        while let Some(mut record) = current {
            let next = unsafe { record.as_ref().next };
            let size = unsafe { record.as_ref().size };

            if unsafe { record.as_ref().header.is_marked() } {
                unsafe { record.as_mut().header.clear_marked() };
                tally.live += 1;
                tally.bytes_live += size;
                prev = Some(record);
            } else {
                match prev {
                    Some(mut p) => unsafe { p.as_mut() }.next = next,
                    None => self.head = next,
                }
                unsafe { source.release_big(record.cast()) };
                tally.released += 1;
                tally.bytes_freed += size;
            }

            current = next;
        }

        tally
    }

    /// Release every record. Used on heap teardown.
    pub(crate) fn release_all<M: MemorySource>(&mut self, source: &mut M) {
        let mut current = self.head;
        while let Some(record) = current {
            let next = unsafe { record.as_ref().next };
            unsafe { source.release_big(record.cast()) };
            current = next;
        }
        self.head = None;
    }
}

#[cfg(test)]
impl BigList {
    pub(crate) fn len(&self) -> usize {
        let mut count = 0;
        let mut current = self.head;
        while let Some(record) = current {
            count += 1;
            current = unsafe { record.as_ref().next };
        }
        count
    }
}
