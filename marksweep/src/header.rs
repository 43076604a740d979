//! The one-word metadata header preceding every cell payload.
//!
//! The word has two interpretations. On a live cell it is a flags word: bit 0
//! is the mark bit, bit 1 is reserved for finalizer registration, and all
//! remaining bits are zero. On a free cell it is the link to the next free
//! cell of the same pool, tagged with the FREE bit.
//!
//! Cells are at least word-aligned, so a link's low three bits are zero and
//! bit 2 can carry the FREE tag. The end-of-freelist terminator is the bare
//! FREE bit, never the all-zero word: an all-zero word is a freshly
//! allocated live cell and must not read as free.

use std::ptr::NonNull;

use crate::cellptr::CellPtr;
use crate::constants::WORD;

/// Set while an object is reachable during a mark phase; cleared on
/// survivors during sweep.
pub const MARK: usize = 1 << 0;

/// Reserved for finalizer registration. Declared but not acted on by the
/// collector.
pub const FINALIZE: usize = 1 << 1;

/// Tag carried by every free-list link, distinguishing it from a live flags
/// word.
const FREE: usize = 1 << 2;

/// Bits that may be set in a live cell's header.
const LIVE_MASK: usize = MARK | FINALIZE;

/// The header word of a heap cell or big-object record.
#[repr(transparent)]
pub struct CellHeader(usize);

impl CellHeader {
    /// A live header with all flags clear, as written at allocation time.
    pub(crate) fn live() -> CellHeader {
        CellHeader(0)
    }

    /// A free-list link to `next`, or the list terminator for `None`.
    pub(crate) fn free(next: Option<NonNull<CellHeader>>) -> CellHeader {
        let mut header = CellHeader(0);
        header.set_free_link(next);
        header
    }

    /// Locate the header of the cell owning `obj`'s payload.
    ///
    /// Unsafe: `obj` must be a payload handed out by this collector, so that
    /// the preceding word really is a header.
    pub(crate) unsafe fn of_payload(obj: CellPtr) -> NonNull<CellHeader> {
        NonNull::new_unchecked(obj.as_ptr().sub(WORD) as *mut CellHeader)
    }

    /// The payload address of the cell owning this header.
    pub(crate) unsafe fn payload(this: NonNull<CellHeader>) -> CellPtr {
        CellPtr::from_raw((this.as_ptr() as *mut u8).add(WORD))
    }

    /// A cell is free when any bit outside the live flag set is present.
    pub(crate) fn is_free(&self) -> bool {
        self.0 & !LIVE_MASK != 0
    }

    pub(crate) fn is_marked(&self) -> bool {
        self.0 & MARK != 0
    }

    pub(crate) fn set_marked(&mut self) {
        self.0 |= MARK;
    }

    pub(crate) fn clear_marked(&mut self) {
        self.0 &= !MARK;
    }

    /// Zero the word, turning the cell live with no flags set. Allocation
    /// must do this before the payload is handed out.
    pub(crate) fn reset_live(&mut self) {
        self.0 = 0;
    }

    pub(crate) fn set_free_link(&mut self, next: Option<NonNull<CellHeader>>) {
        self.0 = match next {
            Some(cell) => {
                let addr = cell.as_ptr() as usize;
                debug_assert!(addr & (FREE | LIVE_MASK) == 0, "misaligned free-list link");
                addr | FREE
            }
            None => FREE,
        };
    }

    /// The next free cell, or `None` at the end of the list.
    pub(crate) fn free_link(&self) -> Option<NonNull<CellHeader>> {
        debug_assert!(self.is_free());
        NonNull::new((self.0 & !FREE) as *mut CellHeader)
    }

    /// A header must match exactly one of the two encodings: reserved bits
    /// all clear (live), or the FREE tag present (a link).
    pub(crate) fn debug_validate(&self) {
        debug_assert!(
            self.0 & !LIVE_MASK == 0 || self.0 & FREE != 0,
            "corrupt cell header {:#x}",
            self.0
        );
    }
}

/// Set the mark bit on the cell owning `obj`'s payload.
pub(crate) unsafe fn mark_cell(obj: CellPtr) {
    CellHeader::of_payload(obj).as_mut().set_marked();
}

pub(crate) unsafe fn cell_is_marked(obj: CellPtr) -> bool {
    CellHeader::of_payload(obj).as_ref().is_marked()
}

#[cfg(test)]
pub(crate) unsafe fn cell_is_free(obj: CellPtr) -> bool {
    CellHeader::of_payload(obj).as_ref().is_free()
}
