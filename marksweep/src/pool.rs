//! The segregated-fit pool allocator.
//!
//! A pool serves one cell size. It owns a singly linked list of pages and a
//! free list threaded through the header words of free cells. Allocation
//! pops the free-list head; sweep rebuilds the list from what survived
//! marking and hands entirely dead pages back to the memory source.

use std::ptr::NonNull;

use pagealloc::BlockError;

use crate::cellptr::CellPtr;
use crate::constants::{PAGE_SIZE, WORD};
use crate::header::CellHeader;
use crate::memsource::MemorySource;

/// A pool page: one OS block whose first word links to the next page, with
/// the remainder carved into equal cells.
#[repr(C)]
struct Page {
    next: Option<NonNull<Page>>,
}

/// An allocator for a single size class.
pub struct Pool {
    /// Cell size: the class payload plus the header word.
    osize: usize,
    pages: Option<NonNull<Page>>,
    freelist: Option<NonNull<CellHeader>>,
}

/// What one pool sweep reclaimed and what survived it.
#[derive(Default)]
pub(crate) struct SweepTally {
    /// Cells that were live going in and are free coming out.
    pub(crate) cells_freed: usize,
    /// Bytes those cells occupied, at the pool's cell size.
    pub(crate) bytes_freed: usize,
    /// Marked cells that survived.
    pub(crate) cells_live: usize,
    pub(crate) bytes_live: usize,
    pub(crate) pages_released: usize,
}

impl Pool {
    pub(crate) fn new(class_size: usize) -> Pool {
        Pool {
            osize: class_size + WORD,
            pages: None,
            freelist: None,
        }
    }

    /// Number of cells each page of this pool holds.
    pub(crate) fn cells_per_page(&self) -> usize {
        (PAGE_SIZE - WORD) / self.osize
    }

    /// Pop a cell off the free list, adding a page first when the list is
    /// empty. The returned payload is uninitialized; its header is zeroed.
    pub(crate) fn alloc<M: MemorySource>(&mut self, source: &mut M) -> Result<CellPtr, BlockError> {
        let mut head = match self.freelist {
            Some(head) => head,
            None => self.add_page(source)?,
        };

        let header = unsafe { head.as_mut() };
        self.freelist = header.free_link();
        header.reset_live();

        Ok(unsafe { CellHeader::payload(head) })
    }

    /// Acquire one page, link it into the page list, and thread all of its
    /// cells onto the free list in address order, in front of the prior
    /// list. Returns the new free-list head.
    fn add_page<M: MemorySource>(&mut self, source: &mut M) -> Result<NonNull<CellHeader>, BlockError> {
        let raw = source.page()?;
        let page = raw.cast::<Page>();

        unsafe { page.as_ptr().write(Page { next: self.pages }) };
        self.pages = Some(page);

        let base = raw.as_ptr() as usize;
        let last = base + PAGE_SIZE - self.osize;

        let mut addr = base + WORD;
        while addr <= last {
            let next_addr = addr + self.osize;
            let link = if next_addr <= last {
                Some(unsafe { NonNull::new_unchecked(next_addr as *mut CellHeader) })
            } else {
                // the page's last cell picks up the prior freelist
                self.freelist
            };
            unsafe { (addr as *mut CellHeader).write(CellHeader::free(link)) };
            addr = next_addr;
        }

        let first = unsafe { NonNull::new_unchecked((base + WORD) as *mut CellHeader) };
        self.freelist = Some(first);
        Ok(first)
    }

    /// Walk every page, rebuilding the free list: free cells and unmarked
    /// live cells are appended, marked cells survive with the bit cleared.
    /// A page with no surviving cell is released, discarding its appends.
    pub(crate) fn sweep<M: MemorySource>(&mut self, source: &mut M) -> SweepTally {
        let mut tally = SweepTally::default();

        let mut head: Option<NonNull<CellHeader>> = None;
        let mut tail: Option<NonNull<CellHeader>> = None;

        let mut current = self.pages;
        let mut prev_page: Option<NonNull<Page>> = None;

        while let Some(page) = current {
            let next_page = unsafe { page.as_ref().next };

            // tail position at page entry, for discarding this page's appends
            let entry_head = head;
            let entry_tail = tail;
            let mut any_live = false;

            let base = page.as_ptr() as usize;
            let last = base + PAGE_SIZE - self.osize;

            let mut addr = base + WORD;
            while addr <= last {
                let header = unsafe { &mut *(addr as *mut CellHeader) };
                header.debug_validate();

                if header.is_free() || !header.is_marked() {
                    if !header.is_free() {
                        tally.cells_freed += 1;
                        tally.bytes_freed += self.osize;
                    }
                    // append; the cell's own link stays terminated until a
                    // successor overwrites it
                    header.set_free_link(None);
                    let cell = unsafe { NonNull::new_unchecked(addr as *mut CellHeader) };
                    match tail {
                        Some(mut t) => unsafe { t.as_mut() }.set_free_link(Some(cell)),
                        None => head = Some(cell),
                    }
                    tail = Some(cell);
                } else {
                    header.clear_marked();
                    tally.cells_live += 1;
                    tally.bytes_live += self.osize;
                    any_live = true;
                }

                addr += self.osize;
            }

            if any_live {
                prev_page = Some(page);
            } else {
                // nothing survived: rewind the appends and give the page back
                head = entry_head;
                tail = entry_tail;
                if let Some(mut t) = tail {
                    unsafe { t.as_mut() }.set_free_link(None);
                }
                match prev_page {
                    Some(mut p) => unsafe { p.as_mut() }.next = next_page,
                    None => self.pages = next_page,
                }
                unsafe { source.release_page(page.cast()) };
                tally.pages_released += 1;
            }

            current = next_page;
        }

        self.freelist = head;
        tally
    }

    /// Hand every page back to the source. Used on heap teardown.
    pub(crate) fn release_all<M: MemorySource>(&mut self, source: &mut M) {
        let mut current = self.pages;
        while let Some(page) = current {
            let next = unsafe { page.as_ref().next };
            unsafe { source.release_page(page.cast()) };
            current = next;
        }
        self.pages = None;
        self.freelist = None;
    }
}

#[cfg(test)]
impl Pool {
    /// Free-list cell addresses, head first.
    pub(crate) fn freelist_cells(&self) -> Vec<usize> {
        let mut cells = Vec::new();
        let mut current = self.freelist;
        while let Some(cell) = current {
            cells.push(cell.as_ptr() as usize);
            current = unsafe { cell.as_ref().free_link() };
        }
        cells
    }

    pub(crate) fn page_count(&self) -> usize {
        let mut count = 0;
        let mut current = self.pages;
        while let Some(page) = current {
            count += 1;
            current = unsafe { page.as_ref().next };
        }
        count
    }

    /// Whether `addr` falls inside any page this pool owns.
    pub(crate) fn pages_contain(&self, addr: usize) -> bool {
        let mut current = self.pages;
        while let Some(page) = current {
            let base = page.as_ptr() as usize;
            if addr >= base + WORD && addr < base + PAGE_SIZE {
                return true;
            }
            current = unsafe { page.as_ref().next };
        }
        false
    }

    /// Count of non-free cells across all pages.
    pub(crate) fn live_cells(&self) -> usize {
        let mut count = 0;
        let mut current = self.pages;
        while let Some(page) = current {
            let base = page.as_ptr() as usize;
            let last = base + PAGE_SIZE - self.osize;
            let mut addr = base + WORD;
            while addr <= last {
                if !unsafe { &*(addr as *const CellHeader) }.is_free() {
                    count += 1;
                }
                addr += self.osize;
            }
            current = unsafe { page.as_ref().next };
        }
        count
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pages.is_none() && self.freelist.is_none()
    }
}
