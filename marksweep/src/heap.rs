//! The heap: pool table, big-object list, allocation accounting and the
//! collection driver.
//!
//! All collector state lives in one `Heap` value owned by the runtime; the
//! mutator holds the only handle. Collection is stop-the-world on the
//! calling thread: `allocate` may run a full cycle before returning, and no
//! partial collector state is ever observable from outside.

use std::mem;
use std::process;

use crate::bigobject::BigList;
use crate::cellptr::CellPtr;
use crate::constants::{DEFAULT_COLLECT_INTERVAL, MAX_SMALL_SIZE, N_POOLS, SIZE_CLASSES};
use crate::memsource::{MemorySource, SysSource};
use crate::pool::Pool;
use crate::roots::RootSource;
use crate::sizeclass::size_class;
use crate::trace::{ObjectModel, Tracer};

/// Collector phase. The design is stop-the-world, so the mutator only ever
/// observes `Idle`.
#[derive(Debug, PartialEq)]
enum CollectorState {
    Idle,
    Collecting,
}

/// Counters from completed collection cycles.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Cycles run since the heap was created.
    pub collections: usize,
    /// Pool cells reclaimed by the most recent cycle.
    pub cells_freed: usize,
    /// Bytes reclaimed by the most recent cycle, pool cells and big blocks
    /// combined.
    pub bytes_reclaimed: usize,
    /// Pages returned to the memory source by the most recent cycle.
    pub pages_released: usize,
    /// Big objects released by the most recent cycle.
    pub big_released: usize,
}

/// A mark/sweep heap over a pluggable memory source.
pub struct Heap<S: MemorySource = SysSource> {
    pools: [Pool; N_POOLS],
    big: BigList,
    allocd_bytes: usize,
    collect_interval: usize,
    state: CollectorState,
    /// Mark-stack buffer, kept between cycles so its capacity is reused.
    mark_stack: Vec<CellPtr>,
    stats: GcStats,
    source: S,
}

impl Heap<SysSource> {
    /// A heap backed by the OS allocator, with the default 8 MiB trigger.
    pub fn new() -> Heap<SysSource> {
        Heap::with_source(SysSource)
    }

    /// A heap backed by the OS allocator with a custom trigger interval.
    pub fn with_interval(bytes: usize) -> Heap<SysSource> {
        let mut heap = Heap::new();
        heap.set_collect_interval(bytes);
        heap
    }
}

impl Default for Heap<SysSource> {
    fn default() -> Heap<SysSource> {
        Heap::new()
    }
}

impl<S: MemorySource> Heap<S> {
    /// A heap drawing its pages and big blocks from `source`.
    pub fn with_source(source: S) -> Heap<S> {
        Heap {
            pools: SIZE_CLASSES.map(Pool::new),
            big: BigList::new(),
            allocd_bytes: 0,
            collect_interval: DEFAULT_COLLECT_INTERVAL,
            state: CollectorState::Idle,
            mark_stack: Vec::new(),
            stats: GcStats::default(),
            source,
        }
    }

    pub fn set_collect_interval(&mut self, bytes: usize) {
        self.collect_interval = bytes;
    }

    pub fn collect_interval(&self) -> usize {
        self.collect_interval
    }

    /// Bytes allocated since the last completed collection.
    pub fn allocd_bytes(&self) -> usize {
        self.allocd_bytes
    }

    pub fn stats(&self) -> GcStats {
        self.stats
    }

    /// Return an uninitialized payload of at least `size` bytes whose header
    /// word is zeroed.
    ///
    /// May run a full collection first, so every pointer the caller intends
    /// to keep must be reachable from the runtime's roots before this call.
    pub fn allocate<R>(&mut self, size: usize, runtime: &R) -> CellPtr
    where
        R: ObjectModel + RootSource,
    {
        debug_assert!(size > 0, "zero-size allocation");

        // the trigger is tested before this request is accounted for
        if self.allocd_bytes > self.collect_interval {
            self.collect(runtime);
        }
        self.allocd_bytes += size;

        let result = if size > MAX_SMALL_SIZE {
            self.big.alloc(&mut self.source, size)
        } else {
            self.pools[size_class(size)].alloc(&mut self.source)
        };

        match result {
            Ok(payload) => payload,
            Err(_) => oom_abort(size),
        }
    }

    /// Run a full mark/sweep cycle: enumerate roots, trace to a fixpoint,
    /// sweep the big list and every pool, reset the allocation counter.
    pub fn collect<R>(&mut self, runtime: &R)
    where
        R: ObjectModel + RootSource,
    {
        debug_assert!(self.state == CollectorState::Idle, "re-entrant collection");
        self.state = CollectorState::Collecting;

        tracing::debug!(
            target: "marksweep::heap",
            allocd_bytes = self.allocd_bytes,
            "collection starting"
        );

        let mut tracer = Tracer::new(runtime, mem::take(&mut self.mark_stack));
        runtime.enumerate_roots(&mut tracer);
        tracer.drain();
        self.mark_stack = tracer.into_stack();

        // big objects first, then each pool; order among pools is immaterial
        let big_tally = self.big.sweep(&mut self.source);
        let mut cells_freed = 0;
        let mut pages_released = 0;
        let mut bytes_reclaimed = big_tally.bytes_freed;
        let mut live_cells = big_tally.live;
        let mut live_bytes = big_tally.bytes_live;
        for pool in self.pools.iter_mut() {
            let tally = pool.sweep(&mut self.source);
            cells_freed += tally.cells_freed;
            pages_released += tally.pages_released;
            bytes_reclaimed += tally.bytes_freed;
            live_cells += tally.cells_live;
            live_bytes += tally.bytes_live;
        }

        self.allocd_bytes = 0;
        self.stats = GcStats {
            collections: self.stats.collections + 1,
            cells_freed,
            bytes_reclaimed,
            pages_released,
            big_released: big_tally.released,
        };

        tracing::info!(
            target: "marksweep::heap",
            collections = self.stats.collections,
            cells_freed,
            bytes_reclaimed,
            pages_released,
            big_released = big_tally.released,
            live_cells,
            live_bytes,
            "collection complete"
        );

        self.state = CollectorState::Idle;
    }
}

impl<S: MemorySource> Drop for Heap<S> {
    fn drop(&mut self) {
        for pool in self.pools.iter_mut() {
            pool.release_all(&mut self.source);
        }
        self.big.release_all(&mut self.source);
    }
}

/// The memory source failing is not recoverable: report and abort without
/// touching any heap structure.
fn oom_abort(size: usize) -> ! {
    eprintln!("marksweep: out of memory allocating {} bytes", size);
    process::abort()
}

#[cfg(test)]
impl<S: MemorySource> Heap<S> {
    pub(crate) fn pool(&self, index: usize) -> &Pool {
        &self.pools[index]
    }

    pub(crate) fn big_len(&self) -> usize {
        self.big.len()
    }

    pub(crate) fn source(&self) -> &S {
        &self.source
    }
}
