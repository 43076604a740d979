use std::mem::size_of;

/// Size in bytes of one heap page. Pages are acquired from the OS aligned to
/// this size and carved into equal cells.
pub const PAGE_SIZE: usize = 16384;

/// One machine word. The cell header, the page link and the big-object link
/// are each this wide.
pub const WORD: usize = size_of::<usize>();

/// Number of small-object pools.
pub const N_POOLS: usize = 16;

/// Payload size classes in bytes, one pool each. A pool's cell size is its
/// class plus the header word.
pub const SIZE_CLASSES: [usize; N_POOLS] = [
    8, 16, 24, 32, 48, 64, 96, 128, 192, 256, 384, 512, 768, 1024, 1536, 2048,
];

/// Largest payload the pools serve; anything bigger takes the big-object path.
pub const MAX_SMALL_SIZE: usize = 2048;

/// Cumulative allocation, in bytes, above which the next `allocate` call
/// runs a collection first.
pub const DEFAULT_COLLECT_INTERVAL: usize = 8192 * 1024;
