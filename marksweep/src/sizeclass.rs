use crate::constants::MAX_SMALL_SIZE;

/// Map a payload size in bytes to its pool index.
///
/// Total over `1..=2048`; callers must route larger requests to the
/// big-object path before getting here. A flat decision tree rather than a
/// table scan keeps the hot path to a handful of compares.
pub fn size_class(size: usize) -> usize {
    debug_assert!(size >= 1 && size <= MAX_SMALL_SIZE, "size {} out of pool range", size);

    if size <= 8 {
        return 0;
    }
    if size <= 128 {
        if size <= 16 {
            return 1;
        }
        if size <= 32 {
            return if size <= 24 { 2 } else { 3 };
        }
        if size <= 64 {
            return if size <= 48 { 4 } else { 5 };
        }
        return if size <= 96 { 6 } else { 7 };
    }
    if size <= 512 {
        if size <= 256 {
            return if size <= 192 { 8 } else { 9 };
        }
        return if size <= 384 { 10 } else { 11 };
    }
    if size <= 1024 {
        return if size <= 768 { 12 } else { 13 };
    }
    if size <= 1536 {
        return 14;
    }
    15
}
