//! Heap statistics.
//!
//! Plain counters accumulated across the life of one heap instance. The
//! heap is thread-local and mutated through exclusive borrows, so no
//! atomics are involved; [`crate::Heap::stats`] hands out a snapshot.

use crate::collector::CollectResult;

/// Accumulated allocation and collection statistics.
#[derive(Debug, Default, Clone, Copy)]
pub struct GcStats {
    /// Total bytes allocated since the heap was created.
    pub bytes_allocated: u64,
    /// Total objects allocated since the heap was created.
    pub objects_allocated: u64,
    /// Collections run.
    pub collections: u64,
    /// Objects copied to to-space across all collections.
    pub objects_evacuated: u64,
    /// Finalizers run across all collections.
    pub objects_finalized: u64,
}

impl GcStats {
    /// Record one allocation of `size` bytes.
    #[inline]
    pub(crate) fn record_allocation(&mut self, size: usize) {
        self.bytes_allocated += size as u64;
        self.objects_allocated += 1;
    }

    /// Fold one collection's outcome into the totals.
    pub(crate) fn record_collection(&mut self, result: &CollectResult) {
        self.collections += 1;
        self.objects_evacuated += result.objects_evacuated as u64;
        self.objects_finalized += result.objects_finalized as u64;
    }
}
