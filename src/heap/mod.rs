//! Heap memory management.
//!
//! One `Heap` owns both half-spaces, the root registry, and the
//! statistics. Each thread has its own instance behind a thread-local
//! cell; all public operations are associated functions so user code
//! never holds the cell's borrow across an operation.

pub(crate) mod header;
pub(crate) mod space;

use crate::collector::{self, CollectResult};
use crate::config::GcConfig;
use crate::handle::GcHandle;
use crate::heap::header::{GcHeader, Slot, HEADER_SIZE};
use crate::heap::space::Space;
use crate::roots::RootRegistry;
use crate::stats::GcStats;
use crate::trace::Trace;
use crate::type_info::TypeInfo;
use crate::verify;
use crate::GcError;

use log::debug;
use std::cell::RefCell;
use std::ptr::NonNull;

thread_local! {
    static HEAP: RefCell<Heap> = RefCell::new(Heap::new(GcConfig::default()));
}

/// The garbage-collected heap.
///
/// There is one instance per thread, created on first use with the default
/// configuration; [`Heap::configure`] installs a fresh instance with
/// different parameters. All operations go through associated functions:
///
/// ```ignore
/// use semigc::{GcConfig, Heap};
///
/// Heap::configure(GcConfig::with_heap_size(4096));
/// let handle = Heap::allocate(42u64)?;
/// Heap::collect();
/// ```
pub struct Heap {
    pub(crate) config: GcConfig,
    pub(crate) from: Space,
    pub(crate) to: Space,
    pub(crate) roots: RootRegistry,
    pub(crate) stats: GcStats,
}

impl Heap {
    fn new(config: GcConfig) -> Self {
        config.validate().expect("invalid heap configuration");
        let semi = config.heap_size / 2;
        Heap {
            from: Space::new(semi),
            to: Space::new(semi),
            roots: RootRegistry::with_capacity(config.root_capacity),
            stats: GcStats::default(),
            config,
        }
    }

    /// Run `f` against the current thread's heap.
    pub(crate) fn with<R>(f: impl FnOnce(&mut Heap) -> R) -> R {
        HEAP.with(|heap| f(&mut heap.borrow_mut()))
    }

    /// Like [`Heap::with`], but a no-op when the thread-local heap has
    /// already been torn down (drops running during thread exit).
    pub(crate) fn try_with<R>(f: impl FnOnce(&mut Heap) -> R) -> Option<R> {
        HEAP.try_with(|heap| f(&mut heap.borrow_mut())).ok()
    }

    // =========================================================================
    // Public operations
    // =========================================================================

    /// Replace this thread's heap with a freshly configured instance.
    ///
    /// The old heap is torn down (finalizing all remaining objects).
    /// Panics if any root handle is still live, or if the configuration is
    /// invalid.
    pub fn configure(config: GcConfig) {
        Self::with(|heap| {
            assert!(
                heap.roots.is_empty(),
                "cannot reconfigure the heap while root handles are live"
            );
            *heap = Heap::new(config);
        });
    }

    /// Allocate a managed object and return a rooted handle to it.
    ///
    /// If from-space cannot fit the object, one collection is attempted;
    /// [`GcError::OutOfMemory`] is returned if the object still does not
    /// fit. On failure the heap state is untouched apart from that
    /// collection.
    pub fn allocate<T: Trace>(value: T) -> Result<GcHandle<T>, GcError> {
        Self::with(|heap| heap.allocate_in(value))
    }

    /// Force a full collection.
    pub fn collect() -> CollectResult {
        Self::with(|heap| heap.collect_now())
    }

    /// Bytes currently occupied in from-space (the bump-pointer offset).
    ///
    /// Pinned survivors parked beyond the cursor are not included; their
    /// bytes are accounted for again once the cursor passes them.
    pub fn used() -> usize {
        Self::with(|heap| heap.from.used())
    }

    /// True if the pointer falls anywhere inside the heap buffer.
    pub fn contains<T>(ptr: *const T) -> bool {
        Self::with(|heap| {
            heap.from.contains(ptr as *const u8) || heap.to.contains(ptr as *const u8)
        })
    }

    /// True if the pointer falls inside the currently active from-space.
    pub fn in_from_space<T>(ptr: *const T) -> bool {
        Self::with(|heap| heap.from.contains(ptr as *const u8))
    }

    /// Number of live root entries.
    pub fn root_count() -> usize {
        Self::with(|heap| heap.roots.len())
    }

    /// Snapshot of the accumulated statistics.
    pub fn stats() -> GcStats {
        Self::with(|heap| heap.stats)
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    fn allocate_in<T: Trace>(&mut self, value: T) -> Result<GcHandle<T>, GcError> {
        let info = TypeInfo::of::<T>();
        let saved = self.advance_from(info.size)?;

        let header = self.from.header_at(self.from.used());
        let slot = header.cast::<Slot<T>>();
        unsafe {
            Slot::value_ptr(slot).write(value);
            header.as_ptr().write(GcHeader::live(info));
        }
        self.from.bump(info.size);

        // Re-write the overwritten record past the new object so the chain
        // stays intact for the next allocation. When not even a header
        // fits, nothing is written: the next allocation cannot pass the
        // size check and will collect first.
        if self.from.used() + HEADER_SIZE <= self.from.size() {
            unsafe { self.from.header_at(self.from.used()).as_ptr().write(saved) };
        }

        self.stats.record_allocation(info.size);
        let index = self.roots.push(Some(header), info);
        Ok(GcHandle::from_index(index))
    }

    /// Position the from-space cursor for `request` bytes, collecting once
    /// if needed.
    fn advance_from(&mut self, request: usize) -> Result<GcHeader, GcError> {
        match self.from.advance(request) {
            Ok(saved) => Ok(saved),
            Err(_) => {
                debug!(
                    "from-space exhausted ({} bytes requested, {} used); collecting",
                    request,
                    self.from.used()
                );
                self.collect_now();
                // Retry against the post-swap from-space.
                self.from.advance(request)
            }
        }
    }

    // =========================================================================
    // Collection
    // =========================================================================

    pub(crate) fn collect_now(&mut self) -> CollectResult {
        let result = collector::collect(self);
        self.stats.record_collection(&result);
        if self.config.verify_heap {
            verify::verify_space(&self.from);
        }
        result
    }

    // =========================================================================
    // Pinning
    // =========================================================================

    /// Mark the object headed by `header` immovable.
    ///
    /// No record needs to be written here: either the object still sits in
    /// the normal allocation flow, or the rebuild pass of the previous
    /// collection already chained a skip record to it.
    pub(crate) fn pin_header(&mut self, header: NonNull<GcHeader>) {
        let current = unsafe { header.as_ptr().read() };
        debug_assert!(current.info.is_some(), "pin target must be a live object");
        debug_assert!(
            current.forwardee.is_none(),
            "object is already pinned or forwarded"
        );
        unsafe { (*header.as_ptr()).forwardee = Some(header) };
    }

    /// Clear the pin marker. The object's bytes are reclaimed by a later
    /// collection, not immediately.
    pub(crate) fn unpin_header(&mut self, header: NonNull<GcHeader>) {
        let current = unsafe { header.as_ptr().read() };
        debug_assert!(
            current.is_pinned_at(header),
            "unpin target is not a pinned object"
        );
        unsafe { (*header.as_ptr()).forwardee = None };
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Finalize every remaining unpinned, unforwarded object in both
    /// halves. Runs on drop; the root registry must be empty by then.
    fn finalize_all(&mut self) {
        debug_assert!(
            self.roots.is_empty(),
            "heap torn down while root handles are live"
        );
        Self::finalize_space(&self.from);
        Self::finalize_space(&self.to);
    }

    fn finalize_space(space: &Space) {
        let mut offset = 0;
        while offset + HEADER_SIZE <= space.size() {
            let header_nn = space.header_at(offset);
            let header = unsafe { header_nn.as_ptr().read() };
            let info = match header.info {
                Some(info) => info,
                None => match header.forwardee {
                    Some(next) => {
                        offset = space.offset_of(next);
                        continue;
                    }
                    None => break,
                },
            };
            if header.forwardee.is_none() {
                if let Some(finalize) = info.finalize {
                    unsafe { finalize(header_nn) };
                }
            }
            offset += info.size;
        }
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        self.finalize_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::Tracer;

    struct Value {
        v: u64,
    }

    unsafe impl Trace for Value {
        fn trace(&self, _tracer: &mut dyn Tracer) {}
    }

    #[test]
    fn test_allocate_and_read_back() {
        Heap::configure(GcConfig::default());
        let handle = Heap::allocate(Value { v: 7 }).expect("fits");
        assert_eq!(Heap::used(), std::mem::size_of::<Slot<Value>>());
        assert_eq!(handle.pin().v, 7);
    }

    #[test]
    fn test_used_tracks_bump_offset() {
        Heap::configure(GcConfig::default());
        assert_eq!(Heap::used(), 0);
        let slot = std::mem::size_of::<Slot<Value>>();

        let _a = Heap::allocate(Value { v: 1 }).unwrap();
        assert_eq!(Heap::used(), slot);
        let _b = Heap::allocate(Value { v: 2 }).unwrap();
        assert_eq!(Heap::used(), 2 * slot);
    }

    #[test]
    fn test_collect_on_empty_heap() {
        Heap::configure(GcConfig::default());
        let result = Heap::collect();
        assert_eq!(result.live_bytes, 0);
        assert_eq!(result.objects_finalized, 0);
        assert_eq!(Heap::used(), 0);
    }

    #[test]
    fn test_handle_addresses_live_in_heap() {
        Heap::configure(GcConfig::default());
        let handle = Heap::allocate(Value { v: 3 }).unwrap();
        let ptr = handle.as_ptr();
        assert!(Heap::contains(ptr));
        assert!(Heap::in_from_space(ptr));
    }
}
