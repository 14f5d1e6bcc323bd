//! End-to-end collector scenarios driven through the public API.
//!
//! Every test runs on its own thread (the harness default), so each gets a
//! fresh thread-local heap; `Heap::configure` makes that explicit.

use semigc::{GcConfig, GcError, GcHandle, GcRef, Heap, Trace, Tracer};
use std::cell::Cell;

thread_local! {
    static DROPS: Cell<usize> = const { Cell::new(0) };
}

fn drops() -> usize {
    DROPS.with(|d| d.get())
}

fn reset_drops() {
    DROPS.with(|d| d.set(0));
}

/// Linked test node; its `Drop` impl counts finalizations.
struct Node {
    next: GcRef<Node>,
    label: u32,
}

impl Node {
    fn new(label: u32) -> Self {
        Node {
            next: GcRef::new(),
            label,
        }
    }
}

unsafe impl Trace for Node {
    fn trace(&self, tracer: &mut dyn Tracer) {
        self.next.trace(tracer);
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        DROPS.with(|d| d.set(d.get() + 1));
    }
}

/// Slot bytes charged for one `Node`, measured from the bump offset.
fn node_slot() -> usize {
    let before = Heap::used();
    let handle = Heap::allocate(Node::new(0)).unwrap();
    let slot = Heap::used() - before;
    drop(handle);
    slot
}

fn fresh_heap() {
    let _ = env_logger::builder().is_test(true).try_init();
    Heap::configure(GcConfig::default());
    reset_drops();
}

/// Drop a batch of handles in reverse creation order.
fn drop_all(mut handles: Vec<GcHandle<Node>>) {
    while let Some(handle) = handles.pop() {
        drop(handle);
    }
}

// =============================================================================
// Reachability and finalization
// =============================================================================

#[test]
fn linear_chain_survives_and_garbage_is_finalized() {
    fresh_heap();
    let slot = node_slot();
    Heap::collect();
    reset_drops();

    let a1 = Heap::allocate(Node::new(1)).unwrap();
    let a2 = Heap::allocate(Node::new(2)).unwrap();
    a1.pin().next.store(&a2);
    drop(a2);
    let _ = Heap::allocate(Node::new(3)).unwrap(); // unrooted garbage

    assert_eq!(Heap::used(), 3 * slot);

    let result = Heap::collect();
    assert_eq!(Heap::used(), 2 * slot);
    assert_eq!(result.objects_finalized, 1);
    assert_eq!(drops(), 1);

    // The chain is intact and retargeted to the new addresses.
    let a2 = a1.pin().next.load().expect("chain intact");
    assert_eq!(a2.pin().label, 2);
    assert!(Heap::in_from_space(a2.as_ptr()));
    drop(a2);
}

#[test]
fn unreachable_cycle_is_fully_finalized() {
    fresh_heap();

    {
        let c1 = Heap::allocate(Node::new(1)).unwrap();
        let c2 = Heap::allocate(Node::new(2)).unwrap();
        c1.pin().next.store(&c2);
        c2.pin().next.store(&c1);
    }

    Heap::collect();
    assert_eq!(drops(), 2);
    assert_eq!(Heap::used(), 0);
}

#[test]
fn self_cycle_is_finalized_once() {
    fresh_heap();

    {
        let c = Heap::allocate(Node::new(1)).unwrap();
        c.pin().next.store(&c);
    }

    Heap::collect();
    assert_eq!(drops(), 1);
    assert_eq!(Heap::used(), 0);
}

#[test]
fn rooted_cycle_survives_collection() {
    fresh_heap();

    let c1 = Heap::allocate(Node::new(1)).unwrap();
    let c2 = Heap::allocate(Node::new(2)).unwrap();
    c1.pin().next.store(&c2);
    c2.pin().next.store(&c1);
    drop(c2);

    Heap::collect();
    assert_eq!(drops(), 0);

    let c2 = c1.pin().next.load().unwrap();
    let back = c2.pin().next.load().unwrap();
    assert_eq!(back.as_ptr(), c1.as_ptr());
    drop(back);
    drop(c2);
}

/// Recursively collect the labels reachable from `handle`. Loading each
/// `next` field roots it on top of the registry, and the handle is released
/// again on the way back out, keeping the LIFO discipline intact.
fn chain_labels(handle: &GcHandle<Node>, labels: &mut Vec<u32>) {
    let view = handle.pin();
    labels.push(view.label);
    if let Some(next) = view.next.load() {
        chain_labels(&next, labels);
    }
}

#[test]
fn long_chain_survives_through_scan() {
    fresh_heap();

    // Build head -> 1 -> 2 -> ... -> 7, keeping every handle alive until
    // the links are in place, then release all but the head.
    let mut handles = vec![Heap::allocate(Node::new(0)).unwrap()];
    for label in 1..8 {
        let next = Heap::allocate(Node::new(label)).unwrap();
        handles.last().unwrap().pin().next.store(&next);
        handles.push(next);
    }
    while handles.len() > 1 {
        drop(handles.pop());
    }
    let head = handles.pop().unwrap();

    Heap::collect();
    assert_eq!(drops(), 0);

    let mut labels = Vec::new();
    chain_labels(&head, &mut labels);
    assert_eq!(labels, (0..8).collect::<Vec<_>>());
}

// =============================================================================
// Pinning
// =============================================================================

#[test]
fn pinned_object_survives_in_place() {
    fresh_heap();

    let p = Heap::allocate(Node::new(7)).unwrap();
    let raw = p.unscoped_pin();

    Heap::collect();

    // Unmoved, but the half-spaces have rotated around it.
    assert_eq!(p.as_ptr(), raw as *const Node);
    assert!(Heap::contains(raw as *const Node));
    assert!(!Heap::in_from_space(raw as *const Node));
    assert!(p.is_pinned());
    assert_eq!(unsafe { (*raw).label }, 7);

    p.unscoped_unpin();
}

#[test]
fn allocator_steps_around_pinned_survivor() {
    fresh_heap();

    let a = Heap::allocate(Node::new(1)).unwrap();
    let p = Heap::allocate(Node::new(2)).unwrap();
    let raw = p.unscoped_pin();

    // `a` moves to the other half; `p` stays put mid-space, so a skip
    // record must be chained to it.
    let result = Heap::collect();
    assert_eq!(result.pin_records, 1);
    assert_eq!(p.as_ptr(), raw as *const Node);
    assert!(!Heap::in_from_space(raw as *const Node));

    // Fill the active half so the next collection evacuates into the half
    // holding the pin; survivors must land around it.
    let b = Heap::allocate(Node::new(3)).unwrap();
    Heap::collect();

    assert_eq!(p.as_ptr(), raw as *const Node);
    assert!(Heap::in_from_space(raw as *const Node));
    assert_eq!(unsafe { (*raw).label }, 2);
    assert_eq!(a.pin().label, 1);
    assert_eq!(b.pin().label, 3);

    // Nothing was copied over the pinned slot.
    assert_ne!(a.as_ptr(), raw as *const Node);
    assert_ne!(b.as_ptr(), raw as *const Node);

    // Allocation keeps working in the half that contains the pin.
    let c = Heap::allocate(Node::new(4)).unwrap();
    assert_ne!(c.as_ptr(), raw as *const Node);
    assert_eq!(unsafe { (*raw).label }, 2);

    p.unscoped_unpin();
    drop(c);
    drop(b);
}

#[test]
fn chain_behind_pinned_object_survives() {
    fresh_heap();

    let p = Heap::allocate(Node::new(1)).unwrap();
    let q = Heap::allocate(Node::new(2)).unwrap();
    p.pin().next.store(&q);
    drop(q);

    // Pin p while it sits in from-space; q is reachable only through it.
    let raw = p.unscoped_pin();
    Heap::collect();

    assert_eq!(drops(), 0);
    let q = unsafe { (*raw).next.load() }.expect("reachable through the pin");
    assert_eq!(q.pin().label, 2);
    assert!(Heap::in_from_space(q.as_ptr()));
    assert_eq!(p.as_ptr(), raw as *const Node);

    drop(q);
    p.unscoped_unpin();
}

#[test]
fn scoped_pin_guard_unpins_on_drop() {
    fresh_heap();

    let p = Heap::allocate(Node::new(5)).unwrap();
    {
        let mut view = p.pin();
        assert!(p.is_pinned());
        assert_eq!(view.label, 5);
        view.label = 6;
    }
    assert!(!p.is_pinned());
    assert_eq!(p.pin().label, 6);
}

#[test]
fn unpinned_object_is_finalized_at_the_next_collection() {
    fresh_heap();

    let p = Heap::allocate(Node::new(9)).unwrap();
    let raw = p.unscoped_pin();

    // Two collections park the pin in the active half again.
    Heap::collect();
    assert!(!Heap::in_from_space(raw as *const Node));
    Heap::collect();
    assert!(Heap::in_from_space(raw as *const Node));

    p.unscoped_unpin();
    drop(p);
    assert_eq!(drops(), 0);

    let result = Heap::collect();
    assert_eq!(result.objects_finalized, 1);
    assert_eq!(drops(), 1);
    assert_eq!(Heap::used(), 0);

    // The next evacuation reuses the bytes the pin used to occupy.
    let q = Heap::allocate(Node::new(10)).unwrap();
    Heap::collect();
    assert_eq!(q.as_ptr(), raw as *const Node);
    assert_eq!(q.pin().label, 10);
}

// =============================================================================
// Allocation pressure and out-of-memory
// =============================================================================

#[test]
fn oom_preserves_heap_state() {
    fresh_heap();
    let slot = node_slot();
    Heap::collect();
    reset_drops();

    let per_half = GcConfig::default().heap_size / 2 / slot;
    let mut handles = Vec::new();
    for label in 0..per_half {
        handles.push(Heap::allocate(Node::new(label as u32)).unwrap());
    }
    assert_eq!(Heap::used(), per_half * slot);

    // Everything is rooted, so the triggered collection frees nothing.
    let err = Heap::allocate(Node::new(99)).unwrap_err();
    assert_eq!(err, GcError::OutOfMemory);
    assert_eq!(Heap::used(), per_half * slot);
    assert_eq!(Heap::root_count(), per_half);
    assert_eq!(drops(), 1); // only the failed allocation's argument

    // Payloads are untouched.
    for (label, handle) in handles.iter().enumerate() {
        assert_eq!(handle.pin().label as usize, label);
    }

    // Releasing roots makes the space reclaimable again.
    drop_all(handles);
    Heap::collect();
    assert_eq!(Heap::used(), 0);
    assert!(Heap::allocate(Node::new(0)).is_ok());
}

#[test]
fn oversized_allocation_fails_cleanly() {
    fresh_heap();

    struct Big {
        _payload: [u64; 100],
    }

    unsafe impl Trace for Big {
        fn trace(&self, _tracer: &mut dyn Tracer) {}
    }

    let err = Heap::allocate(Big { _payload: [0; 100] }).unwrap_err();
    assert_eq!(err, GcError::OutOfMemory);
    assert_eq!(Heap::used(), 0);
    assert_eq!(Heap::root_count(), 0);
}

#[test]
fn allocation_triggers_collection_under_pressure() {
    fresh_heap();
    let slot = node_slot();
    Heap::collect();
    reset_drops();

    // Keep one root live and churn garbage well past the half-space size.
    let keep = Heap::allocate(Node::new(1)).unwrap();
    let churn = 4 * (GcConfig::default().heap_size / 2) / slot;
    for label in 0..churn {
        let _ = Heap::allocate(Node::new(label as u32)).unwrap();
    }
    Heap::collect();

    assert_eq!(keep.pin().label, 1);
    assert_eq!(drops(), churn);
    assert!(Heap::stats().collections >= 4);
}

// =============================================================================
// Root registry discipline
// =============================================================================

#[test]
fn roots_are_registered_and_released_lifo() {
    fresh_heap();
    assert_eq!(Heap::root_count(), 0);

    let a = Heap::allocate(Node::new(1)).unwrap();
    assert_eq!(Heap::root_count(), 1);
    {
        let b = Heap::allocate(Node::new(2)).unwrap();
        let c = b.clone();
        assert_eq!(Heap::root_count(), 3);
        drop(c);
        drop(b);
    }
    assert_eq!(Heap::root_count(), 1);
    drop(a);
    assert_eq!(Heap::root_count(), 0);
}

#[test]
fn cloned_handle_tracks_the_same_object() {
    fresh_heap();

    let a = Heap::allocate(Node::new(4)).unwrap();
    let b = a.clone();
    Heap::collect();

    // Both roots were retargeted to the same new address.
    assert_eq!(a.as_ptr(), b.as_ptr());
    assert_eq!(b.pin().label, 4);
    drop(b);
}

// =============================================================================
// Statistics
// =============================================================================

#[test]
fn stats_accumulate_across_operations() {
    fresh_heap();

    let a = Heap::allocate(Node::new(1)).unwrap();
    let _ = Heap::allocate(Node::new(2)).unwrap();
    Heap::collect();

    let stats = Heap::stats();
    assert_eq!(stats.objects_allocated, 2);
    assert_eq!(stats.collections, 1);
    assert_eq!(stats.objects_evacuated, 1);
    assert_eq!(stats.objects_finalized, 1);
    assert!(stats.bytes_allocated > 0);
    drop(a);
}
