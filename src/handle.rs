//! Managed references: heap fields, stack roots, and pin guards.
//!
//! Two word-sized reference types split the roles the collector needs to
//! tell apart:
//!
//! - [`GcRef<T>`] lives **inside** managed objects. It does not keep its
//!   target alive by itself; the collector discovers it through the
//!   enclosing object's [`Trace`] impl and retargets it in place.
//! - [`GcHandle<T>`] lives **outside** the heap (on the stack, in locals,
//!   in collections owned by the embedder). It is a precise root: creating
//!   one registers it, dropping it deregisters it, and after a collection
//!   it observes the object's new address.
//!
//! [`Pinned<T>`] is the scoped view of an object's payload; while it
//! exists the object will not be moved by a collection.

use crate::heap::header::{GcHeader, Slot};
use crate::heap::Heap;
use crate::trace::{Trace, Tracer};
use crate::type_info::TypeInfo;
use crate::RefKind;
use std::cell::Cell;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

/// Type-erased managed reference cell.
///
/// This is the unit the collector actually updates: one nullable pointer to
/// an object header, mutable through a shared reference so that tracing can
/// retarget it in place. [`GcRef`] wraps it with a payload type, and every
/// root registry entry owns one.
#[derive(Clone, Debug, Default)]
pub struct RawRef {
    target: Cell<Option<NonNull<GcHeader>>>,
}

impl RawRef {
    pub(crate) const fn new(target: Option<NonNull<GcHeader>>) -> Self {
        RawRef {
            target: Cell::new(target),
        }
    }

    #[inline]
    pub(crate) fn get(&self) -> Option<NonNull<GcHeader>> {
        self.target.get()
    }

    #[inline]
    pub(crate) fn set(&self, target: Option<NonNull<GcHeader>>) {
        self.target.set(target);
    }
}

/// A managed reference embedded in a heap object.
///
/// `GcRef` does NOT keep its target alive and is only traced as part of
/// the object that contains it; an object is kept alive by being reachable
/// from a [`GcHandle`] chain. To hold an object across collection points
/// from outside the heap, use [`GcRef::load`] to obtain a handle.
///
/// Reads and writes go through [`GcRef::load`] and [`GcRef::store`]; the
/// cell is interior-mutable so fields can be updated through the shared
/// view a [`Pinned`] guard provides.
pub struct GcRef<T: Trace> {
    raw: RawRef,
    _marker: PhantomData<*const T>,
}

impl<T: Trace> GcRef<T> {
    /// Create an empty reference.
    pub const fn new() -> Self {
        GcRef {
            raw: RawRef::new(None),
            _marker: PhantomData,
        }
    }

    /// True if no target is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw.get().is_none()
    }

    /// Point this field at the handle's current target.
    pub fn store(&self, handle: &GcHandle<T>) {
        self.raw.set(handle.target());
    }

    /// Clear the field.
    pub fn clear(&self) {
        self.raw.set(None);
    }

    /// Root the current target and return a handle to it.
    ///
    /// Returns `None` when the field is empty. The returned handle
    /// participates in the usual LIFO root discipline.
    pub fn load(&self) -> Option<GcHandle<T>> {
        let target = self.raw.get()?;
        let index = Heap::with(|heap| heap.roots.push(Some(target), TypeInfo::of::<T>()));
        Some(GcHandle {
            index,
            _marker: PhantomData,
        })
    }

    /// The reference kind of this field.
    ///
    /// Always [`RefKind::Strong`]; the weak kind is reserved.
    #[inline]
    pub const fn kind(&self) -> RefKind {
        RefKind::Strong
    }
}

impl<T: Trace> Default for GcRef<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Trace> Clone for GcRef<T> {
    fn clone(&self) -> Self {
        GcRef {
            raw: self.raw.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Trace> std::fmt::Debug for GcRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.raw.get() {
            Some(target) => write!(f, "GcRef({:p})", target.as_ptr()),
            None => write!(f, "GcRef(empty)"),
        }
    }
}

/// Safety: reports its single reference cell, exactly once.
unsafe impl<T: Trace> Trace for GcRef<T> {
    fn trace(&self, tracer: &mut dyn Tracer) {
        tracer.trace_ref(&self.raw);
    }
}

/// A rooted handle to a managed object.
///
/// Creating a handle appends an entry to the current thread's root
/// registry; dropping it pops that entry. Handles must therefore be
/// dropped in reverse order of creation, which ordinary scope nesting
/// provides. Out-of-order drops are caught by a debug assertion.
///
/// The handle itself is a registry index, so it stays valid when moved;
/// the collector retargets the registry entry, not the handle.
///
/// Do not store handles inside managed payloads; use [`GcRef`] there.
/// A handle reached by the finalization pass would touch the registry
/// while the heap is mid-collection.
pub struct GcHandle<T: Trace> {
    index: usize,
    _marker: PhantomData<*const T>,
}

impl<T: Trace> GcHandle<T> {
    #[inline]
    pub(crate) fn from_index(index: usize) -> Self {
        GcHandle {
            index,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn target(&self) -> Option<NonNull<GcHeader>> {
        Heap::with(|heap| heap.roots.get(self.index))
    }

    /// True if the handle holds no object.
    pub fn is_empty(&self) -> bool {
        self.target().is_none()
    }

    /// Current address of the payload, or null for an empty handle.
    ///
    /// The address is invalidated by the next collection unless the object
    /// is pinned; it is exposed for diagnostics and tests.
    pub fn as_ptr(&self) -> *const T {
        match self.target() {
            Some(target) => Slot::value_ptr(target.cast::<Slot<T>>()) as *const T,
            None => std::ptr::null(),
        }
    }

    /// True if the object is currently pinned.
    pub fn is_pinned(&self) -> bool {
        match self.target() {
            Some(target) => unsafe { target.as_ref() }.is_pinned_at(target),
            None => false,
        }
    }

    /// Pin the object and return a scoped view of its payload.
    ///
    /// The object will not be moved while the guard exists; dropping the
    /// guard unpins it. Panics on an empty handle; pinning an object that
    /// is already pinned is a programming error caught by a debug
    /// assertion.
    pub fn pin(&self) -> Pinned<T> {
        Heap::with(|heap| {
            let target = self
                .target_in(heap)
                .expect("cannot pin an empty handle");
            heap.pin_header(target);
            Pinned {
                slot: target.cast::<Slot<T>>(),
                _marker: PhantomData,
            }
        })
    }

    /// Pin the object without a guard and return the raw payload pointer.
    ///
    /// The pointer stays valid until [`GcHandle::unscoped_unpin`] is
    /// called, across any number of collections. Panics on an empty
    /// handle.
    pub fn unscoped_pin(&self) -> *mut T {
        Heap::with(|heap| {
            let target = self
                .target_in(heap)
                .expect("cannot pin an empty handle");
            heap.pin_header(target);
            Slot::value_ptr(target.cast::<Slot<T>>())
        })
    }

    /// Release a pin taken with [`GcHandle::unscoped_pin`].
    ///
    /// Raw pointers obtained from the pin are invalid afterwards. The
    /// object's bytes are reclaimed by a later collection, not
    /// immediately.
    pub fn unscoped_unpin(&self) {
        Heap::with(|heap| {
            let target = self
                .target_in(heap)
                .expect("cannot unpin an empty handle");
            heap.unpin_header(target);
        });
    }

    #[inline]
    fn target_in(&self, heap: &Heap) -> Option<NonNull<GcHeader>> {
        heap.roots.get(self.index)
    }
}

impl<T: Trace> Clone for GcHandle<T> {
    /// Cloning registers a fresh root entry for the same target.
    fn clone(&self) -> Self {
        Heap::with(|heap| {
            let target = heap.roots.get(self.index);
            let index = heap.roots.push(target, TypeInfo::of::<T>());
            GcHandle {
                index,
                _marker: PhantomData,
            }
        })
    }
}

impl<T: Trace> Drop for GcHandle<T> {
    fn drop(&mut self) {
        // The heap may already be gone during thread teardown; a missing
        // registry has no entries left to pop.
        let _ = Heap::try_with(|heap| heap.roots.pop(self.index));
    }
}

impl<T: Trace> std::fmt::Debug for GcHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GcHandle({:p})", self.as_ptr())
    }
}

/// Scoped pin: a dereferenceable view of a managed payload.
///
/// While the guard exists the object is marked pinned and the collector
/// leaves it in place, so the borrow stays valid across collections
/// triggered by other allocations. Dropping the guard unpins.
pub struct Pinned<T: Trace> {
    slot: NonNull<Slot<T>>,
    _marker: PhantomData<*const T>,
}

impl<T: Trace> Deref for Pinned<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &self.slot.as_ref().value }
    }
}

impl<T: Trace> DerefMut for Pinned<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut self.slot.as_mut().value }
    }
}

impl<T: Trace> Drop for Pinned<T> {
    fn drop(&mut self) {
        let header = self.slot.cast::<GcHeader>();
        let _ = Heap::try_with(|heap| heap.unpin_header(header));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::CountingTracer;

    struct Leaf {
        _v: u64,
    }

    unsafe impl Trace for Leaf {
        fn trace(&self, _tracer: &mut dyn Tracer) {}
    }

    #[test]
    fn test_empty_ref() {
        let field: GcRef<Leaf> = GcRef::new();
        assert!(field.is_empty());
        assert!(field.load().is_none());
        assert_eq!(field.kind(), RefKind::Strong);
    }

    #[test]
    fn test_ref_reports_itself() {
        let field: GcRef<Leaf> = GcRef::new();
        let mut tracer = CountingTracer::new();
        field.trace(&mut tracer);
        assert_eq!(tracer.ref_count, 1);
    }

    #[test]
    fn test_ref_debug_formatting() {
        let field: GcRef<Leaf> = GcRef::new();
        assert_eq!(format!("{:?}", field), "GcRef(empty)");
    }
}
