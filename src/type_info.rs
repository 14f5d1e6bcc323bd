//! Per-type descriptors driving evacuation, scanning, and finalization.
//!
//! A `TypeInfo` is the collector's view of one managed payload type: how
//! many bytes its slot occupies, how to enumerate its embedded references,
//! how to move it, and how to finalize it. Descriptors are built at compile
//! time from a type's [`Trace`] impl, so there is no registration step.

use crate::heap::header::{GcHeader, Slot, SLOT_ALIGN};
use crate::trace::{Trace, Tracer};
use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;

/// Immutable descriptor for one managed type.
pub(crate) struct TypeInfo {
    /// Total slot bytes: header, payload, and alignment padding.
    pub(crate) size: usize,
    /// Enumerate the payload's managed references.
    pub(crate) visit: unsafe fn(NonNull<GcHeader>, &mut dyn Tracer),
    /// Move the payload of `src` into the uninitialized slot `dst`.
    pub(crate) relocate: unsafe fn(NonNull<GcHeader>, NonNull<GcHeader>),
    /// Drop the payload in place. Absent when the type has no drop glue,
    /// which lets the finalization pass skip it entirely.
    pub(crate) finalize: Option<unsafe fn(NonNull<GcHeader>)>,
}

impl TypeInfo {
    /// Descriptor for `T`, shared by every object of that type.
    pub(crate) fn of<T: Trace>() -> &'static TypeInfo {
        struct Shim<T>(PhantomData<T>);

        impl<T: Trace> Shim<T> {
            const INFO: TypeInfo = TypeInfo {
                size: {
                    assert!(
                        mem::align_of::<T>() <= SLOT_ALIGN,
                        "managed payloads must not exceed the slot alignment"
                    );
                    mem::size_of::<Slot<T>>()
                },
                visit: visit_slot::<T>,
                relocate: relocate_slot::<T>,
                finalize: if mem::needs_drop::<T>() {
                    Some(finalize_slot::<T>)
                } else {
                    None
                },
            };
        }

        &Shim::<T>::INFO
    }
}

/// Run the payload's `Trace` impl against the given tracer.
///
/// Safety: `header` must be the header of a live `Slot<T>`.
unsafe fn visit_slot<T: Trace>(header: NonNull<GcHeader>, tracer: &mut dyn Tracer) {
    let slot = header.cast::<Slot<T>>();
    (*slot.as_ptr()).value.trace(tracer);
}

/// Move one payload between slots, leaving the source moved-from.
///
/// Safety: `src` must head a live `Slot<T>`; `dst` must head writable
/// uninitialized slot memory of the same size.
unsafe fn relocate_slot<T: Trace>(src: NonNull<GcHeader>, dst: NonNull<GcHeader>) {
    let src = Slot::value_ptr(src.cast::<Slot<T>>());
    let dst = Slot::value_ptr(dst.cast::<Slot<T>>());
    T::relocate(src, dst);
}

/// Drop the payload in place.
///
/// Safety: `header` must head a live `Slot<T>` whose payload has not been
/// moved out or dropped.
unsafe fn finalize_slot<T: Trace>(header: NonNull<GcHeader>) {
    let slot = header.cast::<Slot<T>>();
    std::ptr::drop_in_place(Slot::value_ptr(slot));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::GcRef;
    use crate::heap::header::HEADER_SIZE;

    struct Plain {
        _a: u64,
        _b: u64,
    }

    unsafe impl Trace for Plain {
        fn trace(&self, _tracer: &mut dyn Tracer) {}
    }

    struct Linked {
        _next: GcRef<Linked>,
        _name: String,
    }

    unsafe impl Trace for Linked {
        fn trace(&self, tracer: &mut dyn Tracer) {
            self._next.trace(tracer);
        }
    }

    #[test]
    fn test_sizes_cover_header_and_padding() {
        let info = TypeInfo::of::<Plain>();
        assert!(info.size >= HEADER_SIZE + mem::size_of::<Plain>());
        assert_eq!(info.size % SLOT_ALIGN, 0);

        let unit = TypeInfo::of::<()>();
        assert_eq!(unit.size, mem::size_of::<Slot<()>>());
    }

    #[test]
    fn test_finalizer_tracks_drop_glue() {
        // Plain integers have no drop glue, so no finalizer is recorded.
        assert!(TypeInfo::of::<Plain>().finalize.is_none());
        // A String payload must be dropped to release its buffer.
        assert!(TypeInfo::of::<Linked>().finalize.is_some());
    }
}
