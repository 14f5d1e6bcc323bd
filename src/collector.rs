//! The copying collector: evacuation, scan, finalization, pin rebuild.
//!
//! A collection runs four phases:
//!
//! 1. **Seed**: reset the to-space cursor, then evacuate everything the
//!    root registry reaches. Pinned objects count as roots too: they stay
//!    put wherever they are, but what they reference must survive.
//! 2. **Scan**: walk to-space in allocation order, tracing each copied
//!    object's fields and evacuating whatever they reach. New copies
//!    extend the scan region until the scan cursor catches the allocation
//!    cursor.
//! 3. **Finalize and rebuild**: walk from-space; drop every unreached,
//!    unpinned payload in place, and chain skip records between the
//!    pinned survivors so the next evacuation into this half steps around
//!    them.
//! 4. **Swap**: exchange the space roles. Survivors are compact at the
//!    base of the new from-space; pinned objects keep their addresses in
//!    whichever half they occupy.

use crate::handle::RawRef;
use crate::heap::header::{GcHeader, HEADER_SIZE};
use crate::heap::space::Space;
use crate::heap::Heap;
use crate::trace::Tracer;
use log::debug;
use std::ptr::NonNull;

/// Outcome of one collection.
#[derive(Debug, Default, Clone, Copy)]
pub struct CollectResult {
    /// Bytes occupied by survivors in the new from-space.
    pub live_bytes: usize,
    /// Bytes reclaimed relative to the pre-collection occupancy.
    pub bytes_freed: usize,
    /// Objects copied into to-space.
    pub objects_evacuated: usize,
    /// Finalizers run for unreached objects.
    pub objects_finalized: usize,
    /// Skip records chained between pinned survivors.
    pub pin_records: usize,
}

/// Run a full collection. Non-throwing: unrecoverable states (to-space
/// exhausted by pinning) abort via panic.
pub(crate) fn collect(heap: &mut Heap) -> CollectResult {
    let used_before = heap.from.used();
    heap.to.reset();

    let objects_evacuated;
    {
        let Heap {
            ref from,
            ref mut to,
            ref roots,
            ..
        } = *heap;
        let mut tracer = EvacuationTracer {
            from,
            to,
            evacuated: 0,
        };

        // Phase 1: seed from the registry, then from pinned objects in
        // both halves. A chain reachable only through a pinned object must
        // survive no matter which half the pin currently sits in.
        for entry in roots.entries() {
            if let Some(target) = entry.raw.get() {
                debug_assert_eq!(
                    unsafe { target.as_ref() }
                        .info
                        .map(|info| info.size),
                    Some(entry.info.size),
                    "root entry descriptor does not match its target"
                );
            }
            tracer.trace_ref(&entry.raw);
        }

        let from_base = tracer.from.base();
        let from_size = tracer.from.size();
        visit_pinned(from_base, from_size, &mut tracer);
        let to_base = tracer.to.base();
        let to_size = tracer.to.size();
        visit_pinned(to_base, to_size, &mut tracer);

        // Phase 2: Cheney scan of to-space. A record left in free bytes
        // jumps the cursor onto the pinned object it targets; visiting a
        // pinned object twice is harmless because evacuation is keyed on
        // the forwardee.
        let mut scan = 0usize;
        while scan < tracer.to.used() {
            let header_nn = tracer.to.header_at(scan);
            let header = unsafe { header_nn.as_ptr().read() };
            match header.info {
                None => {
                    let next = header
                        .forwardee
                        .expect("scan reached the end-of-space sentinel below the cursor");
                    scan = tracer.to.offset_of(next);
                }
                Some(info) => {
                    unsafe { (info.visit)(header_nn, &mut tracer) };
                    scan += info.size;
                }
            }
        }

        objects_evacuated = tracer.evacuated;
    }

    // Phase 3: finalize the unreached and rebuild the pin-skip chain in
    // what is about to become the next evacuation target.
    let (objects_finalized, pin_records) = finalize_and_rebuild(&heap.from);

    // Phase 4: swap roles. The new from-space cursor already sits at the
    // end of the survivors.
    std::mem::swap(&mut heap.from, &mut heap.to);

    let live_bytes = heap.from.used();
    let result = CollectResult {
        live_bytes,
        bytes_freed: used_before.saturating_sub(live_bytes),
        objects_evacuated,
        objects_finalized,
        pin_records,
    };
    debug!(
        "collect: {} bytes live, {} freed, {} evacuated, {} finalized, {} pin records",
        result.live_bytes,
        result.bytes_freed,
        result.objects_evacuated,
        result.objects_finalized,
        result.pin_records
    );
    result
}

/// Evacuating tracer: retargets every visited reference cell, copying its
/// target out of from-space on first contact.
struct EvacuationTracer<'a> {
    from: &'a Space,
    to: &'a mut Space,
    evacuated: usize,
}

impl Tracer for EvacuationTracer<'_> {
    fn trace_ref(&mut self, slot: &RawRef) {
        let target = match slot.get() {
            Some(target) => target,
            None => return,
        };
        if !self.from.contains(target.as_ptr() as *const u8) {
            // Pinned survivors parked in the to-space half, and anything
            // else outside from-space, stay where they are.
            return;
        }
        debug_assert!(
            unsafe { target.as_ref() }.info.is_some(),
            "managed reference points at a non-object"
        );
        let new_target = match unsafe { target.as_ref() }.forwardee {
            // Already copied, or pinned in place (forwarding to itself).
            Some(forwardee) => forwardee,
            None => self.evacuate(target),
        };
        slot.set(Some(new_target));
    }
}

impl EvacuationTracer<'_> {
    /// Copy one object into to-space and record the forwarding pointer.
    fn evacuate(&mut self, src: NonNull<GcHeader>) -> NonNull<GcHeader> {
        let info = unsafe { src.as_ref() }
            .info
            .expect("evacuation source must be a live object");

        // Collection itself must not fail; running out of to-space here
        // means pinning has fragmented the heap beyond recovery.
        let saved = match self.to.advance(info.size) {
            Ok(saved) => saved,
            Err(_) => panic!("to-space exhausted while evacuating a survivor"),
        };

        let dst = self.to.header_at(self.to.used());
        unsafe {
            (info.relocate)(src, dst);
            dst.as_ptr().write(GcHeader::live(info));
            (*src.as_ptr()).forwardee = Some(dst);
        }
        self.to.bump(info.size);

        // Keep the record chain intact past the fresh copy.
        if self.to.used() + HEADER_SIZE <= self.to.size() {
            unsafe { self.to.header_at(self.to.used()).as_ptr().write(saved) };
        }

        self.evacuated += 1;
        dst
    }
}

/// Visit the fields of every pinned object in the half-space starting at
/// `base`, following the record chain through its free region.
fn visit_pinned(base: NonNull<u8>, size: usize, tracer: &mut EvacuationTracer<'_>) {
    let base = base.as_ptr();
    let mut offset = 0usize;
    while offset + HEADER_SIZE <= size {
        let header_ptr = unsafe { base.add(offset) } as *mut GcHeader;
        let header = unsafe { header_ptr.read() };
        let info = match header.info {
            Some(info) => info,
            None => match header.forwardee {
                Some(next) => {
                    offset = next.as_ptr() as usize - base as usize;
                    continue;
                }
                None => break,
            },
        };
        if header.forwardee.map(NonNull::as_ptr) == Some(header_ptr) {
            let header_nn = unsafe { NonNull::new_unchecked(header_ptr) };
            unsafe { (info.visit)(header_nn, tracer) };
        }
        offset += info.size;
    }
}

/// Phase 3 walk of from-space: finalize unreached objects and rebuild the
/// skip-record chain between pinned survivors. Returns the finalizer and
/// record counts.
fn finalize_and_rebuild(from: &Space) -> (usize, usize) {
    let base = from.base().as_ptr();
    let size = from.size();
    let mut objects_finalized = 0;
    let mut pin_records = 0;

    // Offset at which the next skip record would be written; starts at the
    // base and trails from one pinned object's end to the next.
    let mut record_slot = 0usize;

    let mut offset = 0usize;
    while offset + HEADER_SIZE <= size {
        let header_ptr = unsafe { base.add(offset) } as *mut GcHeader;
        let header = unsafe { header_ptr.read() };
        let info = match header.info {
            Some(info) => info,
            None => match header.forwardee {
                Some(next) => {
                    // No live objects up to the next pinned survivor. It
                    // may have been unpinned since the record was written,
                    // so it is re-examined rather than trusted.
                    offset = next.as_ptr() as usize - base as usize;
                    continue;
                }
                None => break,
            },
        };

        let slot_size = info.size;
        match header.forwardee {
            None => {
                // Not evacuated and not pinned: unreachable.
                if let Some(finalize) = info.finalize {
                    unsafe { finalize(NonNull::new_unchecked(header_ptr)) };
                    objects_finalized += 1;
                }
            }
            Some(forwardee) if forwardee.as_ptr() == header_ptr => {
                // Pinned survivor. Chain a record to it unless it sits
                // exactly at the record slot (base of space or flush
                // against the previous pinned object).
                if record_slot != offset {
                    let record = GcHeader::skip_to(unsafe { NonNull::new_unchecked(header_ptr) });
                    unsafe { (base.add(record_slot) as *mut GcHeader).write(record) };
                    pin_records += 1;
                }
                record_slot = offset + slot_size;
            }
            Some(_) => {
                // Evacuated; the copy lives on in to-space.
            }
        }
        offset += slot_size;
    }

    // Terminate the chain. When not even a header fits, the next
    // allocation into this half must collect first, so nothing reads past
    // this point.
    if record_slot + HEADER_SIZE <= size {
        unsafe { (base.add(record_slot) as *mut GcHeader).write(GcHeader::SENTINEL) };
    }

    (objects_finalized, pin_records)
}
