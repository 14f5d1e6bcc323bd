//! Post-collection heap verification.
//!
//! A sanity pass over the new from-space, gated by
//! [`crate::GcConfig::verify_heap`]. It re-walks the half exactly the way
//! the collector does and checks the structural invariants a broken
//! `Trace` impl or collector bug would violate. Failures are hard panics:
//! a malformed heap is not recoverable.

use crate::heap::header::{HEADER_SIZE, SLOT_ALIGN};
use crate::heap::space::Space;
use rustc_hash::FxHashSet;

/// Walk one half-space and panic on any malformed header.
pub(crate) fn verify_space(space: &Space) {
    let mut seen: FxHashSet<usize> = FxHashSet::default();
    let mut offset = 0usize;

    while offset + HEADER_SIZE <= space.size() {
        assert!(
            offset % SLOT_ALIGN == 0,
            "heap walk reached unaligned offset {}",
            offset
        );
        assert!(
            seen.insert(offset),
            "heap walk revisited offset {}",
            offset
        );

        let header = unsafe { space.header_at(offset).as_ptr().read() };
        let info = match header.info {
            Some(info) => info,
            None => match header.forwardee {
                Some(next) => {
                    let target = space.offset_of(next);
                    assert!(
                        target > offset,
                        "skip record at offset {} points backwards to {}",
                        offset,
                        target
                    );
                    offset = target;
                    continue;
                }
                None => return,
            },
        };

        assert!(
            info.size >= HEADER_SIZE && info.size % SLOT_ALIGN == 0,
            "object at offset {} has malformed slot size {}",
            offset,
            info.size
        );
        // Right after a collection no object in the active half may carry
        // a forwarding pointer to another slot; only pin markers survive.
        if let Some(forwardee) = header.forwardee {
            assert!(
                forwardee == space.header_at(offset),
                "object at offset {} still carries a forwarding pointer",
                offset
            );
        }
        offset += info.size;
    }
}
