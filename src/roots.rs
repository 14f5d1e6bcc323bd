//! The root registry: the collector's precise root set.
//!
//! Every off-heap handle owns one entry here for its whole lifetime.
//! Entries form a strict LIFO stack because handle lifetimes nest with
//! scopes; the discipline is cheap to maintain and makes the registry an
//! append-only array with O(1) registration and removal.

use crate::handle::RawRef;
use crate::heap::header::GcHeader;
use crate::type_info::TypeInfo;
use std::ptr::NonNull;

/// One registered root: the retargetable reference cell plus the
/// descriptor of the type it points at.
pub(crate) struct RootEntry {
    pub(crate) raw: RawRef,
    pub(crate) info: &'static TypeInfo,
}

/// Bounded LIFO stack of live roots.
pub(crate) struct RootRegistry {
    entries: Vec<RootEntry>,
    capacity: usize,
}

impl RootRegistry {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        RootRegistry {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Register a root, returning its index.
    pub(crate) fn push(
        &mut self,
        target: Option<NonNull<GcHeader>>,
        info: &'static TypeInfo,
    ) -> usize {
        assert!(
            self.entries.len() < self.capacity,
            "root registry overflow: more than {} live handles",
            self.capacity
        );
        self.entries.push(RootEntry {
            raw: RawRef::new(target),
            info,
        });
        self.entries.len() - 1
    }

    /// Remove the root at `index`, which must be the most recent one.
    pub(crate) fn pop(&mut self, index: usize) {
        debug_assert_eq!(
            index + 1,
            self.entries.len(),
            "root handles must be dropped in reverse order of creation"
        );
        self.entries.pop();
    }

    /// Current target of the root at `index`.
    #[inline]
    pub(crate) fn get(&self, index: usize) -> Option<NonNull<GcHeader>> {
        self.entries[index].raw.get()
    }

    /// All live entries, bottom of the stack first.
    #[inline]
    pub(crate) fn entries(&self) -> &[RootEntry] {
        &self.entries
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
