//! A moving, precise, semi-space garbage collector with object pinning
//! and finalization.
//!
//! # Architecture
//!
//! The heap is a fixed-size buffer split into two equal half-spaces:
//!
//! - **From-space**: the active half. New objects are bump-allocated here.
//! - **To-space**: reserved for the next collection. Live objects are
//!   evacuated into it, then the halves swap roles.
//!
//! ```text
//! ┌──────────────────────────────┬──────────────────────────────┐
//! │  FROM-SPACE                  │  TO-SPACE                    │
//! │  ┌────┬────┬────┬─────────┐  │  ┌────┬────┬──────────────┐  │
//! │  │ A  │ B  │ C  │  free   │  │  │ A' │ C' │    free      │  │
//! │  │live│dead│live│         │──▶  │copy│copy│              │  │
//! │  └────┴────┴────┴─────────┘  │  └────┴────┴──────────────┘  │
//! └──────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! Two extensions on top of the classical copying scheme:
//!
//! - **Pinning**: a [`Pinned`] guard (or [`GcHandle::unscoped_pin`]) marks an
//!   object immovable. Pinned objects stay at their address while the
//!   half-spaces rotate around them; the allocator steps over them using
//!   skip records rebuilt after every collection.
//! - **Finalization**: when an unpinned object is found unreachable during a
//!   collection, its payload is dropped in place. A type's `Drop` impl is
//!   its finalizer; types without drop glue skip the pass entirely.
//!
//! The root set is precise: every [`GcHandle`] owns an entry in a bounded
//! LIFO root registry, and references embedded in managed objects are
//! discovered through their [`Trace`] implementations. There is no stack
//! scanning and no conservatism.
//!
//! # Usage
//!
//! ```ignore
//! use semigc::{GcHandle, GcRef, Heap, Trace, Tracer};
//!
//! struct Node {
//!     next: GcRef<Node>,
//!     label: u32,
//! }
//!
//! unsafe impl Trace for Node {
//!     fn trace(&self, tracer: &mut dyn Tracer) {
//!         self.next.trace(tracer);
//!     }
//! }
//!
//! let a = Heap::allocate(Node { next: GcRef::new(), label: 1 })?;
//! let b = Heap::allocate(Node { next: GcRef::new(), label: 2 })?;
//! a.pin().next.store(&b);
//! drop(b);
//!
//! Heap::collect(); // b's object survives through a.next
//! ```
//!
//! # Safety
//!
//! The collector requires that:
//! - Every managed type implements [`Trace`] and reports all of its
//!   embedded [`GcRef`] fields.
//! - [`GcHandle`]s are dropped in reverse order of creation (scope nesting
//!   gives this for free).
//! - Finalizers (`Drop` impls of managed payloads) do not touch the heap.
//!
//! The heap is single-threaded and thread-local: each thread that touches
//! it gets its own independent instance, and none of the handle types can
//! cross threads.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod handle;
pub mod heap;
pub mod trace;

mod collector;
mod roots;
mod stats;
mod type_info;
mod verify;

// Re-exports for convenient access
pub use collector::CollectResult;
pub use config::{ConfigError, GcConfig};
pub use handle::{GcHandle, GcRef, Pinned, RawRef};
pub use heap::Heap;
pub use stats::GcStats;
pub use trace::{CountingTracer, Trace, Tracer};

use std::fmt;

/// Reference kind carried by a managed pointer.
///
/// Only strong references are implemented; the weak kind is reserved for
/// a future extension and currently has no semantics.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// While the reference is live, its target (if any) is kept alive and
    /// retargeted to the object's new address after every collection.
    Strong = 0,
    /// Reserved. No weak reference type exists yet.
    Weak = 1,
}

/// Errors surfaced by heap operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcError {
    /// The requested object does not fit in from-space, even after a
    /// collection was attempted.
    OutOfMemory,
}

impl fmt::Display for GcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GcError::OutOfMemory => write!(f, "out of memory: object does not fit in from-space"),
        }
    }
}

impl std::error::Error for GcError {}
