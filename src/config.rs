//! Heap configuration parameters.
//!
//! The defaults are sized for tests and small embeddings; production users
//! raise `heap_size` to fit their working set.

use crate::heap::header::SLOT_ALIGN;

/// Configuration for the garbage-collected heap.
///
/// # Example
///
/// ```ignore
/// use semigc::{GcConfig, Heap};
///
/// Heap::configure(GcConfig {
///     heap_size: 64 * 1024,
///     ..Default::default()
/// });
/// ```
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Total heap size in bytes, split evenly into two half-spaces.
    ///
    /// Must be a multiple of twice the slot alignment so that each half
    /// starts and ends on a slot boundary.
    ///
    /// Default: 1024
    pub heap_size: usize,

    /// Maximum number of live root entries.
    ///
    /// Every off-heap handle occupies one entry for its lifetime; exceeding
    /// the bound is a programming error and panics.
    ///
    /// Default: 1024
    pub root_capacity: usize,

    /// Verify heap integrity after each collection.
    ///
    /// Walks the new from-space checking header well-formedness and that no
    /// slot is reachable twice. Cheap at test heap sizes, useful when
    /// debugging `Trace` implementations.
    ///
    /// Default: enabled in debug builds
    pub verify_heap: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            heap_size: 1024,
            root_capacity: 1024,
            verify_heap: cfg!(debug_assertions),
        }
    }
}

impl GcConfig {
    /// Create a configuration with the given total heap size.
    pub fn with_heap_size(heap_size: usize) -> Self {
        Self {
            heap_size,
            ..Default::default()
        }
    }

    /// The smallest valid configuration; tight enough that almost every
    /// allocation exercises a collection.
    pub fn tiny() -> Self {
        Self::with_heap_size(256)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heap_size < 8 * SLOT_ALIGN {
            return Err(ConfigError::HeapTooSmall);
        }
        if self.heap_size % (2 * SLOT_ALIGN) != 0 {
            return Err(ConfigError::HeapUnaligned);
        }
        if self.root_capacity == 0 {
            return Err(ConfigError::NoRootCapacity);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Heap size is too small to hold even a handful of slots.
    HeapTooSmall,
    /// Heap size is not a multiple of twice the slot alignment.
    HeapUnaligned,
    /// Root capacity must be at least 1.
    NoRootCapacity,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::HeapTooSmall => {
                write!(f, "heap size must be at least {} bytes", 8 * SLOT_ALIGN)
            }
            ConfigError::HeapUnaligned => {
                write!(
                    f,
                    "heap size must be a multiple of {} bytes",
                    2 * SLOT_ALIGN
                )
            }
            ConfigError::NoRootCapacity => write!(f, "root capacity must be at least 1"),
        }
    }
}

impl std::error::Error for ConfigError {}
