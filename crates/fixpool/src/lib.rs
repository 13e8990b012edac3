//! # fixpool
//!
//! Fixed-chunk memory pools with a process-global size-class allocator.
//!
//! This crate provides:
//! - [`FixedPool`] - an untyped pool serving same-sized chunks out of
//!   contiguous backing blocks, with an intrusive free list threaded
//!   through the unused chunks (O(1) alloc/release, no system calls on the
//!   common path)
//! - [`TypedPool`] - in-place construction and destruction of values on
//!   top of the untyped pool
//! - [`PoolAllocator`] - a typed, reference-counted handle to a lazily
//!   created process-global allocator that segregates requests into
//!   power-of-two size classes
//! - [`PoolReporter`] - an optional diagnostics sink for block/chunk
//!   traffic, lifecycle transitions and leak dumps
//!
//! ## Quick start
//!
//! ```
//! use fixpool::TypedPool;
//!
//! let mut pool = TypedPool::<u64>::new(4096, 8)?;
//!
//! let value = pool.alloc(7)?;
//! assert_eq!(unsafe { *value.as_ref() }, 7);
//!
//! let mut slot = Some(value);
//! unsafe { pool.release(&mut slot)? };
//! assert!(slot.is_none());
//! # Ok::<(), fixpool::PoolError>(())
//! ```
//!
//! ## Features
//!
//! - `logging`: route pool, allocator and leak diagnostics through
//!   `tracing` (installs a [`reporter::TracingReporter`] on the global
//!   allocator's pools)
//!
//! ## Concurrency
//!
//! A bare [`FixedPool`] / [`TypedPool`] is not thread-safe; it takes
//! `&mut self` on every mutation. The global allocator behind
//! [`PoolAllocator`] serializes every operation, including its own
//! creation and teardown, behind a single mutex.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]

pub mod error;
pub mod pool;
pub mod reporter;
pub mod utils;

mod adapter;
// Internal to the typed adapter; not a public surface.
mod global;

pub use adapter::PoolAllocator;
pub use error::{PoolError, PoolResult};
pub use pool::{BlockStats, FixedPool, FreeListEntry, TypedPool};
pub use reporter::PoolReporter;

/// Convenient re-exports of commonly used types and traits
pub mod prelude {
    pub use crate::adapter::PoolAllocator;
    pub use crate::error::{PoolError, PoolResult};
    pub use crate::pool::{BlockStats, FixedPool, FreeListEntry, TypedPool};
    pub use crate::reporter::{LeakReport, PoolReporter, RefCountEvent};
}
