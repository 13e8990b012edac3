//! Process-global size-class allocator
//!
//! One process-wide registry maps each power-of-two size class to a
//! [`FixedPool`] dedicated to that class. The pool headers themselves live
//! in a meta-pool. Every operation, including state creation and teardown,
//! is serialized behind a single mutex.
//!
//! This module is internal; the public surface is the typed adapter in
//! [`crate::adapter`].

use core::mem;
use core::ptr::NonNull;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::PoolResult;
use crate::pool::FixedPool;
use crate::reporter::{PoolReporter, RefCountEvent};
use crate::utils::size_class;

/// Block size of the meta-pool that holds the per-class pool headers
const META_BLOCK_SIZE: usize = 32_768;

/// Chunks per backing block of a per-class pool
const CHUNKS_PER_BLOCK: usize = 1000;

/// State owned by the process-global allocator, protected by [`GLOBAL`]
struct GlobalState {
    /// Pool the per-class pool headers are allocated from
    meta_pool: FixedPool,
    /// size class -> pool header inside a meta-pool chunk
    class_pools: HashMap<usize, NonNull<FixedPool>>,
    /// Live typed-adapter handles
    handles: i64,
    reporter: Option<Arc<dyn PoolReporter>>,
}

// SAFETY: the pool headers behind the NonNull pointers are owned by this
// state (their storage is a meta-pool chunk) and are only ever dereferenced
// while the GLOBAL mutex is held.
unsafe impl Send for GlobalState {}

static GLOBAL: Mutex<Option<GlobalState>> = Mutex::new(None);

fn default_reporter() -> Option<Arc<dyn PoolReporter>> {
    #[cfg(feature = "logging")]
    {
        Some(Arc::new(crate::reporter::TracingReporter))
    }
    #[cfg(not(feature = "logging"))]
    {
        None
    }
}

impl GlobalState {
    fn create() -> PoolResult<Self> {
        let reporter = default_reporter();
        let meta_chunk_size = size_class(mem::size_of::<FixedPool>());
        let meta_pool = match &reporter {
            Some(reporter) => {
                FixedPool::with_reporter(META_BLOCK_SIZE, meta_chunk_size, Arc::clone(reporter))?
            },
            None => FixedPool::new(META_BLOCK_SIZE, meta_chunk_size)?,
        };

        if let Some(reporter) = &reporter {
            reporter.singleton_created();
        }

        Ok(Self {
            meta_pool,
            class_pools: HashMap::new(),
            handles: 0,
            reporter,
        })
    }

    /// Returns the pool for `class`, creating it lazily. Idempotent.
    fn class_pool(&mut self, class: usize) -> PoolResult<NonNull<FixedPool>> {
        if let Some(&pool) = self.class_pools.get(&class) {
            return Ok(pool);
        }

        let chunk = self.meta_pool.allocate()?;
        let block_size = class * CHUNKS_PER_BLOCK;
        let created = match &self.reporter {
            Some(reporter) => {
                FixedPool::with_reporter(block_size, class, Arc::clone(reporter))
            },
            None => FixedPool::new(block_size, class),
        };
        let pool = match created {
            Ok(pool) => pool,
            Err(err) => {
                // SAFETY: the chunk was just taken from the meta-pool and
                // never handed out.
                unsafe {
                    let _ = self.meta_pool.release(chunk);
                }
                return Err(err);
            },
        };

        let header = chunk.cast::<FixedPool>();
        // SAFETY: meta-pool chunks are sized and aligned for a FixedPool
        // header (chunk size is the size class of size_of::<FixedPool>()).
        unsafe { header.as_ptr().write(pool) };
        self.class_pools.insert(class, header);
        Ok(header)
    }
}

impl Drop for GlobalState {
    fn drop(&mut self) {
        // Per-class pools must be released back to the meta-pool before the
        // meta-pool itself goes away; dropping a header frees that class's
        // backing blocks (leak-checked through the reporter).
        for (_, header) in self.class_pools.drain() {
            // SAFETY: the header points at a live FixedPool stored in a
            // meta-pool chunk; it is dropped exactly once here and its
            // storage returned before the meta-pool is dropped.
            unsafe {
                core::ptr::drop_in_place(header.as_ptr());
                let _ = self.meta_pool.release(header.cast());
            }
        }

        if let Some(reporter) = &self.reporter {
            reporter.singleton_destroyed();
        }
    }
}

/// Registers one more live adapter handle, creating the global state on
/// first use.
pub(crate) fn retain(event: RefCountEvent) -> PoolResult<()> {
    let mut guard = GLOBAL.lock();
    let state = match &mut *guard {
        Some(state) => state,
        empty @ None => empty.insert(GlobalState::create()?),
    };

    state.handles += 1;
    if let Some(reporter) = &state.reporter {
        reporter.ref_count_changed(event, state.handles);
    }
    Ok(())
}

/// Drops one adapter handle; the last one tears the global state down.
pub(crate) fn release_handle() {
    let mut guard = GLOBAL.lock();
    let Some(state) = guard.as_mut() else {
        return;
    };

    state.handles -= 1;
    if let Some(reporter) = &state.reporter {
        reporter.ref_count_changed(RefCountEvent::Released, state.handles);
    }

    if state.handles <= 0 {
        // GlobalState::drop runs here, still under the lock.
        *guard = None;
    }
}

/// Takes one chunk of `size_class(n_bytes)` bytes out of the matching pool.
///
/// The returned chunk may be larger than `n_bytes`; it is always the full
/// size class.
pub(crate) fn allocate(n_bytes: usize) -> PoolResult<NonNull<u8>> {
    let mut guard = GLOBAL.lock();
    // A caller necessarily holds a PoolAllocator handle, and every handle
    // keeps the state alive.
    let state = guard
        .as_mut()
        .expect("global pool allocator used without a live PoolAllocator handle");

    if let Some(reporter) = &state.reporter {
        reporter.allocation_requested(n_bytes);
    }

    let class = size_class(n_bytes);
    let pool = state.class_pool(class)?;
    // SAFETY: the pool header stays valid for the lifetime of the state and
    // is only touched under the global lock.
    unsafe { (*pool.as_ptr()).allocate() }
}

/// Returns a chunk to the pool of `size_class(n_bytes)`.
///
/// A missing class pool (including the torn-down state after the last
/// adapter dropped) makes this a silent no-op.
pub(crate) fn deallocate(chunk: NonNull<u8>, n_bytes: usize) {
    let mut guard = GLOBAL.lock();
    let Some(state) = guard.as_mut() else {
        return;
    };

    if let Some(reporter) = &state.reporter {
        reporter.deallocation_requested(chunk.as_ptr() as usize, n_bytes);
    }

    let class = size_class(n_bytes);
    if let Some(&pool) = state.class_pools.get(&class) {
        // SAFETY: the pool header is valid under the lock; a chunk the pool
        // does not own is rejected by its range check, which we swallow to
        // keep deallocation infallible for the adapter.
        unsafe {
            let _ = (*pool.as_ptr()).release(chunk);
        }
    }
}
