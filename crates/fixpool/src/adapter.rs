//! Typed adapter over the global size-class allocator

use core::fmt;
use core::marker::PhantomData;
use core::mem;
use core::ptr::NonNull;

use crate::error::{PoolError, PoolResult};
use crate::global;
use crate::reporter::RefCountEvent;

/// Typed handle to the process-global size-class allocator
///
/// A `PoolAllocator<T>` carries no per-instance state; it exists to
/// translate typed requests into byte counts and to participate in the
/// global allocator's reference count. The first handle constructed in a
/// process creates the global state, and dropping the last one tears it
/// down (per-class pools first, then the meta-pool). All instances, of any
/// element type, compare equal because they share the one global pool.
///
/// ```
/// use fixpool::PoolAllocator;
///
/// let alloc = PoolAllocator::<u64>::new();
/// let values = alloc.allocate(3).unwrap();
/// unsafe {
///     for i in 0..3 {
///         values.as_ptr().add(i).write(i as u64);
///     }
///     assert_eq!(*values.as_ptr().add(2), 2);
///     alloc.deallocate(values, 3);
/// }
/// ```
pub struct PoolAllocator<T> {
    _marker: PhantomData<T>,
}

impl<T> PoolAllocator<T> {
    /// Creates a handle, initializing the global allocator on first use.
    ///
    /// # Panics
    ///
    /// Panics when the global state cannot be created (meta-pool
    /// allocation failure); use [`try_new`](Self::try_new) to observe that
    /// error instead.
    pub fn new() -> Self {
        Self::try_new().expect("failed to initialize the global pool allocator")
    }

    /// Creates a handle, surfacing global-state initialization failures
    pub fn try_new() -> PoolResult<Self> {
        global::retain(RefCountEvent::Acquired)?;
        Ok(Self {
            _marker: PhantomData,
        })
    }

    /// Allocates room for `count` values of `T`.
    ///
    /// The backing chunk is the size class of `count * size_of::<T>()`
    /// bytes, which may over-allocate by up to 2x minus one byte.
    /// Zero-sized requests (`count == 0` or a zero-sized `T`) return a
    /// dangling pointer without touching the global state.
    ///
    /// # Errors
    ///
    /// - `count` overflows the addressable byte range ("array length")
    /// - the underlying pool cannot grow ("out of memory")
    pub fn allocate(&self, count: usize) -> PoolResult<NonNull<T>> {
        let element_size = mem::size_of::<T>();
        if element_size == 0 || count == 0 {
            return Ok(NonNull::dangling());
        }
        if count > usize::MAX / element_size {
            return Err(PoolError::array_length(count, element_size));
        }

        let chunk = global::allocate(count * element_size)?;
        Ok(chunk.cast())
    }

    /// Returns an allocation obtained from [`allocate`](Self::allocate).
    ///
    /// The size class is recomputed from `count * size_of::<T>()`, so the
    /// same `count` must be passed back. Dangling pointers from zero-sized
    /// requests are a no-op, as is any deallocation after the global state
    /// has been torn down.
    ///
    /// # Safety
    ///
    /// `chunk` must have been returned by `allocate(count)` on any handle
    /// and must not have been deallocated since. Values stored in the
    /// allocation are not dropped; the caller is responsible for that.
    pub unsafe fn deallocate(&self, chunk: NonNull<T>, count: usize) {
        let element_size = mem::size_of::<T>();
        if element_size == 0 || count == 0 {
            return;
        }
        global::deallocate(chunk.cast(), count * element_size);
    }
}

impl<T> Default for PoolAllocator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for PoolAllocator<T> {
    fn clone(&self) -> Self {
        // The clonee keeps the state alive, so this can only fail if the
        // meta-pool itself could not be created, which new() already ruled
        // out.
        global::retain(RefCountEvent::Cloned)
            .expect("failed to retain the global pool allocator");
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Drop for PoolAllocator<T> {
    fn drop(&mut self) {
        global::release_handle();
    }
}

impl<T> fmt::Debug for PoolAllocator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolAllocator").finish_non_exhaustive()
    }
}

impl<T, U> PartialEq<PoolAllocator<U>> for PoolAllocator<T> {
    fn eq(&self, _other: &PoolAllocator<U>) -> bool {
        // Every handle forwards to the one global pool.
        true
    }
}

impl<T> Eq for PoolAllocator<T> {}
