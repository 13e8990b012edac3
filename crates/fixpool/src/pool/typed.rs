//! Typed wrapper over the untyped fixed pool

use core::marker::PhantomData;
use core::mem;
use core::ptr::{self, NonNull};
use std::sync::Arc;

use super::fixed::FixedPool;
use super::stats::{BlockStats, FreeListEntry};
use crate::error::{PoolError, PoolResult};
use crate::reporter::PoolReporter;

/// Fixed-chunk pool that constructs and drops values of `T` in place
///
/// `TypedPool` adds element construction and destruction on top of
/// [`FixedPool`]; chunk bookkeeping, block growth and retirement are
/// identical. Released handles are cleared to reflect the transferred
/// ownership:
///
/// ```
/// use fixpool::TypedPool;
///
/// let mut pool = TypedPool::<u64>::new(4096, 8).unwrap();
/// let value = pool.alloc(42).unwrap();
/// assert_eq!(unsafe { *value.as_ref() }, 42);
///
/// let mut slot = Some(value);
/// unsafe { pool.release(&mut slot).unwrap() };
/// assert!(slot.is_none());
/// ```
pub struct TypedPool<T> {
    raw: FixedPool,
    _marker: PhantomData<T>,
}

impl<T> core::fmt::Debug for TypedPool<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TypedPool").finish_non_exhaustive()
    }
}

impl<T> TypedPool<T> {
    /// Creates a typed pool over `block_size`-byte blocks of
    /// `chunk_size`-byte chunks.
    ///
    /// # Errors
    ///
    /// In addition to the untyped pool's configuration errors, construction
    /// fails when `T` does not fit in a chunk or the chunk stride cannot
    /// satisfy `T`'s alignment.
    pub fn new(block_size: usize, chunk_size: usize) -> PoolResult<Self> {
        Self::wrap(FixedPool::new(block_size, chunk_size)?)
    }

    /// Creates a typed pool that routes diagnostics through `reporter`
    pub fn with_reporter(
        block_size: usize,
        chunk_size: usize,
        reporter: Arc<dyn PoolReporter>,
    ) -> PoolResult<Self> {
        Self::wrap(FixedPool::with_reporter(block_size, chunk_size, reporter)?)
    }

    fn wrap(raw: FixedPool) -> PoolResult<Self> {
        let chunk_size = raw.chunk_size();
        if mem::size_of::<T>() > chunk_size {
            return Err(PoolError::element_too_large(chunk_size, mem::size_of::<T>()));
        }
        let align = mem::align_of::<T>();
        if align > crate::utils::chunk_alignment(chunk_size) || chunk_size % align != 0 {
            return Err(PoolError::element_misaligned(chunk_size, align));
        }
        Ok(Self {
            raw,
            _marker: PhantomData,
        })
    }

    /// Size of one backing block in bytes
    #[inline]
    pub fn block_size(&self) -> usize {
        self.raw.block_size()
    }

    /// Size of one chunk in bytes
    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.raw.chunk_size()
    }

    /// Takes a chunk out of the pool and moves `value` into it
    pub fn alloc(&mut self, value: T) -> PoolResult<NonNull<T>> {
        let chunk = self.raw.allocate()?;
        debug_assert!(crate::utils::is_aligned_ptr(
            chunk.as_ptr(),
            mem::align_of::<T>().max(1)
        ));
        let element = chunk.cast::<T>();
        // SAFETY: the chunk is at least size_of::<T>() bytes, aligned for T
        // (both validated at construction), and owned by the caller from
        // here on.
        unsafe { element.as_ptr().write(value) };
        Ok(element)
    }

    /// Returns a chunk to the pool, dropping the value in place first.
    ///
    /// A `None` slot is a no-op. On success the slot is cleared; on error
    /// (a pointer outside every block) the slot and the pool are untouched.
    ///
    /// # Safety
    ///
    /// A `Some` slot must hold a pointer obtained from
    /// [`alloc`](Self::alloc) on this pool that has not been released since.
    pub unsafe fn release(&mut self, slot: &mut Option<NonNull<T>>) -> PoolResult<()> {
        let Some(element) = *slot else {
            return Ok(());
        };

        if !self.raw.contains(element.cast()) {
            return Err(PoolError::foreign_pointer(element.as_ptr() as usize));
        }

        // Drop before the chunk's first word is reused for free-list linkage.
        if mem::needs_drop::<T>() {
            // SAFETY: the slot holds the last live pointer to the value.
            unsafe { ptr::drop_in_place(element.as_ptr()) };
        }

        // SAFETY: membership was checked above; the caller guarantees the
        // chunk is live and uniquely owned.
        unsafe { self.raw.release(element.cast())? };

        *slot = None;
        Ok(())
    }

    /// Checks whether `element` lies inside one of the pool's blocks
    pub fn contains(&self, element: NonNull<T>) -> bool {
        self.raw.contains(element.cast())
    }

    /// Number of backing blocks currently held
    pub fn block_count(&self) -> usize {
        self.raw.block_count()
    }

    /// Usage counters of the block containing `element`
    pub fn block_stats(&self, element: NonNull<T>) -> PoolResult<BlockStats> {
        self.raw.block_stats(element.cast())
    }

    /// Free chunks in the block containing `element`
    pub fn available_chunks_in_block(&self, element: NonNull<T>) -> PoolResult<usize> {
        self.raw.available_chunks_in_block(element.cast())
    }

    /// Used chunks in the block containing `element`
    pub fn used_chunks_in_block(&self, element: NonNull<T>) -> PoolResult<usize> {
        self.raw.used_chunks_in_block(element.cast())
    }

    /// Free bytes in the block containing `element`
    pub fn available_space_in_block(&self, element: NonNull<T>) -> PoolResult<usize> {
        self.raw.available_space_in_block(element.cast())
    }

    /// Used bytes in the block containing `element`
    pub fn used_space_in_block(&self, element: NonNull<T>) -> PoolResult<usize> {
        self.raw.used_space_in_block(element.cast())
    }

    /// Base address of the block containing `element`, or of the head block
    /// when `element` is `None`
    pub fn block_address(&self, element: Option<NonNull<T>>) -> PoolResult<NonNull<u8>> {
        self.raw.block_address(element.map(|element| element.cast()))
    }

    /// Ordered free-list dump of the block containing `element`
    pub fn dump_free_list(&self, element: NonNull<T>) -> PoolResult<Vec<FreeListEntry>> {
        self.raw.dump_free_list(element.cast())
    }
}
