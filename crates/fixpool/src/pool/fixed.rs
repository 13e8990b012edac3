//! Untyped fixed-chunk pool
//!
//! # Safety
//!
//! This module implements the fixed-chunk pool over a doubly linked list of
//! backing blocks:
//! - Allocation pops the head of the first non-saturated block's free list;
//!   a fresh block is spliced at the tail when every block is saturated
//! - Release pushes the chunk back onto its block's free list, or retires
//!   the block entirely when it becomes fully free and is not the last one
//! - No system call is made on the common path; growth and retirement are
//!   the only points that touch the system allocator
//!
//! ## Invariants
//!
//! - At least one block exists from construction to destruction
//! - Within a fresh block, chunks are handed out in ascending address order
//! - A chunk is owned either by its block's free list or by the caller,
//!   never both

use core::ptr::{self, NonNull};
use std::sync::Arc;

use super::block::{self, Block};
use super::stats::{BlockStats, FreeListEntry};
use crate::error::{PoolError, PoolResult};
use crate::reporter::{LeakReport, PoolReporter};

/// Fixed-chunk memory pool over untyped chunks
///
/// A pool serves homogeneous allocations of `chunk_size` bytes out of
/// `block_size`-byte backing blocks. It is single-threaded by design; wrap
/// it in a lock to share it (the global allocator does exactly that).
///
/// # Memory layout
/// ```text
/// block 0: [chunk][chunk][chunk]...[chunk]   <- free list threads the
/// block 1: [chunk][chunk][chunk]...[chunk]      unused chunks, low to high
/// ```
pub struct FixedPool {
    block_size: usize,
    chunk_size: usize,
    first_block: NonNull<Block>,
    reporter: Option<Arc<dyn PoolReporter>>,
}

impl FixedPool {
    /// Creates a pool serving `chunk_size`-byte chunks out of
    /// `block_size`-byte blocks. One block is allocated immediately.
    ///
    /// # Errors
    ///
    /// - `block_size` is zero or not a multiple of `chunk_size`
    /// - `chunk_size` is smaller than a pointer
    /// - the first backing block cannot be allocated
    pub fn new(block_size: usize, chunk_size: usize) -> PoolResult<Self> {
        Self::build(block_size, chunk_size, None)
    }

    /// Creates a pool that routes diagnostics through `reporter`
    pub fn with_reporter(
        block_size: usize,
        chunk_size: usize,
        reporter: Arc<dyn PoolReporter>,
    ) -> PoolResult<Self> {
        Self::build(block_size, chunk_size, Some(reporter))
    }

    fn build(
        block_size: usize,
        chunk_size: usize,
        reporter: Option<Arc<dyn PoolReporter>>,
    ) -> PoolResult<Self> {
        let minimum = core::mem::size_of::<*mut u8>();
        if chunk_size == 0 {
            return Err(PoolError::chunk_too_small(chunk_size));
        }
        if block_size == 0 || block_size % chunk_size != 0 {
            return Err(PoolError::chunk_misfit(block_size, chunk_size));
        }
        if chunk_size < minimum {
            return Err(PoolError::chunk_too_small(chunk_size));
        }

        let first_block = Block::create(block_size, chunk_size, ptr::null_mut())?;

        let pool = Self {
            block_size,
            chunk_size,
            first_block,
            reporter,
        };
        if let Some(reporter) = &pool.reporter {
            // SAFETY: the head block was just created and is alive.
            let begin = unsafe { (*pool.first_block.as_ptr()).begin() };
            reporter.block_allocated(begin, block_size, chunk_size);
        }
        Ok(pool)
    }

    /// Size of one backing block in bytes
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Size of one chunk in bytes
    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Takes one chunk out of the pool.
    ///
    /// The first block with a free chunk wins; when every block is
    /// saturated, a fresh block is spliced at the tail of the block list.
    /// Within a fresh block, chunks come out in ascending address order.
    ///
    /// # Errors
    ///
    /// Returns an out-of-memory error when a new backing block is needed and
    /// cannot be allocated.
    pub fn allocate(&mut self) -> PoolResult<NonNull<u8>> {
        let mut current = self.first_block.as_ptr();

        // SAFETY: all blocks on the list are owned by this pool and stay
        // alive until retired or dropped; the pool is accessed through
        // &mut self, so nothing mutates the list concurrently.
        unsafe {
            while (*current).available_chunks == 0 {
                let next = (*current).next_block;
                if next.is_null() {
                    break;
                }
                current = next;
            }

            if (*current).available_chunks == 0 {
                // Every block is saturated; current points at the tail.
                let fresh = Block::create(self.block_size, self.chunk_size, current)?;
                (*current).next_block = fresh.as_ptr();
                if let Some(reporter) = &self.reporter {
                    reporter.block_allocated(
                        (*fresh.as_ptr()).begin(),
                        self.block_size,
                        self.chunk_size,
                    );
                }
                current = fresh.as_ptr();
            }

            let block = &mut *current;
            block.used_chunks += 1;
            block.available_chunks -= 1;
            block.available_space -= self.chunk_size;
            block.used_space += self.chunk_size;

            let chunk = block.next_free_chunk;
            block.next_free_chunk = block::read_link(chunk);

            if let Some(reporter) = &self.reporter {
                reporter.chunk_allocated(block.begin(), chunk as usize, self.chunk_size, block.stats());
            }

            // SAFETY: available_chunks was non-zero, so the free-list head
            // was a valid chunk address.
            Ok(NonNull::new_unchecked(chunk))
        }
    }

    /// Returns a chunk to the pool.
    ///
    /// The owning block is found by scanning the block list. A block that
    /// becomes fully free is retired, unless it is the only block left; the
    /// pool always keeps at least one block.
    ///
    /// # Errors
    ///
    /// Rejects pointers outside every block with a "does not belong" error;
    /// the pool state is unchanged in that case.
    ///
    /// # Safety
    ///
    /// `chunk` must have been returned by [`allocate`](Self::allocate) on
    /// this pool and must not have been released since. Releasing the same
    /// chunk twice is undefined behavior.
    pub unsafe fn release(&mut self, chunk: NonNull<u8>) -> PoolResult<()> {
        let address = chunk.as_ptr() as usize;
        let Some(block_ptr) = self.block_of(address) else {
            return Err(PoolError::foreign_pointer(address));
        };

        // SAFETY: block_ptr came from the live block list; the caller
        // guarantees exclusive ownership of the released chunk.
        unsafe {
            let block = &mut *block_ptr.as_ptr();
            debug_assert!(block.used_chunks > 0, "release on a fully free block");

            block.used_chunks -= 1;
            block.available_chunks += 1;
            block.available_space += self.chunk_size;
            block.used_space -= self.chunk_size;

            if let Some(reporter) = &self.reporter {
                reporter.chunk_deallocated(block.begin(), address, self.chunk_size, block.stats());
            }

            if block.used_chunks == 0 {
                let sole_block =
                    block.previous_block.is_null() && block.next_block.is_null();
                if !sole_block {
                    let begin = block.begin();
                    self.unsplice(block_ptr);
                    if let Some(reporter) = &self.reporter {
                        reporter.block_deallocated(begin, self.block_size, self.chunk_size);
                    }
                    Block::destroy(block_ptr);
                    return Ok(());
                }
                // The last remaining block is kept even when fully free.
            }

            // The freed chunk becomes the new head of the block's free list.
            block::write_link(chunk.as_ptr(), block.next_free_chunk);
            block.next_free_chunk = chunk.as_ptr();
        }

        Ok(())
    }

    /// Removes a block from the doubly linked list, promoting the head's
    /// successor when the head itself is retired.
    ///
    /// # Safety
    ///
    /// `block_ptr` must be on this pool's block list and must not be the
    /// sole block.
    unsafe fn unsplice(&mut self, block_ptr: NonNull<Block>) {
        // SAFETY: neighbors read from a live list node; the caller rules out
        // the sole-block case, so a head block always has a successor.
        unsafe {
            let block = block_ptr.as_ptr();
            let previous = (*block).previous_block;
            let next = (*block).next_block;

            if previous.is_null() {
                debug_assert!(!next.is_null());
                self.first_block = NonNull::new_unchecked(next);
                (*next).previous_block = ptr::null_mut();
            } else {
                (*previous).next_block = next;
                if !next.is_null() {
                    (*next).previous_block = previous;
                }
            }
        }
    }

    /// Checks whether `chunk` lies inside one of the pool's blocks
    pub fn contains(&self, chunk: NonNull<u8>) -> bool {
        self.block_of(chunk.as_ptr() as usize).is_some()
    }

    /// Number of backing blocks currently held
    pub fn block_count(&self) -> usize {
        let mut count = 0;
        let mut current = self.first_block.as_ptr();
        // SAFETY: list nodes are alive while the pool exists.
        unsafe {
            while !current.is_null() {
                count += 1;
                current = (*current).next_block;
            }
        }
        count
    }

    /// Usage counters of the block containing `chunk`
    pub fn block_stats(&self, chunk: NonNull<u8>) -> PoolResult<BlockStats> {
        let address = chunk.as_ptr() as usize;
        match self.block_of(address) {
            // SAFETY: block_of only returns live list nodes.
            Some(block) => Ok(unsafe { (*block.as_ptr()).stats() }),
            None => Err(PoolError::foreign_pointer(address)),
        }
    }

    /// Free chunks in the block containing `chunk`
    pub fn available_chunks_in_block(&self, chunk: NonNull<u8>) -> PoolResult<usize> {
        Ok(self.block_stats(chunk)?.available_chunks)
    }

    /// Used chunks in the block containing `chunk`
    pub fn used_chunks_in_block(&self, chunk: NonNull<u8>) -> PoolResult<usize> {
        Ok(self.block_stats(chunk)?.used_chunks)
    }

    /// Free bytes in the block containing `chunk`
    pub fn available_space_in_block(&self, chunk: NonNull<u8>) -> PoolResult<usize> {
        Ok(self.block_stats(chunk)?.available_space)
    }

    /// Used bytes in the block containing `chunk`
    pub fn used_space_in_block(&self, chunk: NonNull<u8>) -> PoolResult<usize> {
        Ok(self.block_stats(chunk)?.used_space)
    }

    /// Base address of the block containing `chunk`, or of the head block
    /// when `chunk` is `None`
    pub fn block_address(&self, chunk: Option<NonNull<u8>>) -> PoolResult<NonNull<u8>> {
        match chunk {
            // SAFETY: the head block is alive while the pool exists.
            None => Ok(unsafe { (*self.first_block.as_ptr()).base() }),
            Some(chunk) => {
                let address = chunk.as_ptr() as usize;
                match self.block_of(address) {
                    // SAFETY: block_of only returns live list nodes.
                    Some(block) => Ok(unsafe { (*block.as_ptr()).base() }),
                    None => Err(PoolError::foreign_pointer(address)),
                }
            },
        }
    }

    /// Ordered free-list dump of the block containing `chunk`.
    ///
    /// An empty dump means the block is saturated; the last entry's `next`
    /// is always `None`.
    pub fn dump_free_list(&self, chunk: NonNull<u8>) -> PoolResult<Vec<FreeListEntry>> {
        let address = chunk.as_ptr() as usize;
        match self.block_of(address) {
            // SAFETY: block_of only returns live list nodes.
            Some(block) => Ok(unsafe { (*block.as_ptr()).dump_free_list() }),
            None => Err(PoolError::foreign_pointer(address)),
        }
    }

    /// Linear scan for the block whose region contains `address`
    fn block_of(&self, address: usize) -> Option<NonNull<Block>> {
        let mut current = self.first_block.as_ptr();
        // SAFETY: list nodes are alive while the pool exists.
        unsafe {
            while !current.is_null() {
                if (*current).contains(address) {
                    return Some(NonNull::new_unchecked(current));
                }
                current = (*current).next_block;
            }
        }
        None
    }
}

impl Drop for FixedPool {
    fn drop(&mut self) {
        let mut current = self.first_block.as_ptr();
        // SAFETY: the pool owns every block on the list; each is destroyed
        // exactly once. Leak reports copy chunk contents before the backing
        // region is returned to the system.
        unsafe {
            while !current.is_null() {
                let next = (*current).next_block;

                if let Some(reporter) = &self.reporter {
                    if (*current).used_chunks > 0 {
                        let report = LeakReport {
                            block: (*current).begin(),
                            chunk_size: self.chunk_size,
                            stats: (*current).stats(),
                            chunks: (*current).leaked_chunks(self.chunk_size),
                        };
                        reporter.leaks_detected(&report);
                    }
                    reporter.block_deallocated(
                        (*current).begin(),
                        self.block_size,
                        self.chunk_size,
                    );
                }

                Block::destroy(NonNull::new_unchecked(current));
                current = next;
            }
        }
    }
}

// SAFETY: FixedPool exclusively owns its blocks and backing regions; the
// raw pointers never alias memory owned elsewhere, and the reporter is
// Send + Sync by trait bound. Moving the pool to another thread is sound.
unsafe impl Send for FixedPool {}
