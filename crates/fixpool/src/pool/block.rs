//! Backing blocks and the intrusive free list
//!
//! # Safety
//!
//! A block owns one contiguous zeroed region subdivided into equally sized
//! chunks. The free list is threaded through the chunks themselves: the
//! first word of every free chunk stores the address of the next free chunk,
//! or null at the end of the list.
//!
//! ## Invariants
//!
//! - The region is aligned to the chunk size (power-of-two sizes) or to the
//!   word size otherwise; links are accessed unaligned so either policy is
//!   defined behavior
//! - On creation the free list walks every chunk from lowest to highest
//!   address and terminates in null
//! - `available_chunks + used_chunks == block_size / chunk_size` and
//!   `available_space + used_space == block_size` at all times
//! - Block headers are linked into a doubly linked list owned by the pool

use core::ptr::{self, NonNull};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::collections::HashSet;

use super::stats::{BlockStats, FreeListEntry};
use crate::error::{PoolError, PoolResult};
use crate::reporter::LeakedChunk;
use crate::utils::chunk_alignment;

/// Reads the free-list link stored in the first word of a free chunk.
///
/// # Safety
///
/// `chunk` must point into a live block with at least one word of space.
#[inline]
pub(crate) unsafe fn read_link(chunk: *const u8) -> *mut u8 {
    // SAFETY: caller guarantees the chunk is readable; unaligned access keeps
    // non-power-of-two chunk strides defined.
    unsafe { chunk.cast::<*mut u8>().read_unaligned() }
}

/// Writes the free-list link into the first word of a free chunk.
///
/// # Safety
///
/// `chunk` must point into a live block with at least one word of space, and
/// the chunk must not hold a live value.
#[inline]
pub(crate) unsafe fn write_link(chunk: *mut u8, next: *mut u8) {
    // SAFETY: caller guarantees exclusive access to the free chunk.
    unsafe { chunk.cast::<*mut u8>().write_unaligned(next) }
}

/// Header of one backing block
pub(crate) struct Block {
    /// Backing region, `block_size` bytes
    memory: NonNull<u8>,
    /// Layout the region was allocated with
    layout: Layout,

    pub(crate) available_space: usize,
    pub(crate) used_space: usize,
    pub(crate) available_chunks: usize,
    pub(crate) used_chunks: usize,

    /// Head of the block's free list; null when the block is saturated
    pub(crate) next_free_chunk: *mut u8,

    /// First address of the region
    block_beginning: usize,
    /// One past the last address of the region (exclusive bound)
    block_end: usize,

    pub(crate) next_block: *mut Block,
    pub(crate) previous_block: *mut Block,
}

impl Block {
    /// Allocates a zeroed backing region, threads the free list through it
    /// and returns a heap-allocated header linked to `previous`.
    ///
    /// The caller is responsible for pointing `previous`'s forward link at
    /// the new block.
    pub(crate) fn create(
        block_size: usize,
        chunk_size: usize,
        previous: *mut Block,
    ) -> PoolResult<NonNull<Block>> {
        let layout = Layout::from_size_align(block_size, chunk_alignment(chunk_size))
            .map_err(|_| PoolError::out_of_memory(block_size))?;

        // SAFETY: block_size is validated positive by the pool, so the layout
        // has a non-zero size.
        let raw = unsafe { alloc_zeroed(layout) };
        let memory = NonNull::new(raw).ok_or_else(|| PoolError::out_of_memory(block_size))?;

        let chunk_count = block_size / chunk_size;

        // Thread the free list through the chunks, lowest address first. The
        // final chunk receives the null terminator.
        // SAFETY: every write lands inside the freshly allocated region; the
        // chunks do not overlap and each is at least one word wide.
        unsafe {
            for n in 0..chunk_count {
                let chunk = raw.add(n * chunk_size);
                let next = if n + 1 == chunk_count {
                    ptr::null_mut()
                } else {
                    raw.add((n + 1) * chunk_size)
                };
                write_link(chunk, next);
            }
        }

        let begin = raw as usize;
        let block = Box::new(Block {
            memory,
            layout,
            available_space: block_size,
            used_space: 0,
            available_chunks: chunk_count,
            used_chunks: 0,
            next_free_chunk: raw,
            block_beginning: begin,
            block_end: begin + block_size,
            next_block: ptr::null_mut(),
            previous_block: previous,
        });

        Ok(NonNull::from(Box::leak(block)))
    }

    /// Frees the header and, through its `Drop`, the backing region.
    ///
    /// # Safety
    ///
    /// `block` must have been produced by [`Block::create`] and must not be
    /// reachable from any block list afterwards.
    pub(crate) unsafe fn destroy(block: NonNull<Block>) {
        // SAFETY: caller guarantees single ownership of the header.
        drop(unsafe { Box::from_raw(block.as_ptr()) });
    }

    /// First address of the backing region
    #[inline]
    pub(crate) fn begin(&self) -> usize {
        self.block_beginning
    }

    /// Base pointer of the backing region
    #[inline]
    pub(crate) fn base(&self) -> NonNull<u8> {
        self.memory
    }

    /// Checks whether `address` lies inside this block's region
    #[inline]
    pub(crate) fn contains(&self, address: usize) -> bool {
        address >= self.block_beginning && address < self.block_end
    }

    /// Snapshot of the usage counters
    pub(crate) fn stats(&self) -> BlockStats {
        BlockStats {
            available_space: self.available_space,
            used_space: self.used_space,
            available_chunks: self.available_chunks,
            used_chunks: self.used_chunks,
        }
    }

    /// Walks the free list from its head and returns the ordered entries
    pub(crate) fn dump_free_list(&self) -> Vec<FreeListEntry> {
        let mut entries = Vec::with_capacity(self.available_chunks);

        let mut cursor = self.next_free_chunk;
        while let Some(chunk) = NonNull::new(cursor) {
            // SAFETY: every link on the free list points at a free chunk of
            // this live block.
            let next = unsafe { read_link(chunk.as_ptr()) };
            entries.push(FreeListEntry {
                chunk,
                next: NonNull::new(next),
            });
            cursor = next;
        }

        entries
    }

    /// Collects the chunks that are still in use, with their contents.
    ///
    /// Used by the pool destructor to build leak reports.
    pub(crate) fn leaked_chunks(&self, chunk_size: usize) -> Vec<LeakedChunk> {
        let free: HashSet<usize> = self
            .dump_free_list()
            .iter()
            .map(|entry| entry.chunk.as_ptr() as usize)
            .collect();

        let chunk_count = (self.block_end - self.block_beginning) / chunk_size;
        let mut leaked = Vec::with_capacity(self.used_chunks);
        for n in 0..chunk_count {
            // SAFETY: the offset stays inside the live region.
            let chunk = unsafe { self.memory.as_ptr().add(n * chunk_size) };
            let address = chunk as usize;
            if free.contains(&address) {
                continue;
            }
            // SAFETY: the chunk lies inside the live region; the copy is made
            // before any memory is returned to the system.
            let bytes =
                unsafe { core::slice::from_raw_parts(chunk.cast_const(), chunk_size) }.to_vec();
            leaked.push(LeakedChunk { address, bytes });
        }

        leaked
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        // SAFETY: memory was obtained from alloc_zeroed with self.layout and
        // is released exactly once.
        unsafe { dealloc(self.memory.as_ptr(), self.layout) };
    }
}
