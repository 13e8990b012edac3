//! Introspection value types for pool blocks

use core::ptr::NonNull;

/// Usage counters of one backing block
///
/// For every reachable block state, `available_space + used_space` equals
/// the pool's block size and `available_chunks + used_chunks` equals the
/// number of chunks per block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockStats {
    /// Bytes still available in the block
    pub available_space: usize,
    /// Bytes handed out to callers
    pub used_space: usize,
    /// Chunks still on the free list
    pub available_chunks: usize,
    /// Chunks handed out to callers
    pub used_chunks: usize,
}

/// One entry of a block's free-list dump
///
/// Entries appear in head-to-tail order; the last entry's `next` is `None`.
/// An empty dump means the block is saturated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeListEntry {
    /// Address of the free chunk
    pub chunk: NonNull<u8>,
    /// Link stored inside the chunk: the next free chunk, if any
    pub next: Option<NonNull<u8>>,
}
