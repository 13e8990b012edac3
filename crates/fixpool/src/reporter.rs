//! Diagnostic reporting hooks for pool and allocator activity
//!
//! A [`PoolReporter`] receives structured callbacks for block and chunk
//! traffic, global-allocator lifecycle transitions and leak dumps. Every
//! callback has an empty default body, so implementations only override what
//! they care about. Reporters never influence functional behavior; they are
//! a diagnostics side channel.
//!
//! With the `logging` feature enabled, [`TracingReporter`] forwards every
//! callback to `tracing` events and is installed on the global allocator's
//! pools automatically.

use crate::pool::BlockStats;

/// Reference-count transition observed by a reporter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefCountEvent {
    /// A new typed adapter was constructed
    Acquired,
    /// An existing typed adapter was cloned
    Cloned,
    /// A typed adapter was dropped
    Released,
}

/// One chunk that was still in use when its pool was destroyed
#[derive(Debug, Clone)]
pub struct LeakedChunk {
    /// Address of the leaked chunk
    pub address: usize,
    /// Contents of the leaked chunk at destruction time
    pub bytes: Vec<u8>,
}

/// Leak summary for a single block, produced during pool destruction
#[derive(Debug, Clone)]
pub struct LeakReport {
    /// Base address of the block
    pub block: usize,
    /// Chunk size of the owning pool
    pub chunk_size: usize,
    /// Usage counters at destruction time
    pub stats: BlockStats,
    /// The chunks that were never released
    pub chunks: Vec<LeakedChunk>,
}

/// Sink for structured pool diagnostics
///
/// All methods default to no-ops. Implementations must be safe to call from
/// any thread; the global allocator invokes them while holding its lock.
#[allow(unused_variables)]
pub trait PoolReporter: Send + Sync {
    /// A backing block was allocated
    fn block_allocated(&self, block: usize, block_size: usize, chunk_size: usize) {}

    /// A backing block was returned to the system
    fn block_deallocated(&self, block: usize, block_size: usize, chunk_size: usize) {}

    /// A chunk was handed out; `stats` is the owning block's state afterwards
    fn chunk_allocated(&self, block: usize, chunk: usize, chunk_size: usize, stats: BlockStats) {}

    /// A chunk was released; `stats` is the owning block's state afterwards
    fn chunk_deallocated(&self, block: usize, chunk: usize, chunk_size: usize, stats: BlockStats) {}

    /// The typed adapter asked the global allocator for `bytes` bytes
    fn allocation_requested(&self, bytes: usize) {}

    /// The typed adapter returned the chunk at `chunk` covering `bytes` bytes
    fn deallocation_requested(&self, chunk: usize, bytes: usize) {}

    /// The global allocator singleton was created
    fn singleton_created(&self) {}

    /// The global allocator singleton was destroyed
    fn singleton_destroyed(&self) {}

    /// The global reference count changed to `count`
    fn ref_count_changed(&self, event: RefCountEvent, count: i64) {}

    /// A block still held live chunks when its pool was destroyed
    fn leaks_detected(&self, report: &LeakReport) {}
}

/// Reporter that forwards every callback to `tracing` events
///
/// Traffic is emitted at `trace`/`debug` level, leaks at `warn` level with a
/// hex dump of each leaked chunk.
#[cfg(feature = "logging")]
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

#[cfg(feature = "logging")]
impl PoolReporter for TracingReporter {
    fn block_allocated(&self, block: usize, block_size: usize, chunk_size: usize) {
        tracing::debug!(block, block_size, chunk_size, "block allocated");
    }

    fn block_deallocated(&self, block: usize, block_size: usize, chunk_size: usize) {
        tracing::debug!(block, block_size, chunk_size, "block freed");
    }

    fn chunk_allocated(&self, block: usize, chunk: usize, chunk_size: usize, stats: BlockStats) {
        tracing::trace!(
            block,
            chunk,
            chunk_size,
            available_chunks = stats.available_chunks,
            used_chunks = stats.used_chunks,
            "chunk allocated"
        );
    }

    fn chunk_deallocated(&self, block: usize, chunk: usize, chunk_size: usize, stats: BlockStats) {
        tracing::trace!(
            block,
            chunk,
            chunk_size,
            available_chunks = stats.available_chunks,
            used_chunks = stats.used_chunks,
            "chunk freed"
        );
    }

    fn allocation_requested(&self, bytes: usize) {
        tracing::trace!(bytes, "allocation requested");
    }

    fn deallocation_requested(&self, chunk: usize, bytes: usize) {
        tracing::trace!(chunk, bytes, "deallocation requested");
    }

    fn singleton_created(&self) {
        tracing::debug!("global pool allocator created");
    }

    fn singleton_destroyed(&self) {
        tracing::debug!("global pool allocator destroyed");
    }

    fn ref_count_changed(&self, event: RefCountEvent, count: i64) {
        tracing::trace!(?event, count, "global reference count changed");
    }

    fn leaks_detected(&self, report: &LeakReport) {
        tracing::warn!(
            block = report.block,
            used_chunks = report.stats.used_chunks,
            used_space = report.stats.used_space,
            "memory leak detected at pool destruction"
        );
        for chunk in &report.chunks {
            tracing::warn!(
                chunk = chunk.address,
                "\n{}",
                crate::utils::hexdump(&chunk.bytes, chunk.address)
            );
        }
    }
}
