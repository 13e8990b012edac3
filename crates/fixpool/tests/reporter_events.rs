//! Reporter callback tests
//!
//! A recording reporter verifies that block and chunk traffic, retirement
//! and leak dumps reach the sink in order, and that reporting never changes
//! functional behavior.

use std::sync::{Arc, Mutex};

use fixpool::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    BlockAllocated { block: usize },
    BlockDeallocated { block: usize },
    ChunkAllocated { chunk: usize },
    ChunkDeallocated { chunk: usize },
    Leak { used_chunks: usize, chunks: Vec<(usize, Vec<u8>)> },
}

#[derive(Debug, Default)]
struct RecordingReporter {
    events: Mutex<Vec<Event>>,
}

impl RecordingReporter {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl PoolReporter for RecordingReporter {
    fn block_allocated(&self, block: usize, _block_size: usize, _chunk_size: usize) {
        self.events.lock().unwrap().push(Event::BlockAllocated { block });
    }

    fn block_deallocated(&self, block: usize, _block_size: usize, _chunk_size: usize) {
        self.events.lock().unwrap().push(Event::BlockDeallocated { block });
    }

    fn chunk_allocated(&self, _block: usize, chunk: usize, _chunk_size: usize, _stats: BlockStats) {
        self.events.lock().unwrap().push(Event::ChunkAllocated { chunk });
    }

    fn chunk_deallocated(
        &self,
        _block: usize,
        chunk: usize,
        _chunk_size: usize,
        _stats: BlockStats,
    ) {
        self.events.lock().unwrap().push(Event::ChunkDeallocated { chunk });
    }

    fn leaks_detected(&self, report: &LeakReport) {
        self.events.lock().unwrap().push(Event::Leak {
            used_chunks: report.stats.used_chunks,
            chunks: report
                .chunks
                .iter()
                .map(|chunk| (chunk.address, chunk.bytes.clone()))
                .collect(),
        });
    }
}

#[test]
fn test_reporter_sees_traffic_in_order() {
    let reporter = Arc::new(RecordingReporter::default());
    let mut pool = TypedPool::<u64>::with_reporter(64, 8, Arc::clone(&reporter) as Arc<dyn PoolReporter>)
        .expect("Failed to create pool");

    let ptr = pool.alloc(1).unwrap();
    let chunk = ptr.as_ptr() as usize;
    let mut slot = Some(ptr);
    unsafe { pool.release(&mut slot).unwrap() };
    drop(pool);

    let events = reporter.events();
    assert_eq!(events.len(), 4);
    assert!(matches!(events[0], Event::BlockAllocated { .. }));
    assert_eq!(events[1], Event::ChunkAllocated { chunk });
    assert_eq!(events[2], Event::ChunkDeallocated { chunk });
    assert!(matches!(events[3], Event::BlockDeallocated { .. }));
}

#[test]
fn test_reporter_sees_block_growth_and_retirement() {
    let reporter = Arc::new(RecordingReporter::default());
    // 8 chunks per block; the ninth allocation grows the pool.
    let mut pool = TypedPool::<u64>::with_reporter(64, 8, Arc::clone(&reporter) as Arc<dyn PoolReporter>)
        .expect("Failed to create pool");

    let mut held = Vec::new();
    for i in 0..9u64 {
        held.push(pool.alloc(i).unwrap());
    }

    let block_allocs = reporter
        .events()
        .iter()
        .filter(|event| matches!(event, Event::BlockAllocated { .. }))
        .count();
    assert_eq!(block_allocs, 2);

    // Releasing the only chunk of the tail block retires it.
    let mut slot = held.pop();
    unsafe { pool.release(&mut slot).unwrap() };

    let block_frees = reporter
        .events()
        .iter()
        .filter(|event| matches!(event, Event::BlockDeallocated { .. }))
        .count();
    assert_eq!(block_frees, 1);
    assert_eq!(pool.block_count(), 1);

    for ptr in held {
        let mut slot = Some(ptr);
        unsafe { pool.release(&mut slot).unwrap() };
    }
}

#[test]
fn test_leaked_chunks_are_reported_with_contents() {
    let reporter = Arc::new(RecordingReporter::default());
    let mut pool = TypedPool::<u64>::with_reporter(64, 8, Arc::clone(&reporter) as Arc<dyn PoolReporter>)
        .expect("Failed to create pool");

    let value = 0x1122_3344_5566_7788u64;
    let ptr = pool.alloc(value).unwrap();
    let address = ptr.as_ptr() as usize;

    // Dropped with one live chunk: the leak is reported, memory reclaimed.
    drop(pool);

    let leak = reporter
        .events()
        .into_iter()
        .find_map(|event| match event {
            Event::Leak { used_chunks, chunks } => Some((used_chunks, chunks)),
            _ => None,
        })
        .expect("a leak report must reach the sink");

    assert_eq!(leak.0, 1);
    assert_eq!(leak.1.len(), 1);
    assert_eq!(leak.1[0].0, address);
    assert_eq!(leak.1[0].1, value.to_ne_bytes().to_vec());
}
