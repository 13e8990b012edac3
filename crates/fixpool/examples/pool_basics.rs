//! Fixed-chunk pool walkthrough
//!
//! Shows typed pool reuse, block growth and retirement, the free-list
//! dump, and the typed adapter over the global allocator.

use fixpool::{PoolAllocator, TypedPool};

fn main() {
    println!("=== Fixed-chunk pool ===\n");

    // 256-byte blocks of 8-byte chunks: 32 chunks per block.
    let mut pool = TypedPool::<u64>::new(256, 8).expect("Failed to create pool");
    println!(
        "block size: {} bytes, chunk size: {} bytes",
        pool.block_size(),
        pool.chunk_size()
    );

    let mut held = Vec::new();
    for i in 0..40u64 {
        held.push(pool.alloc(i).expect("pool can grow"));
    }
    println!("after 40 allocations: {} blocks", pool.block_count());

    let probe = held[0];
    println!(
        "head block: {} used / {} free chunks",
        pool.used_chunks_in_block(probe).unwrap(),
        pool.available_chunks_in_block(probe).unwrap(),
    );

    for ptr in held.drain(..) {
        let mut slot = Some(ptr);
        unsafe { pool.release(&mut slot).expect("chunk belongs to the pool") };
    }
    println!("after releasing everything: {} blocks", pool.block_count());

    let base = pool.block_address(None).expect("the pool always keeps a block");
    let dump = pool
        .dump_free_list(base.cast())
        .expect("the base address lies in the head block");
    println!(
        "free list holds {} chunks; head chunk at {:p}\n",
        dump.len(),
        dump[0].chunk
    );

    println!("=== Typed adapter ===\n");

    let alloc = PoolAllocator::<u64>::new();
    let values = alloc.allocate(8).expect("size class available");
    unsafe {
        for i in 0..8 {
            values.as_ptr().add(i).write(i as u64 * 11);
        }
        println!(
            "adapter allocation at {:p}, values[7] = {}",
            values,
            *values.as_ptr().add(7)
        );
        alloc.deallocate(values, 8);
    }
}
