//! Integration tests for the typed adapter and the global allocator
//!
//! Every test keeps at least one adapter handle alive while it holds
//! memory; the global state is torn down only when the last handle in the
//! process drops.

use std::ptr::NonNull;

use fixpool::{PoolAllocator, PoolError};

#[test]
fn test_adapter_round_trip_multiple_classes() {
    let alloc_u32 = PoolAllocator::<u32>::new();
    let alloc_u64 = PoolAllocator::<u64>::new();
    let alloc_str = PoolAllocator::<String>::new();

    unsafe {
        let quads = alloc_u32.allocate(4).expect("u32 allocation failed");
        for i in 0..4 {
            quads.as_ptr().add(i).write(0xddff_bbcc ^ i as u32);
        }

        let longs = alloc_u64.allocate(3).expect("u64 allocation failed");
        for i in 0..3 {
            longs.as_ptr().add(i).write(0xddff_bbcc_ddff_bbcc ^ i as u64);
        }

        let strings = alloc_str.allocate(3).expect("string allocation failed");
        for i in 0..3 {
            strings
                .as_ptr()
                .add(i)
                .write(format!("string{i} string{i} string{i}"));
        }

        // More traffic before verifying: values must survive further
        // allocations in other size classes.
        let one = alloc_u64.allocate(1).expect("u64 allocation failed");
        one.as_ptr().write(41);

        for i in 0..4 {
            assert_eq!(*quads.as_ptr().add(i), 0xddff_bbcc ^ i as u32);
        }
        for i in 0..3 {
            assert_eq!(*longs.as_ptr().add(i), 0xddff_bbcc_ddff_bbcc ^ i as u64);
        }
        for i in 0..3 {
            assert_eq!(
                *strings.as_ptr().add(i),
                format!("string{i} string{i} string{i}")
            );
        }
        assert_eq!(*one.as_ptr(), 41);

        for i in 0..3 {
            std::ptr::drop_in_place(strings.as_ptr().add(i));
        }
        alloc_str.deallocate(strings, 3);
        alloc_u32.deallocate(quads, 4);
        alloc_u64.deallocate(longs, 3);
        alloc_u64.deallocate(one, 1);
    }
}

#[test]
fn test_all_adapters_compare_equal() {
    let first = PoolAllocator::<u32>::new();
    let second = PoolAllocator::<u64>::new();
    let third = first.clone();

    // One shared global pool behind every handle.
    assert!(first == second);
    assert!(first == third);
}

#[test]
fn test_zero_sized_requests_use_dangling_pointers() {
    let alloc = PoolAllocator::<u64>::new();
    let empty = alloc.allocate(0).unwrap();
    assert_eq!(empty, NonNull::dangling());
    unsafe { alloc.deallocate(empty, 0) };

    let unit = PoolAllocator::<()>::new();
    let zst = unit.allocate(5).unwrap();
    assert_eq!(zst, NonNull::dangling());
    unsafe { unit.deallocate(zst, 5) };
}

#[test]
fn test_array_length_overflow_is_rejected() {
    let alloc = PoolAllocator::<u64>::new();
    let err = alloc.allocate(usize::MAX / 8 + 1).unwrap_err();
    assert!(matches!(err, PoolError::ArrayLength { .. }));
    assert!(err.to_string().contains("array length"));
}

#[test]
fn test_deallocate_without_matching_pool_is_a_noop() {
    let alloc = PoolAllocator::<u64>::new();

    // 100 elements map to a size class no pool was created for; the call
    // must not touch the pointee.
    let mut sentinel = 0xabcd_ef01u64;
    unsafe { alloc.deallocate(NonNull::from(&mut sentinel), 100) };
    assert_eq!(sentinel, 0xabcd_ef01);

    // The allocator still serves requests afterwards.
    let ptr = alloc.allocate(1).unwrap();
    unsafe { alloc.deallocate(ptr, 1) };
}

#[test]
fn test_last_handle_tears_down_and_next_recreates() {
    {
        let alloc = PoolAllocator::<u64>::new();
        let ptr = alloc.allocate(2).unwrap();
        unsafe { alloc.deallocate(ptr, 2) };
    }

    // Whatever handles other tests hold, constructing a fresh adapter here
    // must yield a working allocator again.
    let alloc = PoolAllocator::<u64>::new();
    let ptr = alloc.allocate(2).unwrap();
    unsafe {
        ptr.as_ptr().write(7);
        assert_eq!(*ptr.as_ptr(), 7);
        alloc.deallocate(ptr, 2);
    }
}

#[test]
fn test_clone_keeps_the_global_state_alive() {
    let first = PoolAllocator::<u32>::new();
    let second = first.clone();

    let ptr = second.allocate(8).unwrap();
    drop(first);

    unsafe {
        ptr.as_ptr().write(0xaaff_bbcc);
        assert_eq!(*ptr.as_ptr(), 0xaaff_bbcc);
        second.deallocate(ptr, 8);
    }
}

#[test]
fn test_concurrent_adapters() {
    use std::thread;

    let mut handles = vec![];
    for t in 0..4u64 {
        handles.push(thread::spawn(move || {
            let alloc = PoolAllocator::<u64>::new();
            let mut held = Vec::new();

            for i in 0..100u64 {
                let ptr = alloc.allocate(2).unwrap();
                let value = t * 1000 + i;
                unsafe { ptr.as_ptr().write(value) };
                held.push((ptr, value));
            }

            for (ptr, value) in held {
                unsafe {
                    assert_eq!(*ptr.as_ptr(), value);
                    alloc.deallocate(ptr, 2);
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_allocation_is_size_class_aligned() {
    let alloc = PoolAllocator::<u8>::new();

    // 100 bytes round up to the 128-byte class; the chunk is aligned to it.
    let ptr = alloc.allocate(100).unwrap();
    assert_eq!(ptr.as_ptr() as usize % 128, 0);
    unsafe { alloc.deallocate(ptr, 100) };
}
