//! Randomized stress: thousands of mixed allocate/release/resize calls in
//! a shuffled order, with a full consistency check after every single
//! operation and byte patterns proving that no payload is ever clobbered.

use std::alloc::{GlobalAlloc, Layout};

static ALLOCATOR: segalloc::Allocator<{ 4 * 1024 * 1024 }> = segalloc::Allocator::new();

const OPERATIONS: usize = 10_000;
const MAX_SIZE: usize = 65_536;

struct Allocation {
    ptr: *mut u8,
    size: usize,
    fill: u8,
}

fn layout(size: usize) -> Layout {
    Layout::from_size_align(size, 8).unwrap()
}

fn verify(allocation: &Allocation) {
    // SAFETY: `ptr` is a live allocation of `size` bytes, filled below.
    let bytes = unsafe { std::slice::from_raw_parts(allocation.ptr, allocation.size) };
    assert!(
        bytes.iter().all(|&byte| byte == allocation.fill),
        "payload corrupted"
    );
}

fn release(allocation: Allocation) {
    verify(&allocation);
    // SAFETY: the allocation is live and dropped from the bookkeeping.
    unsafe { ALLOCATOR.dealloc(allocation.ptr, layout(allocation.size)) };
}

#[test]
fn random_operations_keep_the_heap_consistent() {
    let mut rng = fastrand::Rng::with_seed(0x5e6_a110c);
    let mut live: Vec<Allocation> = Vec::new();

    for _ in 0..OPERATIONS {
        match rng.u32(0..10) {
            // allocate and lay down a byte pattern
            0..=4 => {
                let size = rng.usize(1..=MAX_SIZE);
                let fill = rng.u8(..);
                // SAFETY: a fresh, non-zero-size allocation.
                let ptr = unsafe { ALLOCATOR.alloc(layout(size)) };
                if ptr.is_null() {
                    // arena exhausted: make room and carry on
                    if let Some(allocation) = live.pop() {
                        release(allocation);
                    }
                } else {
                    assert_eq!(ptr as usize % 8, 0, "payload not 8-aligned");
                    // SAFETY: the allocation is `size` bytes big.
                    unsafe { ptr.write_bytes(fill, size) };
                    live.push(Allocation { ptr, size, fill });
                }
            }
            // verify and release a random allocation
            5..=7 => {
                if !live.is_empty() {
                    let allocation = live.swap_remove(rng.usize(..live.len()));
                    release(allocation);
                }
            }
            // resize a random allocation, checking the surviving prefix
            _ => {
                if !live.is_empty() {
                    let index = rng.usize(..live.len());
                    let new_size = rng.usize(1..=MAX_SIZE);
                    let allocation = &mut live[index];
                    // SAFETY: resizing a live allocation with its layout.
                    let new_ptr = unsafe {
                        ALLOCATOR.realloc(allocation.ptr, layout(allocation.size), new_size)
                    };
                    if !new_ptr.is_null() {
                        assert_eq!(new_ptr as usize % 8, 0, "payload not 8-aligned");
                        let kept = allocation.size.min(new_size);
                        // SAFETY: at least `kept` bytes are valid either way.
                        let bytes = unsafe { std::slice::from_raw_parts(new_ptr, kept) };
                        assert!(
                            bytes.iter().all(|&byte| byte == allocation.fill),
                            "resize lost payload bytes"
                        );
                        allocation.ptr = new_ptr;
                        allocation.size = new_size;
                        // SAFETY: the new allocation is `new_size` bytes big.
                        unsafe { new_ptr.write_bytes(allocation.fill, new_size) };
                    }
                    // on failure the old allocation must still be intact;
                    // the verify on release will prove it
                }
            }
        }
        ALLOCATOR.check_heap(line!());
    }

    for allocation in live.drain(..) {
        release(allocation);
        ALLOCATOR.check_heap(line!());
    }
}
