//! Segregated-fit memory allocator for grow-upward heaps
//!
//! This crate provides a single type called [`Allocator`]: a boundary-tag
//! allocator over a fixed arena of `N` bytes that it grows into `sbrk`-style,
//! one coarse extension at a time. It implements the
//! [`core::alloc::GlobalAlloc`]-trait, which is required to use the
//! [`alloc`-crate][alloc] on `#![no_std]`-targets. Freed blocks are kept in
//! segregated size-class lists, so allocation does not degrade into a linear
//! heap scan as the number of blocks grows, and neighboring free blocks are
//! always merged eagerly.
//!
//! # Usage
//! Declare a static allocator with the arena size of your choice (here 64K)
//! and mark it as the global allocator:
//! ```no_run
//! #[global_allocator]
//! static ALLOCATOR: segalloc::Allocator<65536> = segalloc::Allocator::new();
//!
//! extern crate alloc;
//! ```
//! Afterwards the usual collections (`alloc::vec::Vec`,
//! `alloc::collections::BTreeMap`, …) just work. The arena size has to be a
//! multiple of 8 and large enough for the index area plus one extension
//! block (4K), so 8192 is the practical minimum.
//!
//! # Implementation
//! The arena is split into an index area and a chain of *blocks*. Every
//! block starts with a 4-byte header encoding its size, whether it is
//! allocated, and whether its left neighbor is free. An allocated block is
//! just header plus payload; the user pointer is `block + 4`:
//! ```text
//! +--------+-----------------------------------+
//! | header | payload ...                       |
//! +--------+-----------------------------------+
//! ```
//! A free block additionally carries two link words, tying it into the
//! doubly-linked list of its size class, and repeats its size in a footer:
//! ```text
//! +--------+------+------+--- ... ---+--------+
//! | header | prev | next |           | footer |
//! +--------+------+------+--- ... ---+--------+
//! ```
//! The footer is what makes releasing O(1): when a block is freed, the
//! header bit says whether the left neighbor is free, and if so the
//! neighbor's footer (sitting directly below the freed block) says where
//! it starts. Merging to the right just reads the next header. An 8-byte
//! free block is a degenerate case with only header and footer; it cannot
//! hold links, stays out of the index, and is only ever reclaimed by a
//! neighbor merging with it.
//!
//! Free blocks of size 16 and up are indexed in 22 size classes
//! (`[2^4, 2^5)` through `[2^25, ∞)`). Allocation searches the classes
//! first fit, splits the found block and returns the tail to the index.
//! When the index has nothing, the allocator grows the arena at the top,
//! folding a trailing free block back in first so that only the shortfall
//! is actually new memory. Growth happens in 4K steps; the surplus of a
//! step becomes a free block immediately.
//!
//! Payloads are always 8-aligned. Requests with a stricter `Layout`
//! alignment are *refused* (null), because the release path recovers the
//! header at `pointer - 4` and an alignment-adjusted pointer would break
//! that. Use a different allocator if you need over-aligned memory.
//!
//! For debugging there is [`Allocator::check_heap`], which walks the whole
//! arena and the free index and panics on the first violated invariant.
//!
//! [alloc]: https://doc.rust-lang.org/alloc/index.html
#![cfg_attr(not(test), no_std)]
#![warn(unsafe_op_in_unsafe_fn)]
#![warn(clippy::undocumented_unsafe_blocks)]

mod raw_allocator;
use raw_allocator::{RawAllocator, ALIGNMENT};

use core::alloc::{GlobalAlloc, Layout};
use core::ptr;

/// The segregated-fit memory allocator.
///
/// This is the core type of this crate: an allocator over a fixed arena of
/// `N` bytes, which it claims piece by piece as allocations demand it.
/// Since the arena is part of the allocator value, a `static` allocator
/// counts toward static memory and the heap can never sprawl beyond the
/// chosen bound.
///
/// Its usage is simple: declare a static and apply the
/// `#[global_allocator]`-attribute. The arena size here is 64K; adjust it
/// to your needs.
/// ```no_run
/// #[global_allocator]
/// static ALLOCATOR: segalloc::Allocator<65536> = segalloc::Allocator::new();
/// ```
/// Also please refer to the [crate-level](crate)-documentation for the
/// block format and the alignment limitation.
pub struct Allocator<const N: usize> {
    /// The allocator core.
    ///
    /// The core is single-threaded and works on offsets; it is protected
    /// by a `spin::Mutex` to make it usable with shared references
    /// (requirement of [`GlobalAlloc`]).
    raw: spin::Mutex<RawAllocator<N>>,
}

impl<const N: usize> Allocator<N> {
    /// Create a new [`Allocator`].
    ///
    /// This function is a `const fn`, therefore you can call it directly
    /// when creating the allocator.
    ///
    /// # Panics
    /// This function will panic, if the arena size `N` is not a multiple
    /// of 8 or too small to hold the free-index area plus one 4K
    /// extension block.
    #[must_use = "assign the allocator to a static variable and apply the `#[global_allocator]`-attribute to make it the global allocator"]
    pub const fn new() -> Self {
        let raw = spin::Mutex::new(RawAllocator::new());
        Self { raw }
    }

    /// Walk the heap and the free index, asserting every structural
    /// invariant.
    ///
    /// This is a debugging aid: call it after operations you suspect, with
    /// `line!()` as the argument, and the panic message of the first
    /// violated invariant will quote that line number.
    ///
    /// # Panics
    /// Panics if any invariant is violated.
    pub fn check_heap(&self, line: u32) {
        self.raw.lock().check_heap(line);
    }
}

// SAFETY: the implementation adheres to the layout contract: returned
// pointers are valid for `layout.size()` bytes and satisfy every alignment
// it supports (stricter alignments are refused with a null pointer, which
// the contract permits). The methods do not unwind: release errors are
// swallowed deliberately and the checker is never called from here.
unsafe impl<const N: usize> GlobalAlloc for Allocator<N> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }
        let mut raw = self.raw.lock();
        match raw.allocate(layout.size()) {
            Some(offset) => raw.payload_ptr(offset),
            None => ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        // A pointer this allocator never handed out (including null) maps
        // to no offset and is ignored. Genuine release errors cannot be
        // reported either (allocators must not unwind), so they are
        // dropped as well.
        let mut raw = self.raw.lock();
        if let Some(offset) = raw.offset_of(ptr) {
            let _ = raw.release(offset);
        }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }
        let mut raw = self.raw.lock();
        match raw.allocate_zeroed(layout.size(), 1) {
            Some(offset) => raw.payload_ptr(offset),
            None => ptr::null_mut(),
        }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }
        if ptr.is_null() {
            // SAFETY: same contract as the incoming call, minus the old
            // allocation that does not exist; `layout.align()` is a valid
            // alignment by construction.
            return unsafe {
                self.alloc(Layout::from_size_align_unchecked(new_size, layout.align()))
            };
        }
        if new_size == 0 {
            // SAFETY: `ptr` denotes a live allocation per the contract.
            unsafe { self.dealloc(ptr, layout) };
            return ptr::null_mut();
        }
        let mut raw = self.raw.lock();
        match raw
            .offset_of(ptr)
            .and_then(|offset| raw.resize(offset, new_size))
        {
            Some(offset) => raw.payload_ptr(offset),
            None => ptr::null_mut(),
        }
    }
}
