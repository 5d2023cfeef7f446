//! The segregated free index.
//!
//! Free blocks of size 16 and up are kept in [`LIST_LEN`] doubly-linked
//! lists, one per power-of-two size class: `[2^4, 2^5)` up to
//! `[2^25, ∞)`. The lists are intrusive: the links live in the first two
//! payload words of each free block, and the list heads are the root
//! words at the bottom of the heap, so the whole index is part of the heap
//! image itself. Links are byte offsets from the heap bottom; [`NIL`]
//! marks list ends and empty roots.
//!
//! Size-8 blocks cannot hold links on top of header and footer. They are
//! written in place and never indexed; only physical-neighbor coalescing
//! picks them up again.

use super::{RawAllocator, LIST_LEN, MIN_BLOCK, MIN_INDEXED, NIL, WORD};

/// The size class of an indexable block size.
pub(super) fn class_of(size: u32) -> usize {
    debug_assert!(size >= MIN_INDEXED as u32);
    let class = (27 - size.leading_zeros()) as usize;
    // everything from 2^25 up shares the last class
    class.min(LIST_LEN - 1)
}

impl<const N: usize> RawAllocator<N> {
    pub(super) fn root(&self, class: usize) -> u32 {
        self.heap.word(class * WORD)
    }

    fn set_root(&mut self, class: usize, link: u32) {
        self.heap.set_word(class * WORD, link);
    }

    pub(super) fn prev_of(&self, offset: usize) -> u32 {
        self.heap.word(offset + WORD)
    }

    pub(super) fn next_of(&self, offset: usize) -> u32 {
        self.heap.word(offset + 2 * WORD)
    }

    fn set_prev(&mut self, offset: usize, link: u32) {
        self.heap.set_word(offset + WORD, link);
    }

    fn set_next(&mut self, offset: usize, link: u32) {
        self.heap.set_word(offset + 2 * WORD, link);
    }

    /// Record the free region `[offset, offset + size)` and fix up the
    /// successor's previous-free bit.
    ///
    /// Size 0 means "there is no region": the caller placed an allocation
    /// flush against its successor, which therefore only needs its bit
    /// cleared. Size 8 writes the degenerate block without touching the
    /// index. Everything else is tagged free and pushed onto the head of
    /// its size-class list.
    pub(super) fn insert_free(&mut self, offset: usize, size: usize) {
        if size == 0 {
            self.heap.mark_prev_allocated(offset);
            return;
        }
        if size == MIN_BLOCK {
            self.heap.tag_free_degenerate(offset);
            self.heap.mark_prev_free(offset + MIN_BLOCK);
            return;
        }
        self.heap.tag_free(offset, size);
        let class = class_of(size as u32);
        let head = self.root(class);
        if head != NIL {
            self.set_prev(head as usize, offset as u32);
        }
        self.set_next(offset, head);
        self.set_prev(offset, NIL);
        self.set_root(class, offset as u32);
        self.heap.mark_prev_free(offset + size);
    }

    /// First fit: the first indexed block of at least `size` bytes, taken
    /// from the lowest class that can hold the request.
    pub(super) fn find_fit(&self, size: usize) -> Option<usize> {
        let want = size.max(MIN_INDEXED);
        for class in class_of(want as u32)..LIST_LEN {
            let mut link = self.root(class);
            while link != NIL {
                let offset = link as usize;
                if self.heap.header(offset).size() as usize >= want {
                    return Some(offset);
                }
                link = self.next_of(offset);
            }
        }
        None
    }

    /// Unlink an indexed block in O(1) through its in-place links.
    pub(super) fn unlink(&mut self, offset: usize) {
        let prev = self.prev_of(offset);
        let next = self.next_of(offset);
        if prev == NIL {
            let class = class_of(self.heap.header(offset).size());
            self.set_root(class, next);
        } else {
            self.set_next(prev as usize, next);
        }
        if next != NIL {
            self.set_prev(next as usize, prev);
        }
    }
}
