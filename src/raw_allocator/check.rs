//! Consistency checking for the heap and the free index.
//!
//! [`RawAllocator::check_heap`] is a debugging aid meant to be called from
//! tests (or a paranoid caller) after arbitrary operations. It never
//! repairs anything: the first violated invariant aborts via `panic!`,
//! with the caller-supplied line number in the message so a failing test
//! sequence can tell its call sites apart.

use super::header::{Header, State};
use super::index::class_of;
use super::{RawAllocator, ALIGNMENT, LINK_AREA, LIST_LEN, MIN_BLOCK, MIN_INDEXED, NIL, WORD};

impl<const N: usize> RawAllocator<N> {
    /// Walk the block chain and every index list, panicking on the first
    /// inconsistency found.
    ///
    /// Checked are: block alignment and sizing, the walk terminating
    /// exactly at the break, previous-free bits (including the sentinel),
    /// header/footer agreement, full coalescing, link symmetry, link
    /// bounds, size-class membership, and agreement between the number of
    /// free blocks seen by walking and by traversing the index.
    pub fn check_heap(&self, line: u32) {
        if !self.heap.is_initialized() {
            // nothing exists yet, not even the index roots
            return;
        }
        self.check_block_chain(line);
        self.check_index(line);
    }

    fn check_block_chain(&self, line: u32) {
        let high = self.heap.high();

        // 1. geometry: blocks are aligned, minimally sized and tile the
        //    heap up to exactly the break
        let mut offset = LINK_AREA;
        while offset < high {
            if (offset + WORD) % ALIGNMENT != 0 {
                panic!("{line}: block address not aligned");
            }
            let size = self.heap.header(offset).size() as usize;
            if size < MIN_BLOCK {
                panic!("{line}: below minimum block size");
            }
            if size % ALIGNMENT != 0 {
                panic!("{line}: block size not aligned");
            }
            offset += size;
        }
        if offset != high {
            panic!("{line}: block walk missed the heap top");
        }

        // 2. tags: every previous-free bit reflects the predecessor, and
        //    free blocks big enough for a footer have a matching one
        let mut offset = LINK_AREA;
        let mut prev_was_free = false;
        while offset < high {
            let header = self.heap.header(offset);
            if offset != LINK_AREA && header.prev_free() != prev_was_free {
                panic!("{line}: previous-free bit disagrees with predecessor");
            }
            let size = header.size() as usize;
            if header.state() == State::Free && size >= MIN_INDEXED {
                let footer = Header::from_raw(self.heap.word(offset + size - WORD));
                if footer.size() != header.size() {
                    panic!("{line}: header and footer disagree");
                }
            }
            prev_was_free = header.state() == State::Free;
            offset += size;
        }
        if prev_was_free != self.heap.trailing_free() {
            panic!("{line}: sentinel disagrees with the last block");
        }

        // 3. coalescing is complete (the geometry pass above makes the
        //    block iterator safe to use here)
        let mut prev_was_free = false;
        for offset in self.heap.blocks() {
            let free = self.heap.header(offset).state() == State::Free;
            if free && prev_was_free {
                panic!("{line}: adjacent free blocks");
            }
            prev_was_free = free;
        }
    }

    fn check_index(&self, line: u32) {
        // 4. per list: offsets stay inside the block area, neighboring
        //    links point back at each other, and every member belongs to
        //    the class it is filed under
        for class in 0..LIST_LEN {
            let mut link = self.root(class);
            while link != NIL {
                let offset = link as usize;
                if offset < LINK_AREA || offset + MIN_INDEXED > self.heap.high() {
                    panic!("{line}: free list offset out of bounds");
                }
                if class_of(self.heap.header(offset).size()) != class {
                    panic!("{line}: free block in wrong size class");
                }
                let next = self.next_of(offset);
                if next != NIL && self.prev_of(next as usize) != link {
                    panic!("{line}: free list links inconsistent");
                }
                link = next;
            }
        }

        // 5. counting the heap walk against the index traversal catches
        //    blocks that are unreachable from the index (and, together
        //    with the class check above, most double insertions)
        let mut walked = 0_usize;
        let mut offset = LINK_AREA;
        while offset < self.heap.high() {
            let header = self.heap.header(offset);
            if header.state() == State::Free && header.size() as usize >= MIN_INDEXED {
                walked += 1;
            }
            offset += header.size() as usize;
        }
        let mut traversed = 0_usize;
        for class in 0..LIST_LEN {
            let mut link = self.root(class);
            while link != NIL {
                traversed += 1;
                link = self.next_of(link as usize);
            }
        }
        if walked != traversed {
            panic!("{line}: free block count mismatch");
        }
    }
}
