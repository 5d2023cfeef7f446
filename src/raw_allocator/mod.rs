//! The raw allocator: placement, coalescing and the operation surface.
//!
//! A "raw allocator" hands out and takes back payload *offsets* into its
//! heap; pointer conversion and `Layout` concerns stay in the crate root.
//!
//! The heap is tiled into blocks, each a multiple of 8 bytes starting with
//! a 4-byte [`Header`](header::Header). Free blocks of size 16 and up are
//! kept in a segregated index of power-of-two size classes (see
//! [`index`]); placement is first fit across the classes, splitting the
//! found block and returning the tail to the index. When the index has
//! nothing suitable, the allocator places at the top of the heap: a free
//! block touching the break is folded back first (that is what the
//! sentinel bit is for) and the substrate only grows by the shortfall.
//!
//! Releasing a block always coalesces with both physical neighbors, so no
//! two free blocks are ever adjacent and boundary-tag lookups stay O(1).

mod check;
mod header;
mod heap;
mod index;

use self::header::State;
use self::heap::Heap;

use static_assertions::const_assert;

/// Alignment of every block size and position (and thus every payload).
pub(crate) const ALIGNMENT: usize = 8;
/// Size of one structure word: headers, footers, roots and links.
pub(crate) const WORD: usize = 4;
/// Number of segregated size classes.
pub(crate) const LIST_LEN: usize = 22;
/// Bytes reserved at the bottom of the heap for the index root words.
///
/// The word count is padded to odd so the first block starts at offset
/// ≡ 4 (mod 8), which puts every payload on an 8-byte boundary.
pub(crate) const LINK_AREA: usize = (LIST_LEN | 1) * WORD;
/// Minimum growth granularity of the heap.
pub(crate) const BLOCKSIZE: usize = 4096;
/// The null link. Block offsets are ≡ 4 (mod 8), so `1` never names one.
pub(crate) const NIL: u32 = 1;
/// Smallest possible block: header plus footer, nothing else.
pub(crate) const MIN_BLOCK: usize = 8;
/// Smallest block the free index tracks: header, two links, footer.
pub(crate) const MIN_INDEXED: usize = 16;
/// Largest request whose block size still fits the 32-bit header.
const MAX_REQUEST: usize = (u32::MAX & !0x7) as usize - ALIGNMENT;

const_assert!(BLOCKSIZE % ALIGNMENT == 0);
const_assert!(LINK_AREA % ALIGNMENT == WORD);
const_assert!(NIL as usize % WORD != 0);
const_assert!(MIN_INDEXED == WORD + 2 * WORD + WORD);

/// An error occurred when calling `release()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeError {
    /// There is a double-free detected: the block behind the given payload
    /// is already free.
    DoubleFreeDetected,
    /// The given payload does not name an allocation (it lies outside the
    /// block area or is not payload-aligned).
    AllocationNotFound,
}

/// Round up to the next multiple of [`ALIGNMENT`].
const fn align_up(n: usize) -> usize {
    (n + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

/// The single-threaded allocator core over an `N`-byte heap.
pub struct RawAllocator<const N: usize> {
    heap: Heap<N>,
}

impl<const N: usize> RawAllocator<N> {
    /// Create a new [`RawAllocator`] with a given heap size.
    ///
    /// # Panics
    /// This function panics if `N` is not a multiple of 8 or cannot hold
    /// the index root area plus one extension block.
    pub const fn new() -> Self {
        assert!(N % ALIGNMENT == 0, "heap size has to be divisible by 8");
        assert!(
            N >= LINK_AREA + BLOCKSIZE,
            "too small heap memory: the index roots plus one extension block must fit"
        );
        Self { heap: Heap::new() }
    }

    /// Allocate a block with room for `request` payload bytes.
    ///
    /// Returns the payload offset, or `None` if the request is zero, too
    /// large to encode, or the heap is exhausted. Exhaustion leaves the
    /// heap exactly as it was.
    pub fn allocate(&mut self, request: usize) -> Option<usize> {
        self.ensure_init();
        if request == 0 || request > MAX_REQUEST {
            return None;
        }
        let size = align_up(request + WORD);

        if let Some(offset) = self.find_fit(size) {
            self.unlink(offset);
            let remain = self.heap.header(offset).size() as usize - size;
            self.insert_free(offset + size, remain);
            self.heap.tag_allocated(offset, size);
            return Some(offset + WORD);
        }

        // Nothing indexed is big enough: place at the top of the heap. A
        // free block touching the break is folded into the new block, so
        // the substrate only grows by the shortfall. A trailing block that
        // could satisfy the request on its own would have been found by
        // the index search (except the unindexed 8-byte case, where the
        // sizes are equal), so `shortfall` can reach zero but never wrap.
        let high = self.heap.high();
        let trailing = if self.heap.trailing_free() {
            self.heap.prev_size(high)
        } else {
            0
        };
        let shortfall = size - trailing;
        if shortfall > 0 && self.heap.available() < shortfall.max(BLOCKSIZE) {
            // Growing is about to fail: bail out before touching the index
            // or the sentinel, so the failed call has no side effects.
            return None;
        }

        let mut offset = high;
        if trailing > 0 {
            offset -= trailing;
            if trailing != MIN_BLOCK {
                self.unlink(offset);
            }
            self.heap.mark_prev_allocated(high);
        }
        if shortfall > 0 {
            self.grow_heap(shortfall)?;
        }
        self.heap.tag_allocated(offset, size);
        Some(offset + WORD)
    }

    /// Release the allocation behind the given payload offset.
    ///
    /// The freed block is merged with free physical neighbors on both
    /// sides and the result goes back into the index.
    pub fn release(&mut self, payload: usize) -> Result<(), FreeError> {
        if payload < LINK_AREA + WORD
            || payload >= self.heap.high()
            || payload % ALIGNMENT != 0
        {
            return Err(FreeError::AllocationNotFound);
        }
        let offset = payload - WORD;
        let header = self.heap.header(offset);
        if header.state() != State::Allocated {
            return Err(FreeError::DoubleFreeDetected);
        }
        self.coalesce(offset, header.size() as usize);
        Ok(())
    }

    /// Resize the allocation behind `payload` to `request` payload bytes.
    ///
    /// Stays in place whenever the block already fits, can shrink, ends at
    /// the break, or can absorb a free successor; only otherwise does it
    /// move (allocate, copy, release). Returns the possibly new payload
    /// offset, or `None` on exhaustion; in that case the old allocation
    /// is untouched and still valid.
    pub fn resize(&mut self, payload: usize, request: usize) -> Option<usize> {
        debug_assert!(request > 0, "zero-size resizes are the caller's release");
        if request > MAX_REQUEST {
            return None;
        }
        let offset = payload - WORD;
        let header = self.heap.header(offset);
        debug_assert!(header.state() == State::Allocated);
        let old_size = header.size() as usize;
        let prev_free = header.prev_free();
        let size = align_up(request + WORD);

        if size == old_size {
            Some(payload)
        } else if size < old_size {
            // In-place shrink: re-tag the head and free the tail, merging
            // it with a free successor so coalescing stays complete.
            self.heap.tag_allocated(offset, size);
            if prev_free {
                self.heap.mark_prev_free(offset);
            }
            let next = offset + old_size;
            let mut tail = old_size - size;
            if next < self.heap.high() && self.heap.header(next).state() == State::Free {
                let next_size = self.heap.header(next).size() as usize;
                if next_size == MIN_BLOCK {
                    tail += MIN_BLOCK;
                } else {
                    self.unlink(next);
                    tail += next_size;
                }
            }
            self.insert_free(offset + size, tail);
            Some(payload)
        } else if offset + old_size == self.heap.high() {
            // The block ends at the break: grow the heap underneath it.
            self.grow_heap(size - old_size)?;
            self.heap.tag_allocated(offset, size);
            if prev_free {
                self.heap.mark_prev_free(offset);
            }
            Some(payload)
        } else if self.heap.header(offset + old_size).state() == State::Free
            && old_size + self.heap.header(offset + old_size).size() as usize >= size
        {
            // Absorb the free successor and split off what is left of it.
            let next = offset + old_size;
            let next_size = self.heap.header(next).size() as usize;
            if next_size != MIN_BLOCK {
                self.unlink(next);
            }
            let combined = old_size + next_size;
            self.heap.tag_allocated(offset, size);
            if prev_free {
                self.heap.mark_prev_free(offset);
            }
            self.insert_free(offset + size, combined - size);
            Some(payload)
        } else {
            // Pinned: move to a fresh block. The old block is released
            // only after the new allocation succeeded.
            let new_payload = self.allocate(request)?;
            self.heap.copy(payload, new_payload, old_size - WORD);
            let released = self.release(payload);
            debug_assert!(released.is_ok());
            Some(new_payload)
        }
    }

    /// Allocate a block for `count` elements of `size` bytes each and
    /// zero exactly those `count * size` bytes (not the rounded block).
    ///
    /// A product that overflows `usize` is treated as exhaustion.
    pub fn allocate_zeroed(&mut self, count: usize, size: usize) -> Option<usize> {
        self.ensure_init();
        let bytes = count.checked_mul(size)?;
        let payload = self.allocate(bytes)?;
        self.heap.fill(payload, bytes, 0);
        Some(payload)
    }

    /// Lay down the index root area on the first real use of the heap.
    ///
    /// Deferred out of `new` so that a freshly constructed allocator is
    /// all-uninitialized bytes (see [`Heap::new`]).
    fn ensure_init(&mut self) {
        if !self.heap.is_initialized() {
            self.heap.bootstrap();
        }
    }

    /// Merge the not-yet-inserted free region `[offset, offset + size)`
    /// with free physical neighbors and put the result into the index.
    fn coalesce(&mut self, offset: usize, size: usize) {
        let (mut offset, mut size) = (offset, size);
        if self.heap.header(offset).prev_free() {
            let prev_size = self.heap.prev_size(offset);
            offset -= prev_size;
            size += prev_size;
            if prev_size != MIN_BLOCK {
                self.unlink(offset);
            }
        }
        let next = offset + size;
        if next < self.heap.high() && self.heap.header(next).state() == State::Free {
            let next_size = self.heap.header(next).size() as usize;
            if next_size == MIN_BLOCK {
                size += MIN_BLOCK;
            } else {
                self.unlink(next);
                size += next_size;
            }
        }
        self.insert_free(offset, size);
    }

    /// Grow the heap by at least `size` bytes.
    ///
    /// Growth is [`BLOCKSIZE`]-granular: smaller requests extend by a full
    /// block and the surplus goes straight back into the free index.
    fn grow_heap(&mut self, size: usize) -> Option<()> {
        if size < BLOCKSIZE {
            self.heap.extend(BLOCKSIZE)?;
            let remain = BLOCKSIZE - size;
            self.insert_free(self.heap.high() - remain, remain);
        } else {
            self.heap.extend(size)?;
        }
        Some(())
    }

    /// A raw pointer to the payload at `offset`, for the facade.
    pub fn payload_ptr(&mut self, offset: usize) -> *mut u8 {
        self.heap.byte_ptr(offset)
    }

    /// Translate a user pointer back into a payload offset.
    ///
    /// Returns `None` for pointers outside the block area, which the
    /// facade treats as "nothing to do".
    pub fn offset_of(&self, ptr: *const u8) -> Option<usize> {
        let base = self.heap.base_addr();
        let addr = ptr as usize;
        if addr < base + LINK_AREA + WORD || addr >= base + self.heap.high() {
            return None;
        }
        Some(addr - base)
    }
}
