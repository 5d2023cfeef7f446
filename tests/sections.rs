//! This test ensures, that the allocator arena is not placed in `.data`.
//!
//! A `static` allocator embeds its whole arena, so where the linker puts
//! it matters a lot: variables in `.data` carry their initialization image
//! in the binary (and in flash, on embedded targets), while `.bss` only
//! costs its size at runtime. Since all but a handful of arena bytes are
//! uninitialized, an allocator in `.data` would bloat the binary by the
//! full arena size for nothing.
//!
//! This is why even the free-index root words are written lazily on first
//! use instead of in the `const` constructor: a single nonzero byte in the
//! initializer is enough to evict the whole value from `.bss`. The test
//! pins that property down by comparing the allocator's address against
//! the section boundary symbols of the default linker script.

use std::alloc::{GlobalAlloc, Layout};
use std::ptr;

static ALLOCATOR: segalloc::Allocator<{ 128 * 1024 * 1024 }> = segalloc::Allocator::new();

#[cfg(all(target_arch = "x86_64", target_os = "linux"))] // this is only tested on Linux
#[test]
fn arena_is_not_materialized_in_the_binary() {
    // use the allocator so it certainly remains in the binary
    // SAFETY: a plain allocate/release round trip, as intended
    unsafe {
        let layout = Layout::new::<u64>();
        let ptr = ALLOCATOR.alloc(layout);
        ALLOCATOR.dealloc(ptr, layout);
    }

    // symbols defined by the default linker script
    extern "C" {
        static __bss_start: u8;
        static _edata: u8;
    }
    let bss_start = unsafe { ptr::addr_of!(__bss_start) } as usize;
    let data_end = unsafe { ptr::addr_of!(_edata) } as usize;
    assert_eq!(bss_start, data_end, "test assumes .bss directly after .data");

    let allocator = ptr::addr_of!(ALLOCATOR) as usize;
    assert!(allocator >= bss_start, "allocator arena is placed in .data");
}
