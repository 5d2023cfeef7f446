#![no_std]

const HEAP_SIZE: usize = 4 * 1024 * 1024;

#[global_allocator]
static ALLOCATOR: segalloc::Allocator<HEAP_SIZE> = segalloc::Allocator::new();

extern crate alloc;

#[test]
fn vector_growth_funnels_through_realloc() {
    // an unhinted Vec reallocates on every capacity doubling
    let mut v = alloc::vec::Vec::new();
    for i in 0..10_000_u64 {
        v.push(i);
    }

    assert_eq!(v.len(), 10_000);
    assert_eq!(v[0], 0);
    assert_eq!(v[9_999], 9_999);
    assert_eq!(v.iter().sum::<u64>(), 9_999 * 10_000 / 2);
    ALLOCATOR.check_heap(line!());
}

#[test]
fn map_and_formatting() {
    let mut map = alloc::collections::BTreeMap::new();
    map.insert(1, "one");
    map.insert(2, "two");
    map.insert(3, "three");
    map.insert(0, "counting:");

    let line = alloc::format!("{} {}, {}, {}", map[&0], map[&1], map[&2], map[&3]);
    assert_eq!(line, "counting: one, two, three");
    ALLOCATOR.check_heap(line!());
}

#[test]
fn allocation_churn_reaches_a_steady_state() {
    // repeatedly allocate and drop; the heap must not creep upward, since
    // every round returns its blocks and coalescing makes them reusable
    for round in 0..100_usize {
        let boxed = alloc::boxed::Box::new([round; 64]);
        assert_eq!(boxed[63], round);

        let mut strings = alloc::vec::Vec::new();
        for i in 0..10 {
            strings.push(alloc::format!("round {round}, string {i}"));
        }
        assert!(strings[9].ends_with("string 9"));
    }
    ALLOCATOR.check_heap(line!());
}
