//! Drives a heap over the process arena by hand and dumps the free list after
//! every step. Run with `RUST_LOG=debug cargo run --example basic`.

use std::ptr::NonNull;

use brkalloc::{Heap, SystemRegion};

fn log_alloc(label: &str, size: usize, addr: Option<NonNull<u8>>) {
    println!("[{label}] requested {size} bytes, received {addr:?}");
}

fn main() {
    env_logger::init();

    let mut heap = Heap::new(SystemRegion::new());

    let a = heap.allocate(64);
    log_alloc("a", 64, a);

    let b = heap.allocate(96);
    log_alloc("b", 96, b);

    let c = heap.allocate(16);
    log_alloc("c", 16, c);

    println!("arena started at {:?}", heap.arena_start());

    unsafe {
        heap.release(a);
        heap.log_free_list();

        // `b` follows `a` in the arena, so both merge into a single free block.
        heap.release(b);
        heap.log_free_list();
    }

    // Fits exactly in the merged block: a's payload, b's header and b's payload.
    let merged = heap.allocate(64 + brkalloc::BLOCK_HEADER_SIZE + 96);
    log_alloc("merged", 64 + brkalloc::BLOCK_HEADER_SIZE + 96, merged);
    println!("reused the merged block: {}", merged == a);

    let zeroed = heap.zero_allocate(8, 4);
    log_alloc("zeroed", 32, zeroed);

    unsafe {
        let grown = heap.resize(zeroed, 512);
        log_alloc("grown", 512, grown);
        heap.log_free_list();

        heap.release(grown);
        heap.release(merged);
        heap.release(c);
        heap.log_free_list();
    }
}
