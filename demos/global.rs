//! Runs a small program with [`BrkAlloc`] as the `#[global_allocator]`, so
//! every `Box`, `Vec` and `String` below lives in the program break arena.
//!
//! `RUST_LOG=debug cargo run --example global` also shows the free list.

use std::alloc::{GlobalAlloc, Layout};

use brkalloc::{BLOCK_ALIGN, BLOCK_HEADER_SIZE, BrkAlloc};

#[global_allocator]
static ALLOCATOR: BrkAlloc = BrkAlloc::new();

fn main() {
    env_logger::init();

    // A 10 byte block rounds up to one alignment unit. Once released, a 5 byte
    // request takes it whole: the leftover is too small for a header.
    let sliver = Box::new([7u8; 10]);
    let sliver_at = sliver.as_ptr();
    drop(sliver);

    let small = Box::new([9u8; 5]);
    println!(
        "sliver at {:p}, 5 byte box at {:p} ({})",
        sliver_at,
        small.as_ptr(),
        if sliver_at == small.as_ptr() { "reused" } else { "fresh" }
    );

    // Growing a vector goes through `realloc`: the content moves to a larger
    // block and the old one is recycled.
    let mut numbers: Vec<u64> = Vec::with_capacity(2);
    let mut last = numbers.as_ptr();
    for n in 0..64 {
        numbers.push(n * n);
        if numbers.as_ptr() != last {
            println!("capacity {:>3} now at {:p}", numbers.capacity(), numbers.as_ptr());
            last = numbers.as_ptr();
        }
    }
    println!("sum of squares below 64: {}", numbers.iter().sum::<u64>());

    let text = String::from("headers are ") + &BLOCK_HEADER_SIZE.to_string() + " bytes";
    println!("{text} at {:p}", text.as_ptr());

    // Stricter alignments than the block alignment are refused.
    let page = Layout::from_size_align(4096, 4096).unwrap();
    let refused = unsafe { ALLOCATOR.alloc(page) };
    println!("{}-aligned request for {} bytes: {:p}", page.align(), page.size(), refused);
    println!("payload alignment is {BLOCK_ALIGN}");

    drop(numbers);
    drop(small);

    ALLOCATOR.log_free_list();
}
