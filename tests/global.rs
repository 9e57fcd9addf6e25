//! Drives `BrkAlloc` through its raw entry points and through `GlobalAlloc`,
//! over the real program break. Every allocator here is a fresh one, so the
//! tests are serialized to keep their growth from interleaving.
#![cfg(unix)]

use std::{
    alloc::{GlobalAlloc, Layout},
    ptr, slice,
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use brkalloc::{BLOCK_ALIGN, BrkAlloc};

static SERIAL: Mutex<()> = Mutex::new(());

#[test]
fn raw_and_global_entry_points() {
    let _serial = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
    let alloc = BrkAlloc::new();

    // A released sliver is handed out again whole.
    let sliver = alloc.allocate(10);
    assert!(!sliver.is_null());
    unsafe { alloc.release(sliver) };
    assert_eq!(alloc.allocate(5), sliver);

    unsafe {
        alloc.release(ptr::null_mut());
        assert!(alloc.resize(ptr::null_mut(), 0).is_null());
    }

    assert!(alloc.zero_allocate(usize::MAX, 2).is_null());

    let over_aligned = Layout::from_size_align(64, 64).unwrap();
    assert!(unsafe { alloc.alloc(over_aligned) }.is_null());
    assert!(unsafe { alloc.alloc_zeroed(over_aligned) }.is_null());

    let layout = Layout::from_size_align(100, 8).unwrap();

    unsafe {
        let zeroed = alloc.alloc_zeroed(layout);
        assert!(!zeroed.is_null());
        assert_eq!(zeroed as usize % BLOCK_ALIGN, 0);
        assert!(slice::from_raw_parts(zeroed, 100).iter().all(|&byte| byte == 0));

        for (i, byte) in slice::from_raw_parts_mut(zeroed, 100).iter_mut().enumerate() {
            *byte = i as u8;
        }

        let grown = alloc.realloc(zeroed, layout, 1000);
        assert!(!grown.is_null());
        assert_eq!(grown as usize % BLOCK_ALIGN, 0);
        assert!(
            slice::from_raw_parts(grown, 100)
                .iter()
                .enumerate()
                .all(|(i, &byte)| byte == i as u8)
        );

        // Fits already, the block stays where it is.
        let same = alloc.realloc(grown, Layout::from_size_align(1000, 8).unwrap(), 400);
        assert_eq!(same, grown);

        alloc.dealloc(same, Layout::from_size_align(400, 8).unwrap());

        let from_null = alloc.resize(ptr::null_mut(), 24);
        assert!(!from_null.is_null());
        assert!(alloc.resize(from_null, 0).is_null());
    }
}

static SLOTS: AtomicUsize = AtomicUsize::new(0);
static SLOT_SUM: AtomicUsize = AtomicUsize::new(0);
static HIGHEST_SLOT: AtomicUsize = AtomicUsize::new(0);
static EMPTY: AtomicUsize = AtomicUsize::new(0);

/// Counts the free-list dump lines instead of printing them.
struct SlotCounter;

impl log::Log for SlotCounter {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let line = record.args().to_string();

        if line == "free list is currently empty" {
            EMPTY.fetch_add(1, Ordering::SeqCst);
            return;
        }

        let Some(rest) = line.strip_prefix("free slot ") else {
            return;
        };
        let Some(slot) = rest.split(' ').next().and_then(|n| n.parse::<usize>().ok()) else {
            return;
        };

        SLOTS.fetch_add(1, Ordering::SeqCst);
        SLOT_SUM.fetch_add(slot, Ordering::SeqCst);
        HIGHEST_SLOT.fetch_max(slot, Ordering::SeqCst);
    }

    fn flush(&self) {}
}

static LOGGER: SlotCounter = SlotCounter;

fn reset_counters() {
    for counter in [&SLOTS, &SLOT_SUM, &HIGHEST_SLOT, &EMPTY] {
        counter.store(0, Ordering::SeqCst);
    }
}

/// A fresh allocator with exactly `slots` separate free blocks.
fn with_free_slots(slots: usize) -> BrkAlloc {
    let alloc = BrkAlloc::new();

    let blocks: Vec<*mut u8> = (0..2 * slots).map(|_| alloc.allocate(16)).collect();
    assert!(blocks.iter().all(|block| !block.is_null()));

    // Odd blocks stay live and keep the released ones apart.
    for block in blocks.iter().step_by(2) {
        unsafe { alloc.release(*block) };
    }

    alloc
}

#[test]
fn free_list_dump_spans_batches() {
    let _serial = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);

    let _ = log::set_logger(&LOGGER);
    log::set_max_level(log::LevelFilter::Debug);

    reset_counters();
    BrkAlloc::new().log_free_list();
    assert_eq!(EMPTY.load(Ordering::SeqCst), 1);
    assert_eq!(SLOTS.load(Ordering::SeqCst), 0);

    for slots in [1, 31, 32, 33, 40, 64, 65] {
        let alloc = with_free_slots(slots);

        reset_counters();
        alloc.log_free_list();

        assert_eq!(SLOTS.load(Ordering::SeqCst), slots, "{slots} slots");
        assert_eq!(HIGHEST_SLOT.load(Ordering::SeqCst), slots, "{slots} slots");
        assert_eq!(SLOT_SUM.load(Ordering::SeqCst), slots * (slots + 1) / 2, "{slots} slots");
        assert_eq!(EMPTY.load(Ordering::SeqCst), 0, "{slots} slots");
    }
}
