//! A heap memory manager built on a single arena that only grows.
//!
//! Every block in the arena is prefixed by a header. Released blocks are kept
//! on a free list, merged with free neighbours, and handed out again first-fit
//! before the arena is asked to grow:
//!
//! ```text
//!  arena start                                               boundary
//!      |                                                         |
//!      v                                                         v
//!      +---+-------+---+--------------+---+-------+---+----------+
//!      | H | used  | H | free         | H | used  | H | free     |
//!      +---+-------+---+--------------+---+-------+---+----------+
//!                    ^                              ^
//!                    +---------- free list ---------+
//! ```
//!
//! [`Heap`] is the engine and works over any [`HeapRegion`]: the process
//! heap ([`SystemRegion`]) or an owned buffer ([`BufferRegion`]). [`BrkAlloc`]
//! puts one heap over the system region behind a lock so it can be used as the
//! `#[global_allocator]`.
//!
//! The allocation path never logs: a logger that allocates would re-enter the
//! allocator. [`Heap::log_free_list`] is there for debugging.

use std::{
    alloc::{GlobalAlloc, Layout},
    ptr::{self, NonNull},
    sync::{Mutex, MutexGuard, PoisonError},
};

mod block;
mod freelist;
mod heap;
mod kernel;
mod list;
mod region;
mod utils;

#[cfg(all(unix, feature = "c-abi"))]
mod ffi;

pub use block::{BLOCK_ALIGN, BLOCK_HEADER_SIZE};
pub use heap::{FreeBlock, Heap, HeapError};
pub use kernel::SystemRegion;
pub use region::{BufferRegion, GrowError, HeapRegion};

#[cfg(unix)]
pub use kernel::Sbrk;

#[cfg(windows)]
pub use kernel::{DEFAULT_RESERVE, VirtualArena};

/// Process-wide allocator: one [`Heap`] over the [`SystemRegion`], every
/// entry point serialized by a single mutex.
///
/// ```rust,ignore
/// use brkalloc::BrkAlloc;
///
/// #[global_allocator]
/// static ALLOCATOR: BrkAlloc = BrkAlloc::new();
/// ```
///
/// Raw pointers are used as in C: null is both "no pointer" and "failure".
pub struct BrkAlloc {
    heap: Mutex<Heap<SystemRegion>>,
}

impl BrkAlloc {
    pub const fn new() -> Self {
        Self {
            heap: Mutex::new(Heap::new(SystemRegion::new())),
        }
    }

    /// Panicking inside the allocator would abort the process, so a poisoned
    /// lock is taken over as is.
    fn lock(&self) -> MutexGuard<'_, Heap<SystemRegion>> {
        self.heap.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// See [`Heap::allocate`].
    pub fn allocate(&self, size: usize) -> *mut u8 {
        into_raw(self.lock().allocate(size))
    }

    /// See [`Heap::zero_allocate`].
    pub fn zero_allocate(&self, count: usize, size: usize) -> *mut u8 {
        into_raw(self.lock().zero_allocate(count, size))
    }

    /// See [`Heap::resize`].
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live pointer returned by this allocator.
    pub unsafe fn resize(&self, ptr: *mut u8, size: usize) -> *mut u8 {
        into_raw(unsafe { self.lock().resize(NonNull::new(ptr), size) })
    }

    /// See [`Heap::release`].
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live pointer returned by this allocator.
    pub unsafe fn release(&self, ptr: *mut u8) {
        unsafe { self.lock().release(NonNull::new(ptr)) }
    }

    /// Dumps the free list through the `log` facade at debug level.
    ///
    /// Slots are copied out in small batches and logged with the lock released,
    /// so neither this method nor the logger allocate while the heap is locked.
    pub fn log_free_list(&self) {
        const BATCH: usize = 32;

        let mut logged = 0;

        loop {
            let mut batch = [None; BATCH];
            for (slot, block) in self.lock().free_blocks().skip(logged).take(BATCH).enumerate() {
                batch[slot] = Some(block);
            }

            let blocks = batch.iter().map_while(|block| *block);
            let mut count = 0;

            for block in blocks {
                count += 1;
                log::debug!(
                    "free slot {} | size: {} | address: {:p}",
                    logged + count,
                    block.size,
                    block.addr
                );
            }

            if logged == 0 && count == 0 {
                log::debug!("free list is currently empty");
            }

            logged += count;

            if count < BATCH {
                return;
            }
        }
    }
}

impl Default for BrkAlloc {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn into_raw(ptr: Option<NonNull<u8>>) -> *mut u8 {
    ptr.map_or(ptr::null_mut(), NonNull::as_ptr)
}

/// Payloads are aligned to [`BLOCK_ALIGN`]; stricter layouts are refused
/// with a null pointer.
unsafe impl GlobalAlloc for BrkAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > BLOCK_ALIGN {
            return ptr::null_mut();
        }

        self.allocate(layout.size())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        unsafe { self.release(ptr) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if layout.align() > BLOCK_ALIGN {
            return ptr::null_mut();
        }

        self.zero_allocate(1, layout.size())
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() > BLOCK_ALIGN {
            return ptr::null_mut();
        }

        unsafe { self.resize(ptr, new_size) }
    }
}
