use std::{cmp, fmt, ptr::NonNull};

use log::debug;

use crate::{
    block::{BLOCK_ALIGN, BLOCK_HEADER_SIZE, Header, header_of, payload_of, write_header},
    freelist::FreeList,
    region::{GrowError, HeapRegion},
    utils::{align, checked_align},
};

/// Largest request we accept. Anything above cannot be described to the OS
/// once the header is added, so we refuse it before touching the arena.
const MAX_REQUEST: usize = isize::MAX as usize - BLOCK_HEADER_SIZE - BLOCK_ALIGN;

/// Errors of the `try_*` family of [`Heap`] operations.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// The arena could not grow to fit the request.
    #[error(transparent)]
    Grow(#[from] GrowError),
    /// `count * size` does not fit in a `usize`.
    #[error("{count} elements of {size} bytes overflow the address space")]
    Overflow { count: usize, size: usize },
    /// The request is larger than any block the heap can describe.
    #[error("a request of {requested} bytes exceeds the largest block size")]
    TooLarge { requested: usize },
}

/// A free slot as seen from the outside: where its payload starts and how many
/// bytes it can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeBlock {
    pub addr: NonNull<u8>,
    pub size: usize,
}

/// The allocation engine: a first-fit free list of recycled blocks on top of
/// a [`HeapRegion`] that only ever grows.
///
/// ```text
///            allocate(n)
///                 |
///                 v
///     +------------------------+   hit   +--------------------------------+
///     | first-fit on FreeList  | ------> | reuse whole, or split and keep |
///     +------------------------+         | the remainder on the FreeList  |
///                 | miss                 +--------------------------------+
///                 v
///     +------------------------+
///     | region.grow_by(H + n)  |
///     +------------------------+
/// ```
///
/// All state lives in this value, so independent heaps can coexist. The heap
/// itself does no locking; see [`crate::BrkAlloc`] for the shared version.
pub struct Heap<R: HeapRegion> {
    region: R,
    /// Boundary of the region when the heap was first used.
    start: Option<NonNull<u8>>,
    free_list: FreeList,
}

// The heap exclusively owns every header it points to.
unsafe impl<R: HeapRegion + Send> Send for Heap<R> {}

impl<R: HeapRegion> Heap<R> {
    pub const fn new(region: R) -> Self {
        Self {
            region,
            start: None,
            free_list: FreeList::new(),
        }
    }

    #[inline]
    pub fn region(&self) -> &R {
        &self.region
    }

    /// Where the arena started when the heap served its first request.
    #[inline]
    pub fn arena_start(&self) -> Option<NonNull<u8>> {
        self.start
    }

    /// Allocates a block of at least `size` bytes. Returns `None` when the
    /// arena cannot grow.
    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        self.try_allocate(size).ok()
    }

    /// Allocates `count * size` bytes, all of them set to zero.
    pub fn zero_allocate(&mut self, count: usize, size: usize) -> Option<NonNull<u8>> {
        self.try_zero_allocate(count, size).ok()
    }

    /// Same as [`Heap::allocate`] but tells why the request failed.
    pub fn try_allocate(&mut self, size: usize) -> Result<NonNull<u8>, HeapError> {
        let size = request_size(size)?;

        if self.start.is_none() {
            self.start = Some(self.region.boundary()?);
        }

        if let Some(block) = self.free_list.find_first_fit(size) {
            return Ok(unsafe { self.reuse(block, size) });
        }

        let block = self.grow(size)?;

        Ok(payload_of(block))
    }

    /// Same as [`Heap::zero_allocate`] but tells why the request failed.
    ///
    /// The whole usable capacity of the block is cleared, not only the
    /// `count * size` bytes asked for.
    pub fn try_zero_allocate(&mut self, count: usize, size: usize) -> Result<NonNull<u8>, HeapError> {
        let total = count
            .checked_mul(size)
            .ok_or(HeapError::Overflow { count, size })?;

        let ptr = self.try_allocate(total)?;

        unsafe {
            let capacity = header_of(ptr).as_ref().data.size;
            ptr.write_bytes(0, capacity);
        }

        Ok(ptr)
    }

    /// Gives the block behind `ptr` back to the heap. `None` is a no-op.
    ///
    /// The block is merged with free neighbours and recycled through the free
    /// list; the arena itself never shrinks.
    ///
    /// # Safety
    ///
    /// `ptr` must be `None` or a live pointer returned by this heap. Releasing
    /// twice or releasing foreign pointers is undefined behavior.
    pub unsafe fn release(&mut self, ptr: Option<NonNull<u8>>) {
        let Some(ptr) = ptr else {
            return;
        };

        unsafe {
            let mut block = header_of(ptr);
            debug_assert!(!block.as_ref().data.is_free, "block released twice");
            block.as_mut().data.is_free = true;

            if !block.as_ref().data.is_tombstone() {
                self.free_list.insert(block);
            }
        }
    }

    /// Changes the size of the block behind `ptr`.
    ///
    /// - `size == 0` releases `ptr` and returns `None`.
    /// - `ptr == None` is the same as [`Heap::allocate`].
    /// - A size that already fits returns `ptr` untouched; blocks never shrink.
    /// - Otherwise the content moves to a new block and the old one is
    ///   released. If the new block cannot be obtained, `None` is returned and
    ///   `ptr` stays allocated with its content intact.
    ///
    /// # Safety
    ///
    /// Same contract as [`Heap::release`].
    pub unsafe fn resize(&mut self, ptr: Option<NonNull<u8>>, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            unsafe { self.release(ptr) };
            return None;
        }

        let Some(old) = ptr else {
            return self.allocate(size);
        };

        let capacity = unsafe { self.usable_size(old) };
        if size <= capacity {
            return Some(old);
        }

        let new = self.allocate(size)?;

        unsafe {
            new.copy_from_nonoverlapping(old, cmp::min(capacity, size));
            self.release(Some(old));
        }

        Some(new)
    }

    /// Bytes that can be used through `ptr`, at least what was asked for.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live pointer returned by this heap.
    pub unsafe fn usable_size(&self, ptr: NonNull<u8>) -> usize {
        unsafe { header_of(ptr).as_ref().data.size }
    }

    /// Free slots in the order the allocator will consider them.
    pub fn free_blocks(&self) -> impl Iterator<Item = FreeBlock> + '_ {
        self.free_list.iter().map(|block| FreeBlock {
            addr: payload_of(block),
            size: unsafe { block.as_ref().data.size },
        })
    }

    /// Dumps the free list through the `log` facade at debug level.
    ///
    /// Never call this while holding the lock of a heap that is also the
    /// global allocator with a logger that allocates.
    pub fn log_free_list(&self) {
        if self.free_list.is_empty() {
            debug!("free list is currently empty");
            return;
        }

        for (slot, block) in self.free_blocks().enumerate() {
            debug!("free slot {} | size: {} | address: {:p}", slot + 1, block.size, block.addr);
        }
    }

    /// Takes `block` off the free list for a request of `size` bytes, splitting
    /// off the tail when it is big enough to be a block of its own.
    ///
    /// ```text
    ///  before:  | H | size          excess              |
    ///  after:   | H | size | H' | excess - H (free)     |
    /// ```
    ///
    /// Tails of at most one header are handed out with the block: they could
    /// never hold a header plus any payload.
    unsafe fn reuse(&mut self, mut block: Header, size: usize) -> NonNull<u8> {
        unsafe {
            debug_assert!(block.as_ref().data.is_free);
            self.free_list.remove(block);

            let excess = block.as_ref().data.size - size;

            if excess > BLOCK_HEADER_SIZE {
                block.as_mut().data.size = size;

                let tail = payload_of(block).add(size);
                let remainder = write_header(tail, excess - BLOCK_HEADER_SIZE, true);
                self.free_list.insert(remainder);
            }

            block.as_mut().data.is_free = false;
        }

        payload_of(block)
    }

    /// Pushes the arena boundary to fit a new used block of `size` bytes.
    ///
    /// Header and payload are requested together so a failure can't leave a
    /// header without payload behind. If something else moved the boundary to
    /// a misaligned address, the padding is requested too and skipped.
    ///
    /// The boundary may also move between the query and the growth. When
    /// that leaves the header misaligned the range is abandoned and we try
    /// again; every round consumes arena space, so this ends at the latest
    /// when the region is exhausted.
    fn grow(&mut self, size: usize) -> Result<Header, HeapError> {
        loop {
            let boundary = self.region.boundary()?.as_ptr() as usize;
            let padding = align(boundary, BLOCK_ALIGN) - boundary;

            let addr = self.region.grow_by(padding + BLOCK_HEADER_SIZE + size)?;
            let header = unsafe { addr.add(padding) };

            if header.as_ptr() as usize % BLOCK_ALIGN == 0 {
                return Ok(unsafe { write_header(header, size, false) });
            }
        }
    }
}

impl<R: HeapRegion> fmt::Debug for Heap<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("start", &self.start)
            .field("free_blocks", &self.free_list.len())
            .finish()
    }
}

/// Payload size actually reserved for a request of `size` bytes: at least one
/// alignment unit, rounded up to [`BLOCK_ALIGN`].
fn request_size(size: usize) -> Result<usize, HeapError> {
    checked_align(cmp::max(size, 1), BLOCK_ALIGN)
        .filter(|&aligned| aligned <= MAX_REQUEST)
        .ok_or(HeapError::TooLarge { requested: size })
}
