use std::{
    alloc::{self, Layout},
    ptr::NonNull,
};

use log::debug;

/// Alignment of the buffer backing a [`BufferRegion`]. A page is more than any
/// header needs, and makes the arena look like what the kernel would give us.
const BUFFER_ALIGN: usize = 4096;

/// Reasons why a [`HeapRegion`] could not hand out more memory.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowError {
    /// The arena has no room left (or the OS refused to move the boundary).
    #[error("the arena cannot grow by {requested} bytes")]
    Exhausted { requested: usize },
    /// The request cannot even be expressed to the OS.
    #[error("a growth of {requested} bytes exceeds the addressable range")]
    TooLarge { requested: usize },
    /// The backing address range could not be obtained at all.
    #[error("the arena could not be reserved")]
    Reserve,
}

/// The single growable arena a [`crate::Heap`] carves its blocks from.
///
/// This trait provides an abstraction over the low level memory primitive, the
/// allocator only ever needs to know where the arena ends and how to push
/// that end further:
///
/// ```text
///   arena start                              boundary
///        |                                       |
///        v                                       v
///        +---------+---------+-------------------+ - - - - - - +
///        | block   | block   | block             |  grow_by(n) |
///        +---------+---------+-------------------+ - - - - - - +
///                                                ^
///                                                +-- returned by grow_by
/// ```
///
/// # Safety
///
/// Implementors must guarantee that the range returned by
/// [`HeapRegion::grow_by`] is valid for reads and writes of exactly `len`
/// bytes, does not overlap any range returned before, and stays valid for as
/// long as the region value lives.
pub unsafe trait HeapRegion {
    /// Returns the current upper boundary of the arena without growing it.
    fn boundary(&mut self) -> Result<NonNull<u8>, GrowError>;

    /// Extends the arena by exactly `len` bytes and returns a pointer to the
    /// start of the newly added range (the previous boundary).
    fn grow_by(&mut self, len: usize) -> Result<NonNull<u8>, GrowError>;
}

/// An arena backed by an owned buffer of fixed capacity.
///
/// Growing only bumps a length, so several heaps can live side by side in the
/// same process without fighting over the program break. The buffer is given
/// back when the region is dropped.
pub struct BufferRegion {
    base: NonNull<u8>,
    capacity: usize,
    len: usize,
}

// The region exclusively owns its buffer.
unsafe impl Send for BufferRegion {}

impl BufferRegion {
    /// Creates a region able to grow up to `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Result<Self, GrowError> {
        let layout = Layout::from_size_align(capacity.max(1), BUFFER_ALIGN)
            .map_err(|_| GrowError::TooLarge { requested: capacity })?;

        let base = NonNull::new(unsafe { alloc::alloc(layout) }).ok_or(GrowError::Reserve)?;

        debug!("buffer region of {capacity} bytes at {base:p}");

        Ok(Self {
            base,
            capacity,
            len: 0,
        })
    }

    /// Total bytes the region can hand out.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes handed out so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes that can still be handed out.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity - self.len
    }
}

unsafe impl HeapRegion for BufferRegion {
    fn boundary(&mut self) -> Result<NonNull<u8>, GrowError> {
        Ok(unsafe { self.base.add(self.len) })
    }

    fn grow_by(&mut self, len: usize) -> Result<NonNull<u8>, GrowError> {
        if len > self.remaining() {
            return Err(GrowError::Exhausted { requested: len });
        }

        let start = unsafe { self.base.add(self.len) };
        self.len += len;

        Ok(start)
    }
}

impl Drop for BufferRegion {
    fn drop(&mut self) {
        unsafe {
            let layout = Layout::from_size_align_unchecked(self.capacity.max(1), BUFFER_ALIGN);
            alloc::dealloc(self.base.as_ptr(), layout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_contiguously() {
        let mut region = BufferRegion::with_capacity(256).unwrap();
        let start = region.boundary().unwrap();

        let first = region.grow_by(64).unwrap();
        let second = region.grow_by(32).unwrap();

        assert_eq!(first, start);
        assert_eq!(second.as_ptr() as usize, start.as_ptr() as usize + 64);
        assert_eq!(region.boundary().unwrap().as_ptr() as usize, start.as_ptr() as usize + 96);
        assert_eq!(region.len(), 96);
        assert_eq!(region.remaining(), 160);
    }

    #[test]
    fn base_is_page_aligned() {
        let mut region = BufferRegion::with_capacity(64).unwrap();
        assert_eq!(region.boundary().unwrap().as_ptr() as usize % BUFFER_ALIGN, 0);
    }

    #[test]
    fn growing_past_capacity_fails_without_moving() {
        let mut region = BufferRegion::with_capacity(128).unwrap();
        region.grow_by(100).unwrap();
        let before = region.boundary().unwrap();

        assert_eq!(region.grow_by(29), Err(GrowError::Exhausted { requested: 29 }));
        assert_eq!(region.boundary().unwrap(), before);

        // What is left can still be taken.
        assert!(region.grow_by(28).is_ok());
        assert_eq!(region.remaining(), 0);
    }

    #[test]
    fn zero_growth_is_a_query() {
        let mut region = BufferRegion::with_capacity(16).unwrap();
        let before = region.boundary().unwrap();

        assert_eq!(region.grow_by(0).unwrap(), before);
        assert!(region.is_empty());
    }
}
