use std::{mem, ptr::NonNull};
use crate::list::Node;

/// Header size of a block. We need to add the overhead introduced by our
/// [`Node`] structure since we always use our `Block` as a node of the free list.
/// This is 32 bytes on 64 bit targets.
pub const BLOCK_HEADER_SIZE: usize = mem::size_of::<Node<Block>>();

/// Alignment of every header and therefore of every payload we hand out.
pub const BLOCK_ALIGN: usize = mem::align_of::<Node<Block>>();

/// Pointer to a block header as it lives inside the arena.
pub(crate) type Header = NonNull<Node<Block>>;

/// This is the structure of a block. The fields of the block are its metadata,
/// content is placed after this header.
///
/// ```text
/// +---------------------+ <------+
/// |        next         |        |
/// +---------------------+        |
/// |        prev         |        |
/// +---------------------+        | -> Header (Node<Block>)
/// |        size         |        |
/// +---------------------+        |
/// |    is_free (1b)     |        |
/// +---------------------+ <------+ <--- pointer returned to the user
/// |       Content       |        |
/// |         ...         |        | -> `size` bytes of payload
/// |         ...         |        |
/// +---------------------+ <------+ <--- next block (if contiguous)
/// ```
///
/// `next` and `prev` only mean something while the block sits in the
/// [`crate::freelist::FreeList`]. A block with `size == 0` is a tombstone: a
/// header that was swallowed by a neighbour during coalescing.
pub(crate) struct Block {
    /// Usable bytes after the header.
    pub size: usize,
    /// Flag to tell whether the block is free or not.
    pub is_free: bool,
}

impl Block {
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.size == 0
    }
}

/// Address of the payload that follows `header`.
#[inline]
pub(crate) fn payload_of(header: Header) -> NonNull<u8> {
    unsafe { header.add(1).cast() }
}

/// Recovers the header of a payload pointer handed out by the heap.
///
/// **SAFETY**: `payload` must have been returned by [`payload_of`].
#[inline]
pub(crate) unsafe fn header_of(payload: NonNull<u8>) -> Header {
    unsafe { payload.sub(BLOCK_HEADER_SIZE).cast() }
}

/// Address at which `header` starts. Only used for adjacency tests.
#[inline]
pub(crate) fn start_addr(header: Header) -> usize {
    header.as_ptr() as usize
}

/// Address right past the payload of `header`, which is where the next block
/// starts when both were carved out of the same contiguous range.
///
/// **SAFETY**: `header` must point to an initialized header.
#[inline]
pub(crate) unsafe fn end_addr(header: Header) -> usize {
    unsafe { start_addr(header) + BLOCK_HEADER_SIZE + header.as_ref().data.size }
}

/// Writes a fresh, unlinked header at `addr`.
///
/// **SAFETY**: `addr` must be aligned to [`BLOCK_ALIGN`] and valid for
/// `BLOCK_HEADER_SIZE + size` bytes.
pub(crate) unsafe fn write_header(addr: NonNull<u8>, size: usize, is_free: bool) -> Header {
    let header = addr.cast::<Node<Block>>();

    unsafe {
        header.write(Node::new(Block { size, is_free }));
    }

    header
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_aligned_and_padded() {
        assert_eq!(BLOCK_ALIGN, 16);
        assert_eq!(BLOCK_HEADER_SIZE % BLOCK_ALIGN, 0);
        assert!(BLOCK_HEADER_SIZE >= 2 * mem::size_of::<usize>() + mem::size_of::<usize>() + 1);
    }

    #[test]
    fn payload_and_header_are_inverse() {
        let mut storage = [Node::new(Block { size: 0, is_free: false }), Node::new(Block { size: 0, is_free: false })];
        let header = NonNull::from(&mut storage[0]);

        let payload = payload_of(header);
        assert_eq!(payload.as_ptr() as usize, start_addr(header) + BLOCK_HEADER_SIZE);
        assert_eq!(unsafe { header_of(payload) }, header);
    }

    #[test]
    fn end_addr_covers_header_and_payload() {
        let mut storage = [Node::new(Block { size: 0, is_free: false }), Node::new(Block { size: 0, is_free: false })];
        let header = NonNull::from(&mut storage[0]);

        unsafe {
            let header = write_header(header.cast(), BLOCK_HEADER_SIZE, true);
            assert!(header.as_ref().data.is_free);
            assert!(!header.as_ref().data.is_tombstone());
            assert_eq!(end_addr(header), start_addr(header) + 2 * BLOCK_HEADER_SIZE);
        }
    }
}
