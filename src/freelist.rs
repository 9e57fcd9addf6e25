use crate::{
    block::{BLOCK_HEADER_SIZE, Block, Header, end_addr, start_addr},
    list::{Iter, List},
};

/// Linked list to keep track of free [`Block`].
///
/// The links are the `next`/`prev` fields of the block headers themselves, so
/// keeping a block on this list costs nothing beyond the header it already has:
///
/// ```text
///                          Free List
///
///            +-------------------------------------+
///            |                                     |
/// +----------|----+-------+-------+----------------|---+-------+
/// |  Free    |    | Used  | Used  |    Free        v   | Used  |
/// | (head) --+    |       |       |   (tail)           |       |
/// +---------------+-------+-------+--------------------+-------+
///                         Arena (address order)
/// ```
///
/// The list is unordered: released blocks are pushed at the head, so the most
/// recently freed memory is the first candidate for reuse. Before a block is
/// linked it is merged with every free block that touches it in the arena,
/// which keeps the invariant that no two free blocks are ever adjacent.
pub(crate) struct FreeList {
    items: List<Block>,
}

/// Where a free neighbour sits relative to the block being inserted.
enum Neighbour {
    /// The neighbour starts exactly where the block ends.
    After(Header),
    /// The neighbour ends exactly where the block starts.
    Before(Header),
}

impl FreeList {
    /// Creates a new empty List
    pub const fn new() -> Self {
        Self { items: List::new() }
    }

    /// It tells whether the FreeList is empty or not.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Marks `block` as free and links it, coalescing it first with any free
    /// block that is address-adjacent on either side.
    ///
    /// ```text
    ///  before:  | B1 (free) | block | B2 (free) |
    ///  after:   | B1 (free, B1 + H + block + H + B2) |
    /// ```
    ///
    /// The swallowed headers are left behind as tombstones (`size == 0`).
    ///
    /// **SAFETY**: `block` must be a valid, non-tombstone header that is not on
    /// the list already.
    pub unsafe fn insert(&mut self, mut block: Header) {
        unsafe {
            debug_assert!(!block.as_ref().data.is_tombstone());
            block.as_mut().data.is_free = true;

            while let Some(neighbour) = self.find_neighbour(block) {
                block = match neighbour {
                    Neighbour::After(next) => {
                        self.items.remove(next);
                        absorb(block, next);
                        block
                    }
                    Neighbour::Before(prev) => {
                        self.items.remove(prev);
                        absorb(prev, block);
                        prev
                    }
                };
            }

            self.items.push_front(block);
        }
    }

    /// Removes `block` from the FreeList.
    ///
    /// **SAFETY**: `block` must currently be on this list.
    #[inline]
    pub unsafe fn remove(&mut self, block: Header) {
        unsafe { self.items.remove(block) }
    }

    /// Returns the first block on the list that can hold `size` bytes.
    ///
    /// This is first-fit, not best-fit: the scan starts at the head and stops
    /// at the first candidate that is large enough.
    pub fn find_first_fit(&self, size: usize) -> Option<Header> {
        self.items
            .iter()
            .find(|block| unsafe { block.as_ref().data.size >= size })
    }

    /// Free blocks in list order, head first.
    #[inline]
    pub fn iter(&self) -> Iter<'_, Block> {
        self.items.iter()
    }

    /// Linear scan for a free block touching `block` in the arena.
    unsafe fn find_neighbour(&self, block: Header) -> Option<Neighbour> {
        let start = start_addr(block);
        let end = unsafe { end_addr(block) };

        self.items.iter().find_map(|candidate| {
            if start_addr(candidate) == end {
                Some(Neighbour::After(candidate))
            } else if unsafe { end_addr(candidate) } == start {
                Some(Neighbour::Before(candidate))
            } else {
                None
            }
        })
    }
}

/// Grows `into` over the adjacent `victim` and turns `victim` into a tombstone.
///
/// **SAFETY**: `victim` must start exactly where `into` ends and neither may be
/// linked in any list.
unsafe fn absorb(mut into: Header, mut victim: Header) {
    unsafe {
        into.as_mut().data.size += BLOCK_HEADER_SIZE + victim.as_ref().data.size;

        let victim = &mut victim.as_mut().data;
        victim.size = 0;
        victim.is_free = true;
    }
}
