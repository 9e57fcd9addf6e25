use std::{marker::PhantomData, ptr::NonNull};

/// Non-null pointer to `T`.
pub(crate) type Link<T> = Option<NonNull<T>>;

/// A node of an intrusive [`List`]. The links live right next to the element,
/// so a node placed at the start of a block *is* that block's header.
///
/// The node is over-aligned to 16 bytes: whatever follows a node in memory
/// (the payload handed out to the user) inherits that alignment.
#[repr(C, align(16))]
pub(crate) struct Node<T> {
    /// Pointer to the next node of the list
    pub next: Link<Self>,
    /// Pointer to the previous node of the list
    pub prev: Link<Self>,
    /// Element of the node
    pub data: T,
}

/// Doubly linked list over nodes that somebody else owns.
///
/// The list never allocates nor frees: we are the allocator, so nodes are
/// written by the caller wherever it wants them (inside the heap arena) and
/// the list only rewires `next`/`prev`.
pub(crate) struct List<T> {
    head: Link<Node<T>>,
    tail: Link<Node<T>>,
    len: usize,
    marker: PhantomData<T>,
}

pub(crate) struct Iter<'a, T> {
    current: Link<Node<T>>,
    remaining: usize,
    marker: PhantomData<&'a Node<T>>,
}

impl<T> Node<T> {
    pub const fn new(data: T) -> Self {
        Self {
            next: None,
            prev: None,
            data,
        }
    }
}

impl<T> List<T> {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
            marker: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Links `node` at the head of the list.
    ///
    /// **SAFETY**: `node` must point to a valid [`Node`] that is not linked in
    /// this or any other list, and it must stay valid while it is linked.
    pub unsafe fn push_front(&mut self, mut node: NonNull<Node<T>>) {
        unsafe {
            node.as_mut().prev = None;
            node.as_mut().next = self.head;

            match self.head {
                Some(mut head) => head.as_mut().prev = Some(node),
                None => self.tail = Some(node),
            }
        }

        self.head = Some(node);
        self.len += 1;
    }

    /// Unlinks `node` and clears its links so nothing stale is left behind.
    ///
    /// **SAFETY**: `node` must currently be linked in this list.
    pub unsafe fn remove(&mut self, mut node: NonNull<Node<T>>) {
        unsafe {
            let prev = node.as_ref().prev;
            let next = node.as_ref().next;

            match prev {
                Some(mut prev) => prev.as_mut().next = next,
                None => self.head = next,
            }

            match next {
                Some(mut next) => next.as_mut().prev = prev,
                None => self.tail = prev,
            }

            node.as_mut().next = None;
            node.as_mut().prev = None;
        }

        self.len -= 1;
    }

    /// Iterates over the nodes from head to tail.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            current: self.head,
            remaining: self.len,
            marker: PhantomData,
        }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = NonNull<Node<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current?;

        unsafe {
            self.current = node.as_ref().next;
        }
        self.remaining -= 1;

        Some(node)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, T> IntoIterator for &'a List<T> {
    type Item = NonNull<Node<T>>;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(list: &List<u8>) -> Vec<u8> {
        list.iter().map(|node| unsafe { node.as_ref().data }).collect()
    }

    #[test]
    fn new_list_is_empty() {
        let list: List<u8> = List::new();

        assert_eq!(list.len(), 0);
        assert!(list.is_empty());
        assert!(list.head.is_none());
        assert!(list.tail.is_none());
        assert!(list.iter().next().is_none());
    }

    #[test]
    fn push_front_puts_newest_first() {
        let mut nodes = [Node::new(1u8), Node::new(2), Node::new(3)];
        let mut list = List::new();

        for node in nodes.iter_mut() {
            unsafe { list.push_front(NonNull::from(node)) };
        }

        assert_eq!(values(&list), vec![3, 2, 1]);
        assert_eq!(list.len(), 3);
        assert_eq!(list.tail, Some(NonNull::from(&mut nodes[0])));
    }

    #[test]
    fn remove_head_tail_and_interior() {
        let mut nodes = [Node::new(1u8), Node::new(2), Node::new(3), Node::new(4)];
        let ptrs: Vec<NonNull<Node<u8>>> = nodes.iter_mut().map(NonNull::from).collect();
        let mut list = List::new();

        unsafe {
            for &node in &ptrs {
                list.push_front(node);
            }
            // 4 3 2 1
            list.remove(ptrs[2]);
            assert_eq!(values(&list), vec![4, 2, 1]);

            list.remove(ptrs[3]);
            assert_eq!(values(&list), vec![2, 1]);
            assert_eq!(list.head, Some(ptrs[1]));

            list.remove(ptrs[0]);
            assert_eq!(values(&list), vec![2]);
            assert_eq!(list.tail, Some(ptrs[1]));

            list.remove(ptrs[1]);
        }

        assert!(list.is_empty());
        assert!(list.head.is_none());
        assert!(list.tail.is_none());
    }

    #[test]
    fn removed_node_has_no_links() {
        let mut nodes = [Node::new(1u8), Node::new(2), Node::new(3)];
        let ptrs: Vec<NonNull<Node<u8>>> = nodes.iter_mut().map(NonNull::from).collect();
        let mut list = List::new();

        unsafe {
            for &node in &ptrs {
                list.push_front(node);
            }
            list.remove(ptrs[1]);

            assert!(ptrs[1].as_ref().next.is_none());
            assert!(ptrs[1].as_ref().prev.is_none());
            assert_eq!(ptrs[2].as_ref().next, Some(ptrs[0]));
            assert_eq!(ptrs[0].as_ref().prev, Some(ptrs[2]));
        }
    }
}
