use std::cell::UnsafeCell;
use std::convert::TryFrom;
use std::iter::FusedIterator;
use std::mem::MaybeUninit;
use std::num::NonZeroU32;
use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};

/// Handle of a single node slot inside an [`Arena`](crate::Arena).
///
/// Handles are minted only by the arena when it allocates a chunk, so every handle in circulation
/// resolves to initialized node storage for as long as the arena lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(NonZeroU32);

impl NodeId {
    /// `None` if the zero-based index does not fit the handle space.
    pub(crate) fn from_index(index: usize) -> Option<Self> {
        index
            .checked_add(1)
            .and_then(|raw| u32::try_from(raw).ok())
            .and_then(NonZeroU32::new)
            .map(NodeId)
    }

    pub(crate) fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }

    pub(crate) fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(NodeId)
    }

    pub(crate) fn into_raw(node: Option<Self>) -> u32 {
        node.map_or(0, |node| node.0.get())
    }
}

/// A value slot plus the link to the next node of whatever chain currently holds it.
///
/// The slot is written when the node is handed out for insertion and retired when the value is
/// consumed. The node itself lives until its chunk is released.
pub struct Node<T> {
    next: AtomicU32,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Node<T> {
    pub(crate) fn vacant(next: Option<NodeId>) -> Self {
        Self {
            next: AtomicU32::new(NodeId::into_raw(next)),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    // The link may be read by a thread holding a stale view of a stack head. Those reads must not
    // race, but their result is discarded when the head CAS fails, so relaxed is enough.
    #[inline(always)]
    pub fn next(&self) -> Option<NodeId> {
        NodeId::from_raw(self.next.load(Ordering::Relaxed))
    }

    #[inline(always)]
    pub fn set_next(&self, next: Option<NodeId>) {
        self.next.store(NodeId::into_raw(next), Ordering::Relaxed);
    }

    /// Constructs `value` in place.
    ///
    /// # Safety
    ///
    /// The caller must exclusively own the node (it is detached from every stack) and the slot must
    /// be vacant. A live value would be overwritten without being dropped.
    #[inline]
    pub unsafe fn write(&self, value: T) {
        (*self.value.get()).as_mut_ptr().write(value);
    }

    /// # Safety
    ///
    /// The slot must hold a live value and the node must not be reachable by any other thread for
    /// the lifetime of the returned reference.
    #[inline]
    pub unsafe fn value(&self) -> &T {
        &*(*self.value.get()).as_ptr()
    }

    /// Moves the value out, leaving the slot vacant.
    ///
    /// # Safety
    ///
    /// Same as [`value`](Node::value); the slot must not be read again before the next `write`.
    #[inline]
    pub unsafe fn take(&self) -> T {
        ptr::read((*self.value.get()).as_ptr())
    }

    /// Destroys the value in place, leaving the slot vacant.
    ///
    /// # Safety
    ///
    /// Same as [`take`](Node::take).
    #[inline]
    pub unsafe fn drop_value(&self) {
        ptr::drop_in_place((*self.value.get()).as_mut_ptr());
    }
}

/// Resolves node links by handle.
pub trait Links {
    fn next(&self, node: NodeId) -> Option<NodeId>;

    fn set_next(&self, node: NodeId, next: Option<NodeId>);

    /// Walks the chain starting at `head` until a node without a successor.
    fn chain(&self, head: Option<NodeId>) -> Chain<'_, Self>
    where
        Self: Sized,
    {
        Chain {
            links: self,
            current: head,
        }
    }

    /// Returns the last node of the chain starting at `head`. Linear in the chain length.
    fn tail(&self, head: NodeId) -> NodeId {
        let mut tail = head;
        while let Some(next) = self.next(tail) {
            tail = next;
        }
        tail
    }
}

/// Forward traversal over a chain of nodes.
///
/// The successor is read before a node is yielded, so the caller may retire the yielded node's
/// value during the walk.
pub struct Chain<'a, L> {
    links: &'a L,
    current: Option<NodeId>,
}

impl<'a, L: Links> Iterator for Chain<'a, L> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let node = self.current?;
        self.current = self.links.next(node);
        Some(node)
    }
}

impl<'a, L: Links> FusedIterator for Chain<'a, L> {}
