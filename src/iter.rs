use std::fmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;

use treiber::{ChunkAllocator, Heap, NodeId};

use super::{End, List};

/// A single-use traversal handle over nodes detached from a [`List`].
///
/// The iterator exclusively owns the chain it was created with. It remembers the chain's head, the
/// last node it consumed and its current position. When dropped it hands the consumed prefix to
/// the list's free set and puts the unconsumed suffix back on the active set, so values that were
/// never consumed stay in the list.
///
/// A value counts as consumed once the iterator moves past it, either with
/// [`advance`](Iter::advance) (which drops the value) or [`next`](Iterator::next) (which moves it
/// out). [`get`](Iter::get) only borrows the current value.
///
/// The handle is neither `Clone` nor `Send`: it carries the duty to reconcile exactly once, on the
/// thread that detached the chain.
pub struct Iter<'a, T, A: ChunkAllocator = Heap> {
    list: &'a List<T, A>,
    first: Option<NodeId>,
    last: Option<NodeId>,
    current: Option<NodeId>,
    _not_send: PhantomData<*const ()>,
}

impl<'a, T, A: ChunkAllocator> Iter<'a, T, A> {
    pub(crate) fn new(list: &'a List<T, A>, first: Option<NodeId>) -> Self {
        Self {
            list,
            first,
            last: None,
            current: first,
            _not_send: PhantomData,
        }
    }

    /// Borrows the current value without consuming it.
    pub fn get(&self) -> Option<&T> {
        // The chain is detached and owned by this iterator, and values ahead of the position are
        // live.
        self.current.map(|node| unsafe { self.list.node(node).value() })
    }

    /// Drops the current value and moves to the next node. Does nothing at the end.
    pub fn advance(&mut self) {
        if let Some(node) = self.current {
            // Step first, a panicking destructor must not leave the node in the suffix.
            self.step(node);
            unsafe { self.list.node(node).drop_value() };
        }
    }

    /// `true` once no node is left, equivalent to `self == list.end()`.
    pub fn is_end(&self) -> bool {
        self.current.is_none()
    }

    fn step(&mut self, node: NodeId) {
        self.last = Some(node);
        self.current = self.list.node(node).next();
    }
}

impl<'a, T, A: ChunkAllocator> Iterator for Iter<'a, T, A> {
    type Item = T;

    /// Moves the current value out and steps past it.
    fn next(&mut self) -> Option<T> {
        let node = self.current?;
        let value = unsafe { self.list.node(node).take() };
        self.step(node);
        Some(value)
    }
}

impl<'a, T, A: ChunkAllocator> FusedIterator for Iter<'a, T, A> {}

impl<'a, T, A: ChunkAllocator> PartialEq<End> for Iter<'a, T, A> {
    fn eq(&self, _end: &End) -> bool {
        self.is_end()
    }
}

impl<'a, T, A: ChunkAllocator> fmt::Debug for Iter<'a, T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter")
            .field("first", &self.first)
            .field("last", &self.last)
            .field("current", &self.current)
            .finish()
    }
}

impl<'a, T, A: ChunkAllocator> Drop for Iter<'a, T, A> {
    fn drop(&mut self) {
        let arena = self.list.arena();
        if let (Some(first), Some(last)) = (self.first, self.last) {
            // Split the chain. Everything up to `last` has a vacant slot now.
            arena.node(last).set_next(None);
            self.list.pool.recycle(first, last);
        }
        if let Some(current) = self.current {
            self.list.active.push(arena, current);
        }
    }
}
