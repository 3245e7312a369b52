use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::utils::{Backoff, CachePadded};

use crate::node::{Links, NodeId};

/// A lock-free LIFO of node chains, behind a single atomic head word.
///
/// The head word holds a modification tag in the upper 32 bits and the head handle in the lower
/// 32 bits. Every successful update bumps the tag, so a `pop` that read a stale next link fails
/// its compare-and-swap even if the same node has since come back to the top of the stack.
///
/// The stack does not own nodes, it only links them. Links are read and written through the
/// [`Links`] implementation passed to each call, which must be the same for the whole lifetime of
/// the stack.
pub struct TreiberStack {
    head: CachePadded<AtomicU64>,
}

#[derive(Clone, Copy)]
struct Head(u64);

impl Head {
    fn new(tag: u32, node: Option<NodeId>) -> Self {
        Head((u64::from(tag) << 32) | u64::from(NodeId::into_raw(node)))
    }

    fn tag(self) -> u32 {
        (self.0 >> 32) as u32
    }

    fn node(self) -> Option<NodeId> {
        NodeId::from_raw(self.0 as u32)
    }

    fn replace(self, node: Option<NodeId>) -> Self {
        Head::new(self.tag().wrapping_add(1), node)
    }
}

impl TreiberStack {
    pub fn new() -> Self {
        Self {
            head: CachePadded::new(AtomicU64::new(Head::new(0, None).0)),
        }
    }

    /// Prepends the whole chain starting at `head`. Walks the chain once to find its tail.
    pub fn push<L: Links>(&self, links: &L, head: NodeId) {
        let tail = links.tail(head);
        self.push_chain(links, head, tail);
    }

    /// Prepends the chain `head..=tail` when the caller already knows its tail.
    ///
    /// The chain must be exclusively owned by the caller: detached from every stack and not
    /// reachable from any other thread.
    pub fn push_chain<L: Links>(&self, links: &L, head: NodeId, tail: NodeId) {
        let backoff = Backoff::new();
        let mut current = Head(self.head.load(Ordering::Acquire));
        loop {
            links.set_next(tail, current.node());
            // Release publishes the link above and every value reachable from `head`.
            match self.head.compare_exchange_weak(
                current.0,
                current.replace(Some(head)).0,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => {
                    current = Head(actual);
                    backoff.spin();
                }
            }
        }
    }

    /// Detaches the top node alone. The returned node is a single-node chain.
    pub fn pop<L: Links>(&self, links: &L) -> Option<NodeId> {
        let backoff = Backoff::new();
        let mut current = Head(self.head.load(Ordering::Acquire));
        loop {
            let node = current.node()?;
            let next = links.next(node);
            match self.head.compare_exchange_weak(
                current.0,
                current.replace(next).0,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    links.set_next(node, None);
                    return Some(node);
                }
                Err(actual) => {
                    current = Head(actual);
                    backoff.spin();
                }
            }
        }
    }

    /// Detaches every node at once and returns the head of the chain.
    pub fn pop_all(&self) -> Option<NodeId> {
        let backoff = Backoff::new();
        let mut current = Head(self.head.load(Ordering::Acquire));
        loop {
            let node = current.node()?;
            // Not a plain swap: the tag has to move on a drain too.
            match self.head.compare_exchange_weak(
                current.0,
                current.replace(None).0,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(node),
                Err(actual) => {
                    current = Head(actual);
                    backoff.spin();
                }
            }
        }
    }

    /// Only a hint while other threads are pushing or popping.
    pub fn is_empty(&self) -> bool {
        Head(self.head.load(Ordering::Relaxed)).node().is_none()
    }
}

impl Default for TreiberStack {
    fn default() -> Self {
        Self::new()
    }
}
