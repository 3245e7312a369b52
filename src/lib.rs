//! An unbounded, pool-backed collection with lock-free insertion and removal.
//!
//! A [`List`] keeps two [Treiber stacks](treiber::TreiberStack): the *active set* holding
//! published values and the *free set* holding node storage ready for reuse. Storage is allocated
//! in chunks of a fixed number of nodes and is only released when the list is dropped.
//!
//! Removal goes through [`Iter`], a handle over nodes detached from the active set. Whatever the
//! handle consumed goes to the free set when it is dropped, and whatever it did not consume goes
//! back to the active set.
//!
//! ## Example
//! ```
//! use lockfree_list::List;
//!
//! let list = List::new(64).unwrap();
//! list.emplace(1).unwrap();
//! list.emplace(2).unwrap();
//!
//! // Only looking at a popped value leaves it in the list.
//! assert_eq!(list.pop().get(), Some(&2));
//!
//! let mut values: Vec<i32> = list.begin().collect();
//! values.sort();
//! assert_eq!(values, vec![1, 2]);
//! assert!(list.begin() == list.end());
//! ```

mod iter;
mod pool;

pub use iter::Iter;
pub use treiber::{ChunkAllocator, Heap, Mapped};

use log::debug;
use std::fmt;
use std::io::Error;
use std::mem;

use treiber::{Links, Node, NodeId, TreiberStack};

use pool::NodePool;

/// Chunk size for callers without a better figure, in nodes.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Marks the end of a traversal. Compare an [`Iter`] against it, it is never dereferenced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct End;

/// An unbounded collection with lock-free `emplace`, `pop` and snapshot traversal.
///
/// Ordering is LIFO for a single thread and unspecified across threads.
pub struct List<T, A: ChunkAllocator = Heap> {
    pool: NodePool<T, A>,
    active: TreiberStack,
}

impl<T> List<T> {
    /// Creates an empty list whose chunks hold `chunk_size` nodes each, allocated on the heap.
    ///
    /// `chunk_size` must be at least 2. Nothing is allocated until the first insertion.
    pub fn new(chunk_size: usize) -> Result<Self, Error> {
        Self::with_allocator(chunk_size, Heap)
    }
}

impl<T, A: ChunkAllocator> List<T, A> {
    /// Creates an empty list whose chunks come from `allocator`.
    pub fn with_allocator(chunk_size: usize, allocator: A) -> Result<Self, Error> {
        Ok(Self {
            pool: NodePool::new(chunk_size, allocator)?,
            active: TreiberStack::new(),
        })
    }

    /// Inserts `value`.
    ///
    /// Fails only if a new chunk was needed and could not be allocated.
    pub fn emplace(&self, value: T) -> Result<(), Error> {
        self.emplace_with(|| value)
    }

    /// Inserts the value returned by `f`, written straight into a pooled node.
    ///
    /// `f` is not called if no node could be obtained. If `f` panics its node is lost until the
    /// list is dropped.
    pub fn emplace_with<F>(&self, f: F) -> Result<(), Error>
    where
        F: FnOnce() -> T,
    {
        let node = self.pool.acquire()?;
        // Detached nodes from the pool have vacant slots.
        unsafe { self.arena().node(node).write(f()) };
        self.active.push_chain(self.arena(), node, node);
        Ok(())
    }

    /// Detaches the most recently published node.
    ///
    /// The returned iterator equals [`end`](List::end) if the list was empty. The value stays in
    /// the list unless the iterator consumes it: use [`Iterator::next`] or [`Iter::advance`], or
    /// [`try_pop`](List::try_pop) to do both in one call.
    pub fn pop(&self) -> Iter<'_, T, A> {
        Iter::new(self, self.active.pop(self.arena()))
    }

    /// Removes the most recently published value.
    pub fn try_pop(&self) -> Option<T> {
        self.pop().next()
    }

    /// Detaches every published value at once.
    ///
    /// Values inserted after this call are not part of the traversal. Values the iterator does
    /// not consume are put back when it is dropped.
    pub fn begin(&self) -> Iter<'_, T, A> {
        Iter::new(self, self.active.pop_all())
    }

    pub fn end(&self) -> End {
        End
    }

    /// Only a hint while other threads are using the list.
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn chunk_size(&self) -> usize {
        self.arena().chunk_size()
    }

    /// Number of chunks allocated so far.
    pub fn chunk_count(&self) -> usize {
        self.arena().chunks()
    }

    fn arena(&self) -> &treiber::Arena<T, A> {
        self.pool.arena()
    }

    pub(crate) fn node(&self, node: NodeId) -> &Node<T> {
        self.arena().node(node)
    }
}

impl<T, A: ChunkAllocator> fmt::Debug for List<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("List")
            .field("chunk_size", &self.chunk_size())
            .field("chunk_count", &self.chunk_count())
            .finish()
    }
}

impl<T, A: ChunkAllocator> Drop for List<T, A> {
    fn drop(&mut self) {
        // Free nodes have vacant slots, only the active set holds values. Chunks are released
        // by the arena afterwards.
        let head = self.active.pop_all();
        if !mem::needs_drop::<T>() {
            return;
        }
        let arena = self.pool.arena();
        let mut dropped = 0;
        for node in arena.chain(head) {
            unsafe { arena.node(node).drop_value() };
            dropped += 1;
        }
        debug!("Dropped {} values still in the list", dropped);
    }
}
