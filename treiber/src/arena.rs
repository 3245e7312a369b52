use log::debug;
use std::alloc::Layout;
use std::io::{Error, ErrorKind};
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crate::chunk::{ChunkAllocator, Heap};
use crate::node::{Links, Node, NodeId};

// Chunk `k` is recorded in bucket `log2(k + 1)`, and bucket `b` has room for `2^b` chunks. Chunk
// numbers stay below `2^31` because handles are 32 bits wide and every chunk holds two nodes or
// more, so 32 buckets always suffice.
const BUCKETS: usize = 32;

type Bucket<T> = AtomicPtr<AtomicPtr<Node<T>>>;

/// The nodes of a freshly allocated chunk.
///
/// `first` is detached and ready to use. `rest..=tail` is every other node of the chunk, already
/// linked into a single chain.
#[derive(Clone, Copy, Debug)]
pub struct Grown {
    pub first: NodeId,
    pub rest: NodeId,
    pub tail: NodeId,
}

/// Node storage, allocated in chunks of a fixed number of nodes and addressed by [`NodeId`].
///
/// Chunks are recorded by chunk number in a directory of lazily allocated buckets, never by
/// address alone, and are all allocated with one layout. A failed growth hands its chunk number
/// back unless another thread reserved a later one in the meantime, in which case that number
/// stays unused. Nothing is released until the arena is dropped. Values still live in nodes at that point are leaked, not dropped; retiring them is
/// the owner's job.
pub struct Arena<T, A: ChunkAllocator = Heap> {
    allocator: A,
    chunk_size: usize,
    layout: Layout,
    // Chunk numbers handed out, including failed ones that could not be handed back.
    reserved: AtomicUsize,
    allocated: AtomicUsize,
    buckets: [Bucket<T>; BUCKETS],
    _nodes: PhantomData<Node<T>>,
}

unsafe impl<T: Send, A: ChunkAllocator + Sync> Sync for Arena<T, A> {}

impl<T, A: ChunkAllocator> Arena<T, A> {
    /// Creates an empty arena. `chunk_size` must be at least 2, so that growing always yields a
    /// node to use and at least one to keep.
    pub fn new(chunk_size: usize, allocator: A) -> Result<Self, Error> {
        if chunk_size < 2 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("Chunk size must be at least 2, got {}", chunk_size),
            ));
        }
        let layout = Layout::array::<Node<T>>(chunk_size).map_err(|_| {
            Error::new(
                ErrorKind::InvalidInput,
                format!("A chunk of {} nodes overflows the address space", chunk_size),
            )
        })?;
        allocator.validate(layout)?;

        Ok(Self {
            allocator,
            chunk_size,
            layout,
            reserved: AtomicUsize::new(0),
            allocated: AtomicUsize::new(0),
            buckets: Default::default(),
            _nodes: PhantomData,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of chunks allocated so far.
    pub fn chunks(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Allocates one chunk with a single call to the allocator and links its nodes.
    ///
    /// Safe to call from many threads at once; every call records its own chunk.
    pub fn grow(&self) -> Result<Grown, Error> {
        let chunk = self.reserved.fetch_add(1, Ordering::Relaxed);
        let first_index = chunk.checked_mul(self.chunk_size);
        let last_index = first_index.and_then(|first| first.checked_add(self.chunk_size - 1));
        let (first, rest, tail) = match (first_index, last_index) {
            (Some(first), Some(last)) => (
                NodeId::from_index(first),
                NodeId::from_index(first + 1),
                NodeId::from_index(last),
            ),
            _ => (None, None, None),
        };
        let (first, rest, tail) = match (first, rest, tail) {
            (Some(first), Some(rest), Some(tail)) => (first, rest, tail),
            _ => {
                self.unreserve(chunk);
                return Err(Error::new(
                    ErrorKind::OutOfMemory,
                    format!("Node handle space exhausted at chunk {}", chunk),
                ));
            }
        };

        let (bucket, slot) = locate(chunk);
        let entries = self.bucket(bucket);
        let base = match self.allocator.allocate(self.layout) {
            Ok(base) => base.cast::<Node<T>>().as_ptr(),
            Err(err) => {
                self.unreserve(chunk);
                return Err(err);
            }
        };

        let first_index = first.index();
        unsafe {
            base.write(Node::vacant(None));
            for offset in 1..self.chunk_size {
                let next = if offset + 1 < self.chunk_size {
                    NodeId::from_index(first_index + offset + 1)
                } else {
                    None
                };
                base.add(offset).write(Node::vacant(next));
            }
            // Handles of this chunk only reach other threads through a stack push that happens
            // after this store.
            (*entries.add(slot)).store(base, Ordering::Release);
        }

        self.allocated.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Allocated chunk {} ({} nodes, {} bytes)",
            chunk,
            self.chunk_size,
            self.layout.size()
        );
        Ok(Grown { first, rest, tail })
    }

    /// Resolves a handle minted by this arena.
    ///
    /// # Panics
    ///
    /// Panics if the handle points into a chunk this arena never allocated.
    #[inline]
    pub fn node(&self, node: NodeId) -> &Node<T> {
        let index = node.index();
        let (bucket, slot) = locate(index / self.chunk_size);
        let entries = self.buckets[bucket].load(Ordering::Acquire);
        assert!(!entries.is_null(), "Node handle {:?} is not from this arena", node);
        let base = unsafe { (*entries.add(slot)).load(Ordering::Acquire) };
        assert!(!base.is_null(), "Node handle {:?} is not from this arena", node);
        unsafe { &*base.add(index % self.chunk_size) }
    }

    // Only the most recent reservation can be returned.
    fn unreserve(&self, chunk: usize) {
        let _ = self.reserved.compare_exchange(
            chunk + 1,
            chunk,
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
    }

    fn bucket(&self, bucket: usize) -> *mut AtomicPtr<Node<T>> {
        let current = self.buckets[bucket].load(Ordering::Acquire);
        if !current.is_null() {
            return current;
        }

        let len = 1 << bucket;
        let fresh = new_bucket::<T>(len);
        match self.buckets[bucket].compare_exchange(
            ptr::null_mut(),
            fresh,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => fresh,
            Err(installed) => {
                // Another thread installed the bucket first.
                unsafe { free_bucket(fresh, len) };
                installed
            }
        }
    }
}

impl<T, A: ChunkAllocator> Links for Arena<T, A> {
    #[inline]
    fn next(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).next()
    }

    #[inline]
    fn set_next(&self, node: NodeId, next: Option<NodeId>) {
        self.node(node).set_next(next);
    }
}

impl<T, A: ChunkAllocator> Drop for Arena<T, A> {
    fn drop(&mut self) {
        let mut released = 0;
        for (bucket, entries) in self.buckets.iter_mut().enumerate() {
            let entries = *entries.get_mut();
            if entries.is_null() {
                continue;
            }
            let len = 1 << bucket;
            unsafe {
                for slot in 0..len {
                    let base = *(*entries.add(slot)).get_mut();
                    if let Some(base) = NonNull::new(base) {
                        self.allocator.release(base.cast(), self.layout);
                        released += 1;
                    }
                }
                free_bucket(entries, len);
            }
        }
        debug!("Released {} chunks of {} bytes", released, self.layout.size());
    }
}

fn locate(chunk: usize) -> (usize, usize) {
    let position = chunk + 1;
    let bucket = (usize::BITS - 1 - position.leading_zeros()) as usize;
    (bucket, position - (1 << bucket))
}

fn new_bucket<T>(len: usize) -> *mut AtomicPtr<Node<T>> {
    let entries: Box<[AtomicPtr<Node<T>>]> =
        (0..len).map(|_| AtomicPtr::new(ptr::null_mut())).collect();
    Box::into_raw(entries) as *mut AtomicPtr<Node<T>>
}

unsafe fn free_bucket<T>(entries: *mut AtomicPtr<Node<T>>, len: usize) {
    drop(Box::from_raw(ptr::slice_from_raw_parts_mut(entries, len)));
}
