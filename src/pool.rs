use std::io::Error;

use treiber::{Arena, ChunkAllocator, NodeId, TreiberStack};

/// Recycles node storage.
///
/// Nodes with retired slots wait on the free set. A new chunk is only allocated when the free set
/// runs dry, and all of its nodes but the one handed out go straight onto the free set.
pub(crate) struct NodePool<T, A: ChunkAllocator> {
    arena: Arena<T, A>,
    free: TreiberStack,
}

impl<T, A: ChunkAllocator> NodePool<T, A> {
    pub(crate) fn new(chunk_size: usize, allocator: A) -> Result<Self, Error> {
        Ok(Self {
            arena: Arena::new(chunk_size, allocator)?,
            free: TreiberStack::new(),
        })
    }

    pub(crate) fn arena(&self) -> &Arena<T, A> {
        &self.arena
    }

    /// Returns a detached node with a vacant slot.
    pub(crate) fn acquire(&self) -> Result<NodeId, Error> {
        match self.free.pop(&self.arena) {
            Some(node) => Ok(node),
            None => {
                let grown = self.arena.grow()?;
                self.free.push_chain(&self.arena, grown.rest, grown.tail);
                Ok(grown.first)
            }
        }
    }

    /// Puts the chain `head..=tail` back on the free set. Every slot in it must be vacant.
    pub(crate) fn recycle(&self, head: NodeId, tail: NodeId) {
        self.free.push_chain(&self.arena, head, tail);
    }
}
