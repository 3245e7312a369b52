//! Treiber provides the lock-free pieces of a pooled collection.
//!
//! It consists of three parts:
//! 1. An [arena](struct.Arena.html) that allocates node storage in fixed-size chunks and addresses
//!    nodes by 32-bit [handles](struct.NodeId.html). Chunk memory comes from a pluggable
//!    [`ChunkAllocator`](trait.ChunkAllocator.html) and is released only when the arena is dropped.
//! 2. [Nodes](struct.Node.html): a value slot plus a next link, with chain traversal through the
//!    [`Links`](trait.Links.html) trait.
//! 3. A [Treiber stack](struct.TreiberStack.html) of node chains with `push`, `pop` and `pop_all`.
//!
//! ## Example
//! ```
//! use treiber::{Arena, Heap, Links, TreiberStack};
//!
//! let arena = Arena::<u64, Heap>::new(4, Heap).unwrap();
//! let free = TreiberStack::new();
//!
//! let grown = arena.grow().unwrap();
//! free.push_chain(&arena, grown.rest, grown.tail);
//! assert_eq!(arena.chain(free.pop_all()).count(), 3);
//! ```

pub mod arena;
pub mod chunk;
pub mod node;
pub mod stack;

pub use arena::{Arena, Grown};
pub use chunk::{page_size, ChunkAllocator, Heap, Mapped};
pub use node::{Chain, Links, Node, NodeId};
pub use stack::TreiberStack;
