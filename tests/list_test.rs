use std::alloc::Layout;
use std::io::{Error, ErrorKind};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use lockfree_list::{ChunkAllocator, Heap, List, Mapped, DEFAULT_CHUNK_SIZE};

#[test]
fn reject_small_chunk_size() {
    assert_eq!(
        List::<u32>::new(1).err().map(|e| e.kind()),
        Some(ErrorKind::InvalidInput)
    );
    assert_eq!(
        List::<u32>::new(0).err().map(|e| e.kind()),
        Some(ErrorKind::InvalidInput)
    );
}

#[test]
fn empty_list() -> Result<(), Error> {
    let list = List::<u32>::new(DEFAULT_CHUNK_SIZE)?;
    assert!(list.is_empty());
    assert!(list.pop() == list.end());
    assert!(list.begin() == list.end());
    assert_eq!(list.try_pop(), None);
    assert_eq!(list.chunk_count(), 0);
    Ok(())
}

#[test]
fn single_thread_lifo() -> Result<(), Error> {
    let list = List::new(16)?;
    for i in 0..100 {
        list.emplace(i)?;
    }
    for i in (0..100).rev() {
        let mut popped = list.pop();
        assert_eq!(popped.get(), Some(&i));
        popped.advance();
        assert!(popped == list.end());
    }
    assert!(list.is_empty());
    Ok(())
}

#[test]
fn try_pop_removes() -> Result<(), Error> {
    let list = List::new(4)?;
    list.emplace("a".to_string())?;
    list.emplace("b".to_string())?;
    assert_eq!(list.try_pop().as_deref(), Some("b"));
    assert_eq!(list.try_pop().as_deref(), Some("a"));
    assert_eq!(list.try_pop(), None);
    Ok(())
}

#[test]
fn peek_without_commit() -> Result<(), Error> {
    let list = List::new(4)?;
    for i in 0..3 {
        list.emplace(i)?;
    }
    {
        let popped = list.pop();
        assert_eq!(popped.get(), Some(&2));
        assert_eq!(popped.get(), Some(&2));
    }
    let values: Vec<i32> = list.begin().collect();
    assert_eq!(values, vec![2, 1, 0]);
    Ok(())
}

#[test]
fn partial_traversal_returns_the_rest() -> Result<(), Error> {
    let list = List::new(8)?;
    for i in 0..5 {
        list.emplace(i)?;
    }
    {
        let mut iter = list.begin();
        assert_eq!(iter.next(), Some(4));
        iter.advance();
        assert_eq!(iter.get(), Some(&2));
        // A snapshot taken meanwhile does not see the detached nodes.
        assert!(list.begin() == list.end());
    }
    let values: Vec<i32> = list.begin().collect();
    assert_eq!(values, vec![2, 1, 0]);
    Ok(())
}

#[test]
fn snapshot_ignores_later_insertions() -> Result<(), Error> {
    let list = List::new(8)?;
    list.emplace(1)?;
    list.emplace(2)?;
    let mut iter = list.begin();
    list.emplace(3)?;
    assert_eq!(iter.next(), Some(2));
    assert_eq!(iter.next(), Some(1));
    assert_eq!(iter.next(), None);
    assert!(iter == list.end());
    drop(iter);
    assert_eq!(list.try_pop(), Some(3));
    Ok(())
}

#[test]
fn consumed_nodes_are_reused() -> Result<(), Error> {
    let list = List::new(4)?;
    for i in 0..4 {
        list.emplace(i)?;
    }
    assert_eq!(list.chunk_count(), 1);
    assert_eq!(list.begin().count(), 4);
    for i in 0..4 {
        list.emplace(i)?;
    }
    assert_eq!(list.chunk_count(), 1);
    list.emplace(4)?;
    assert_eq!(list.chunk_count(), 2);
    Ok(())
}

#[test]
fn chunk_accounting() -> Result<(), Error> {
    let chunk_size = 8;
    for &(m, r) in &[(0, 0), (0, 1), (1, 0), (3, 5), (4, 7)] {
        let list = List::new(chunk_size)?;
        for i in 0..(chunk_size * m + r) {
            list.emplace(i)?;
        }
        let expected = m + if r > 0 { 1 } else { 0 };
        assert_eq!(list.chunk_count(), expected, "m = {}, r = {}", m, r);
    }
    Ok(())
}

#[derive(Debug)]
struct Tracked(Arc<AtomicUsize>);

impl Drop for Tracked {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn values_dropped_exactly_once() -> Result<(), Error> {
    let drops = Arc::new(AtomicUsize::new(0));
    {
        let list = List::new(3)?;
        for _ in 0..10 {
            list.emplace(Tracked(drops.clone()))?;
        }

        for _ in 0..3 {
            assert!(list.try_pop().is_some());
        }
        assert_eq!(drops.load(Ordering::SeqCst), 3);

        {
            let mut iter = list.begin();
            iter.advance();
            iter.advance();
        }
        assert_eq!(drops.load(Ordering::SeqCst), 5);

        {
            let peek = list.pop();
            assert!(peek.get().is_some());
        }
        assert_eq!(drops.load(Ordering::SeqCst), 5);

        // Reuse retired slots, they must not drop anything on the way in.
        list.emplace(Tracked(drops.clone()))?;
        assert_eq!(drops.load(Ordering::SeqCst), 5);
    }
    assert_eq!(drops.load(Ordering::SeqCst), 11);
    Ok(())
}

#[test]
fn emplace_with_constructs_in_place() -> Result<(), Error> {
    let list = List::new(2)?;
    list.emplace_with(|| vec![1u8; 32])?;
    assert_eq!(list.try_pop().map(|v| v.len()), Some(32));
    Ok(())
}

#[test]
fn mapped_chunks() -> Result<(), Error> {
    let list = List::with_allocator(256, Mapped)?;
    for i in 0..1_000u64 {
        list.emplace(i)?;
    }
    assert_eq!(list.chunk_count(), 4);
    let sum: u64 = list.begin().sum();
    assert_eq!(sum, (0..1_000u64).sum());
    Ok(())
}

// Serves chunks from the heap while the shared budget lasts.
struct Limited(Arc<AtomicUsize>);

impl ChunkAllocator for Limited {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, Error> {
        let granted = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        match granted {
            Ok(_) => Heap.allocate(layout),
            Err(_) => Err(Error::new(ErrorKind::OutOfMemory, "chunk budget spent")),
        }
    }

    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        Heap.release(ptr, layout)
    }
}

#[test]
fn failed_chunk_allocation_is_reported() -> Result<(), Error> {
    let budget = Arc::new(AtomicUsize::new(1));
    let list = List::with_allocator(2, Limited(budget.clone()))?;
    list.emplace(1)?;
    list.emplace(2)?;
    assert_eq!(list.chunk_count(), 1);

    assert_eq!(list.emplace(3).err().map(|e| e.kind()), Some(ErrorKind::OutOfMemory));
    assert_eq!(list.chunk_count(), 1);
    let values: Vec<i32> = list.begin().collect();
    assert_eq!(values, vec![2, 1]);

    // Drained nodes are back on the free set, no allocation needed.
    list.emplace(4)?;
    list.emplace(5)?;
    assert_eq!(list.chunk_count(), 1);
    assert_eq!(list.emplace(6).err().map(|e| e.kind()), Some(ErrorKind::OutOfMemory));

    budget.store(1, Ordering::SeqCst);
    list.emplace(6)?;
    assert_eq!(list.chunk_count(), 2);
    let values: Vec<i32> = list.begin().collect();
    assert_eq!(values, vec![6, 5, 4]);
    Ok(())
}
