#[cfg(target_family = "unix")]
mod unix;
#[cfg(target_family = "windows")]
mod windows;

#[cfg(target_family = "unix")]
use self::unix::sys_page_size;
#[cfg(target_family = "windows")]
use self::windows::sys_page_size;

use std::alloc::{self, Layout};
use std::io::{Error, ErrorKind};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Source of raw chunk memory.
///
/// An arena allocates every chunk with the same layout and hands the same layout back on release,
/// so implementations never have to remember chunk sizes.
pub trait ChunkAllocator {
    /// Rejects layouts this allocator can never serve. Called once, when the arena is created.
    fn validate(&self, _layout: Layout) -> Result<(), Error> {
        Ok(())
    }

    /// Returns uninitialized memory for one chunk.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, Error>;

    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` on this allocator with the same `layout`, and
    /// must not be released twice.
    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout);
}

impl<A: ChunkAllocator + ?Sized> ChunkAllocator for &A {
    fn validate(&self, layout: Layout) -> Result<(), Error> {
        (**self).validate(layout)
    }

    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, Error> {
        (**self).allocate(layout)
    }

    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        (**self).release(ptr, layout)
    }
}

/// Chunks served by the global Rust allocator.
#[derive(Clone, Copy, Debug, Default)]
pub struct Heap;

impl ChunkAllocator for Heap {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, Error> {
        // Node layouts are never zero sized, every node carries at least its link.
        let ptr = unsafe { alloc::alloc(layout) };
        NonNull::new(ptr).ok_or_else(|| {
            Error::new(
                ErrorKind::OutOfMemory,
                format!("Failed to allocate chunk of {} bytes", layout.size()),
            )
        })
    }

    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        alloc::dealloc(ptr.as_ptr(), layout);
    }
}

/// Chunks mapped directly from the OS, one mapping per chunk.
///
/// Mappings are page aligned and page granular. This pays off for large chunks; for small ones
/// most of each page is wasted and [`Heap`] is the better choice.
#[derive(Clone, Copy, Debug, Default)]
pub struct Mapped;

impl Mapped {
    pub(crate) fn check_alignment(layout: Layout) -> Result<(), Error> {
        if layout.align() > page_size() {
            Err(Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "Chunk alignment of {} bytes exceeds the page size of {} bytes",
                    layout.align(),
                    page_size()
                ),
            ))
        } else {
            Ok(())
        }
    }
}

/// Page size of the OS in bytes, the granularity of [`Mapped`] chunks.
///
/// Queried from the OS on first use and cached afterwards.
pub fn page_size() -> usize {
    static PAGE_SIZE_CACHE: AtomicUsize = AtomicUsize::new(0);
    match PAGE_SIZE_CACHE.load(Ordering::Relaxed) {
        0 => {
            let page_size = sys_page_size();
            PAGE_SIZE_CACHE.store(page_size, Ordering::Relaxed);
            page_size
        }
        page_size => page_size,
    }
}
