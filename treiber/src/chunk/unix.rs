use libc::{mmap, munmap, MAP_ANON, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE};
use log::warn;
use std::alloc::Layout;
use std::io::{Error, ErrorKind};
use std::ptr::{self, NonNull};

use super::{ChunkAllocator, Mapped};

#[cold]
pub(super) fn sys_page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

impl ChunkAllocator for Mapped {
    fn validate(&self, layout: Layout) -> Result<(), Error> {
        Mapped::check_alignment(layout)
    }

    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, Error> {
        let ptr = unsafe {
            mmap(
                ptr::null_mut(),
                layout.size(),
                PROT_READ | PROT_WRITE,
                MAP_PRIVATE | MAP_ANON,
                -1,
                0,
            )
        };
        if ptr == MAP_FAILED {
            return Err(Error::last_os_error());
        }
        NonNull::new(ptr as *mut u8)
            .ok_or_else(|| Error::new(ErrorKind::Other, "mmap returned a null mapping"))
    }

    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        // The length must match the mapping, which is why the arena keeps a single layout.
        if munmap(ptr.as_ptr() as *mut libc::c_void, layout.size()) != 0 {
            warn!(
                "Failed to unmap chunk of {} bytes: {}",
                layout.size(),
                Error::last_os_error()
            );
        }
    }
}
