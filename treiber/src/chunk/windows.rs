use log::warn;
use std::alloc::Layout;
use std::io::Error;
use std::ptr::{self, NonNull};

use winapi::um::memoryapi::{VirtualAlloc, VirtualFree};
use winapi::um::sysinfoapi::{GetSystemInfo, LPSYSTEM_INFO, SYSTEM_INFO};
use winapi::um::winnt::{MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE};

use super::{ChunkAllocator, Mapped};

#[cold]
pub(super) fn sys_page_size() -> usize {
    unsafe {
        let mut info: SYSTEM_INFO = std::mem::zeroed();
        GetSystemInfo(&mut info as LPSYSTEM_INFO);
        info.dwPageSize as usize
    }
}

impl ChunkAllocator for Mapped {
    fn validate(&self, layout: Layout) -> Result<(), Error> {
        Mapped::check_alignment(layout)
    }

    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, Error> {
        // Reserve and commit in one go, chunks are written to right away.
        let ptr = unsafe {
            VirtualAlloc(
                ptr::null_mut(),
                layout.size(),
                MEM_RESERVE | MEM_COMMIT,
                PAGE_READWRITE,
            )
        };
        NonNull::new(ptr as *mut u8).ok_or_else(Error::last_os_error)
    }

    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        // MEM_RELEASE frees the whole reservation and requires a size of 0.
        if VirtualFree(ptr.as_ptr() as *mut winapi::ctypes::c_void, 0, MEM_RELEASE) == 0 {
            warn!(
                "Failed to release chunk of {} bytes: {}",
                layout.size(),
                Error::last_os_error()
            );
        }
    }
}
