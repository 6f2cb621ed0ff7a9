use std::io;
use std::os::raw::c_void;
use std::ptr;

use once_cell::sync::Lazy;

use crate::memory::Memory;

const FALLBACK_PAGE_SIZE: usize = 4096;

// an unlimited RLIMIT_STACK still needs a sane upper bound
const MAX_STACK_SIZE: usize = 1024 * 1024 * 1024;

static PAGE_SIZE: Lazy<usize> = Lazy::new(|| {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        FALLBACK_PAGE_SIZE
    }
});

static MAX_SIZE: Lazy<usize> = Lazy::new(|| {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    let ret = unsafe { libc::getrlimit(libc::RLIMIT_STACK, &mut limit) };
    if ret != 0 || limit.rlim_max == libc::RLIM_INFINITY {
        MAX_STACK_SIZE
    } else {
        (limit.rlim_max as usize).min(MAX_STACK_SIZE)
    }
});

pub fn page_size() -> usize {
    *PAGE_SIZE
}

pub fn min_size() -> usize {
    page_size() * 2
}

pub fn max_size() -> usize {
    *MAX_SIZE
}

pub unsafe fn allocate(size: usize) -> io::Result<Memory> {
    let ptr = libc::mmap(
        ptr::null_mut(),
        size,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANON,
        -1,
        0,
    );
    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    let bottom = ptr as *mut c_void;
    let top = (ptr as usize + size) as *mut c_void;
    Ok(Memory::init(top, bottom))
}

pub unsafe fn deallocate(ptr: *mut c_void, size: usize) {
    if libc::munmap(ptr as *mut libc::c_void, size) != 0 {
        log::error!(
            "munmap of {:p} ({} bytes) failed: {}",
            ptr,
            size,
            io::Error::last_os_error()
        );
    }
}
