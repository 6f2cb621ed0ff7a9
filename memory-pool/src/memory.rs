use std::io;
use std::os::raw::c_void;

use crate::system;

/// Error type returned by stack allocation methods.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Contains the maximum amount of memory allowed to be allocated as stack space.
    #[error("requested more than max size of {0} bytes for a stack")]
    ExceedsMaximumSize(usize),

    /// The system refused to map the region.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A mapped region used as a coroutine stack.
///
/// `Memory` is a plain handle: copying it does not copy the region and dropping
/// it does not unmap it. Ownership is tracked by the pool, see [`crate::revert`]
/// and [`crate::drop`].
#[repr(C)]
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct Memory {
    top: *mut c_void,
    bottom: *mut c_void,
}

unsafe impl Send for Memory {}

unsafe impl Sync for Memory {}

impl Memory {
    /// Maps a new stack of **at least** `size` bytes.
    ///
    /// `size` is raised to the platform minimum and rounded up to a multiple of
    /// the page size.
    pub fn new(size: usize) -> Result<Memory, MemoryError> {
        let size = Memory::round_size(size)?;
        let stack = unsafe { system::allocate(size) }?;
        log::trace!("mapped stack {:p}..{:p}", stack.bottom, stack.top);
        Ok(stack)
    }

    /// Returns the size a request for `size` bytes is served with.
    pub fn round_size(size: usize) -> Result<usize, MemoryError> {
        let page_size = system::page_size();
        let max_size = system::max_size();
        size.max(system::min_size())
            .checked_add(page_size - 1)
            .map(|size| size & !(page_size - 1))
            .filter(|size| *size <= max_size)
            .ok_or(MemoryError::ExceedsMaximumSize(max_size))
    }

    /// Creates a (non-owning) representation of some stack memory.
    ///
    /// It is unsafe because it is your reponsibility to make sure that `top` and `bottom` are valid
    /// addresses.
    #[inline]
    pub(crate) unsafe fn init(top: *mut c_void, bottom: *mut c_void) -> Memory {
        debug_assert!(top >= bottom);
        Memory { top, bottom }
    }

    /// Returns the top of the stack from which on it grows downwards towards bottom().
    #[inline]
    pub fn top(&self) -> *mut c_void {
        self.top
    }

    /// Returns the bottom of the stack and thus it's end.
    #[inline]
    pub fn bottom(&self) -> *mut c_void {
        self.bottom
    }

    /// Returns the size of the stack between top() and bottom().
    #[inline]
    pub fn len(&self) -> usize {
        self.top as usize - self.bottom as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unmaps the region. The handle and every copy of it dangle afterwards.
    pub fn release(self) {
        log::trace!("unmapping stack {:p}..{:p}", self.bottom, self.top);
        unsafe { system::deallocate(self.bottom, self.len()) }
    }
}
