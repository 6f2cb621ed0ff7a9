pub mod memory;

pub mod pool;

mod system;

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use once_cell::sync::Lazy;

pub use crate::memory::{Memory, MemoryError};
pub use crate::pool::SizedMemoryPool;

/// Default size of a coroutine stack.
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

static MEMORY_POOL: Lazy<Mutex<HashMap<usize, SizedMemoryPool>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn pools() -> MutexGuard<'static, HashMap<usize, SizedMemoryPool>> {
    MEMORY_POOL.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Takes a stack of at least `size` bytes from the pool serving that size,
/// mapping a fresh one when the pool has nothing to hand out.
pub fn allocate(size: usize) -> Result<Memory, MemoryError> {
    let size = Memory::round_size(size)?;
    pools()
        .entry(size)
        .or_insert_with(|| SizedMemoryPool::new(size))
        .allocate()
}

/// Hands `stack` back to its pool so a later [`allocate`] can reuse it.
pub fn revert(stack: Memory) {
    match pools().get_mut(&stack.len()) {
        Some(pool) => pool.revert(stack),
        None => stack.release(),
    }
}

/// Unmaps `stack` for good.
pub fn drop(stack: Memory) {
    match pools().get_mut(&stack.len()) {
        Some(pool) => pool.drop(stack),
        None => stack.release(),
    }
}

/// Returns `(available, using)` for the pool serving `size`.
pub fn usage(size: usize) -> (usize, usize) {
    let Ok(size) = Memory::round_size(size) else {
        return (0, 0);
    };
    pools()
        .get(&size)
        .map(|pool| (pool.available().len(), pool.using().len()))
        .unwrap_or((0, 0))
}

pub fn default() -> Result<Memory, MemoryError> {
    allocate(default_size())
}

pub fn default_size() -> usize {
    DEFAULT_STACK_SIZE.min(system::max_size())
}

pub fn page_size() -> usize {
    system::page_size()
}
