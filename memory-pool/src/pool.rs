use std::collections::VecDeque;

use crossbeam_deque::Worker;

use crate::memory::{Memory, MemoryError};

#[derive(Debug)]
pub struct SizedMemoryPool {
    //size of every stack served by this pool
    size: usize,
    //stacks ready to be handed out again
    available: Worker<Memory>,
    //stacks currently owned by a coroutine
    using: VecDeque<Memory>,
}

impl SizedMemoryPool {
    pub fn new(size: usize) -> Self {
        SizedMemoryPool {
            size,
            available: Worker::new_fifo(),
            using: VecDeque::new(),
        }
    }

    pub fn allocate(&mut self) -> Result<Memory, MemoryError> {
        let stack = match self.available.pop() {
            Some(stack) => stack,
            None => Memory::new(self.size)?,
        };
        self.using.push_back(stack);
        Ok(stack)
    }

    fn delete_using(&mut self, stack: &Memory) -> bool {
        match self.using.iter().position(|s| s == stack) {
            Some(index) => {
                self.using.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn revert(&mut self, stack: Memory) {
        if self.delete_using(&stack) {
            self.available.push(stack);
        } else {
            log::warn!("stack {:p} does not belong to this pool", stack.bottom());
        }
    }

    pub fn drop(&mut self, stack: Memory) {
        if self.delete_using(&stack) {
            stack.release();
        } else {
            log::warn!("stack {:p} does not belong to this pool", stack.bottom());
        }
    }

    pub fn available(&self) -> &Worker<Memory> {
        &self.available
    }

    pub fn using(&self) -> &VecDeque<Memory> {
        &self.using
    }
}

impl Drop for SizedMemoryPool {
    fn drop(&mut self) {
        while let Some(stack) = self.available.pop() {
            stack.release();
        }
    }
}
