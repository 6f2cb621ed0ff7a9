use std::fmt::{self, Debug, Formatter};

use id_generator::IdGenerator;
use memory_pool::Memory;
use object_ring::Key;

use crate::context::{Context, ContextFn};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Status {
    ///created, its entry has not run yet
    New,
    ///has run and is not blocked
    Running,
    ///blocked in `wait`
    Waiting,
    ///entry returned, storage not reclaimed yet
    Dead,
}

impl Status {
    /// Whether the scheduler may pick a coroutine in this status.
    pub fn is_eligible(&self) -> bool {
        matches!(self, Status::New | Status::Running)
    }
}

pub(crate) type Entry = Box<dyn FnOnce()>;

/// Non-owning reference to a coroutine created on some thread's runtime.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct CoroutineHandle {
    scheduler: usize,
    key: Key,
    id: usize,
}

impl CoroutineHandle {
    pub(crate) fn new(scheduler: usize, key: Key, id: usize) -> Self {
        CoroutineHandle { scheduler, key, id }
    }

    /// Process-wide id of the coroutine, for diagnostics.
    pub fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn scheduler(&self) -> usize {
        self.scheduler
    }

    pub(crate) fn key(&self) -> Key {
        self.key
    }
}

pub(crate) struct Coroutine {
    id: usize,
    name: String,
    status: Status,
    //user function, taken when the coroutine starts
    entry: Option<Entry>,
    //none for the root, which runs on the thread's own stack
    stack: Option<Memory>,
    //where to continue, set whenever the coroutine switches away
    context: Option<Context>,
    //the coroutine blocked in `wait` on this one
    waiter: Option<Key>,
}

impl Coroutine {
    pub(crate) fn root() -> Self {
        Coroutine {
            id: IdGenerator::next_id("coroutine"),
            name: String::from("main"),
            status: Status::Running,
            entry: None,
            stack: None,
            context: None,
            waiter: None,
        }
    }

    pub(crate) fn new(name: String, stack: Memory, entry: Entry) -> Self {
        Coroutine {
            id: IdGenerator::next_id("coroutine"),
            name,
            status: Status::New,
            entry: Some(entry),
            stack: Some(stack),
            context: None,
            waiter: None,
        }
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn status(&self) -> Status {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: Status) -> &mut Self {
        self.status = status;
        self
    }

    pub(crate) fn waiter(&self) -> Option<Key> {
        self.waiter
    }

    pub(crate) fn set_waiter(&mut self, waiter: Key) -> &mut Self {
        self.waiter = Some(waiter);
        self
    }

    pub(crate) fn take_entry(&mut self) -> Option<Entry> {
        self.entry.take()
    }

    pub(crate) fn set_context(&mut self, context: Context) -> &mut Self {
        self.context = Some(context);
        self
    }

    pub(crate) fn take_context(&mut self) -> Option<Context> {
        self.context.take()
    }

    /// Prepares the first frame of a coroutine that never ran.
    pub(crate) fn start_context(&self, f: ContextFn) -> Option<Context> {
        // the stack lives as long as the descriptor, which outlives every resume
        self.stack.as_ref().map(|stack| unsafe { Context::new(stack, f) })
    }

    /// Releases the descriptor, keeping its stack around for the next coroutine.
    pub(crate) fn recycle(mut self) {
        if let Some(stack) = self.stack.take() {
            memory_pool::revert(stack);
        }
    }
}

impl Drop for Coroutine {
    fn drop(&mut self) {
        if let Some(stack) = self.stack.take() {
            memory_pool::drop(stack);
        }
    }
}

impl Debug for Coroutine {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coroutine")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status)
            .field("waiter", &self.waiter)
            .finish()
    }
}
