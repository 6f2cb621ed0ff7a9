//! Cooperative coroutines scheduled round-robin on a single thread.
//!
//! Every thread owns a ring of coroutines. The thread's own flow of control is
//! the root coroutine, created the first time any function of this crate runs
//! on that thread. [`create`] (or [`spawn`]) links a new coroutine with its own
//! stack into the ring, [`yield_now`] hands control to the next coroutine in
//! ring order that can run, and [`wait`] blocks the caller until a coroutine's
//! entry has returned, then frees it.
//!
//! ```no_run
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let a = {
//!     let log = Rc::clone(&log);
//!     ring_coroutine::spawn("a", move || {
//!         log.borrow_mut().push("a1");
//!         ring_coroutine::yield_now();
//!         log.borrow_mut().push("a2");
//!     })
//! };
//! ring_coroutine::wait(a);
//! assert_eq!(vec!["a1", "a2"], *log.borrow());
//! ```
//!
//! Misuse that would corrupt the ring (waiting twice on one coroutine, waiting
//! on a coroutine that was already reclaimed or lives on another thread, a
//! panic escaping a coroutine) aborts the process with a diagnostic. Mutual
//! waits are not detected. Overflowing a coroutine stack is undefined behaviour.

pub mod config;

pub mod context;

pub mod coroutine;

mod scheduler;

pub use crate::config::{Config, Livelock};
pub use crate::coroutine::{CoroutineHandle, Status};

use crate::scheduler::Scheduler;

/// Creates a coroutine that runs `entry(arg)` on its own stack.
///
/// The coroutine does not run before the caller yields. Coroutines created
/// back to back run in creation order.
pub fn create<T: 'static>(name: impl Into<String>, entry: fn(T), arg: T) -> CoroutineHandle {
    spawn(name, move || entry(arg))
}

/// Closure form of [`create`].
pub fn spawn<F>(name: impl Into<String>, f: F) -> CoroutineHandle
where
    F: FnOnce() + 'static,
{
    Scheduler::with(|scheduler| {
        let stack_size = scheduler.config().stack_size();
        scheduler.create(name.into(), stack_size, Box::new(f))
    })
}

/// [`spawn`] with an explicit stack size instead of the configured one.
pub fn spawn_with_stack_size<F>(name: impl Into<String>, stack_size: usize, f: F) -> CoroutineHandle
where
    F: FnOnce() + 'static,
{
    Scheduler::with(|scheduler| scheduler.create(name.into(), stack_size, Box::new(f)))
}

/// Suspends the caller and runs the next coroutine in ring order that is not
/// waiting or dead. Returns at once when there is none besides the caller.
pub fn yield_now() {
    Scheduler::with(Scheduler::yield_now)
}

/// Blocks the caller until the entry of `handle` returned, then frees it.
pub fn wait(handle: CoroutineHandle) {
    Scheduler::with(|scheduler| scheduler.wait(handle))
}

/// Status of `handle`, `None` once it was reclaimed or when it belongs to
/// another thread.
pub fn status(handle: CoroutineHandle) -> Option<Status> {
    Scheduler::with(|scheduler| scheduler.handle_status(handle))
}

pub fn name(handle: CoroutineHandle) -> Option<String> {
    Scheduler::with(|scheduler| scheduler.handle_name(handle))
}

/// The running coroutine, `None` while the root runs.
pub fn current() -> Option<CoroutineHandle> {
    Scheduler::with(Scheduler::current)
}

pub fn current_name() -> String {
    Scheduler::with(Scheduler::current_name)
}

/// Number of coroutines in the ring, the root included.
pub fn coroutine_count() -> usize {
    Scheduler::with(Scheduler::len)
}

pub fn config() -> Config {
    Scheduler::with(Scheduler::config)
}

/// Replaces the configuration of the calling thread's runtime.
pub fn configure(config: Config) {
    Scheduler::with(|scheduler| scheduler.configure(config))
}

/// Frees every coroutine of the calling thread, finished or not, and starts
/// over with a fresh root. Only the root may call this.
///
/// Values living on the stack of a coroutine that is still suspended are not
/// dropped.
pub fn teardown() {
    Scheduler::with(Scheduler::teardown)
}

pub(crate) fn die(message: &str) -> ! {
    log::error!("{}, aborting.", message);
    eprintln!("{}, aborting.", message);
    std::process::abort();
}
