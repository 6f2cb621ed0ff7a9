use std::cell::{Cell, RefCell};
use std::os::raw::c_void;
use std::panic::{self, AssertUnwindSafe};

use id_generator::IdGenerator;
use object_ring::{Key, ObjectRing};

use crate::config::{Config, Livelock};
use crate::context::Transfer;
use crate::coroutine::{Coroutine, CoroutineHandle, Entry, Status};
use crate::die;

thread_local! {
    static SCHEDULER: Scheduler = Scheduler::new();
}

/// The ring of every coroutine living on one thread.
///
/// All state sits behind `Cell`/`RefCell`: operations take `&self` and never
/// hold a borrow across a context switch, since the coroutine switched to
/// uses the same scheduler.
#[derive(Debug)]
pub(crate) struct Scheduler {
    id: usize,
    ring: RefCell<ObjectRing<Coroutine>>,
    root: Cell<Key>,
    current: Cell<Key>,
    //the coroutine that switched away last, its context is saved by whoever runs next
    previous: Cell<Option<Key>>,
    config: Cell<Config>,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        let mut ring = ObjectRing::new();
        let root = ring.push_first(Coroutine::root());
        let scheduler = Scheduler {
            id: IdGenerator::next_id("scheduler"),
            ring: RefCell::new(ring),
            root: Cell::new(root),
            current: Cell::new(root),
            previous: Cell::new(None),
            config: Cell::new(Config::default()),
        };
        log::debug!("scheduler #{} initialized", scheduler.id);
        scheduler
    }

    /// Runs `f` with the scheduler of the calling thread.
    pub(crate) fn with<R>(f: impl FnOnce(&Scheduler) -> R) -> R {
        SCHEDULER
            .try_with(f)
            .unwrap_or_else(|_| die("coroutine runtime used while its thread is shutting down"))
    }

    pub(crate) fn config(&self) -> Config {
        self.config.get()
    }

    pub(crate) fn configure(&self, config: Config) {
        self.config.set(config);
    }

    pub(crate) fn create(&self, name: String, stack_size: usize, entry: Entry) -> CoroutineHandle {
        let stack = memory_pool::allocate(stack_size).unwrap_or_else(|err| {
            die(&format!(
                "failed to allocate a {} byte stack for coroutine `{}`: {}",
                stack_size, name, err
            ))
        });
        let coroutine = Coroutine::new(name, stack, entry);
        let id = coroutine.id();
        let current = self.current.get();
        // the caller reaches it last, so coroutines run in creation order
        let key = self.ring.borrow_mut().insert_before(current, coroutine);
        let Some(key) = key else {
            die("current coroutine is missing from the ring")
        };
        log::debug!(
            "created coroutine #{} `{}`",
            id,
            self.name_of(key).unwrap_or_default()
        );
        CoroutineHandle::new(self.id, key, id)
    }

    pub(crate) fn yield_now(&self) {
        let from = self.current.get();
        let to = self.next_eligible(from);
        self.switch(from, to);
    }

    pub(crate) fn wait(&self, handle: CoroutineHandle) {
        if handle.scheduler() != self.id {
            die(&format!(
                "coroutine #{} belongs to another thread's runtime",
                handle.id()
            ));
        }
        let target = handle.key();
        let caller = self.current.get();
        if target == caller {
            die(&format!(
                "coroutine #{} `{}` waits on itself",
                handle.id(),
                self.current_name()
            ));
        }
        {
            let mut ring = self.ring.borrow_mut();
            let Some(coroutine) = ring.get_mut(target) else {
                die(&format!("coroutine #{} was already reclaimed", handle.id()))
            };
            if coroutine.waiter().is_some() {
                die(&format!(
                    "coroutine #{} `{}` already has a waiter",
                    coroutine.id(),
                    coroutine.name()
                ));
            }
            coroutine.set_waiter(caller);
            if let Some(coroutine) = ring.get_mut(caller) {
                coroutine.set_status(Status::Waiting);
            }
        }
        loop {
            match self.status(target) {
                Some(Status::Dead) => break,
                Some(_) => self.yield_now(),
                None => die(&format!("coroutine #{} vanished while waited on", handle.id())),
            }
        }
        let reclaimed = {
            let mut ring = self.ring.borrow_mut();
            if let Some(coroutine) = ring.get_mut(caller) {
                coroutine.set_status(Status::Running);
            }
            ring.remove(target)
        };
        if let Some(coroutine) = reclaimed {
            log::debug!("reclaimed coroutine #{} `{}`", coroutine.id(), coroutine.name());
            coroutine.recycle();
        }
    }

    /// Frees every coroutine and starts over with a fresh root.
    pub(crate) fn teardown(&self) {
        if self.current.get() != self.root.get() {
            die(&format!(
                "teardown called from coroutine `{}`, only the root may tear down",
                self.current_name()
            ));
        }
        let released = {
            let mut ring = self.ring.borrow_mut();
            let released = ring.drain();
            let root = ring.push_first(Coroutine::root());
            self.root.set(root);
            self.current.set(root);
            released
        };
        self.previous.set(None);
        log::debug!(
            "scheduler #{} released {} coroutines",
            self.id,
            released.len().saturating_sub(1)
        );
        // entries dropped here may call back into the runtime
        drop(released);
    }

    pub(crate) fn status(&self, key: Key) -> Option<Status> {
        self.ring.borrow().get(key).map(Coroutine::status)
    }

    pub(crate) fn handle_status(&self, handle: CoroutineHandle) -> Option<Status> {
        if handle.scheduler() != self.id {
            return None;
        }
        self.status(handle.key())
    }

    pub(crate) fn name_of(&self, key: Key) -> Option<String> {
        self.ring
            .borrow()
            .get(key)
            .map(|coroutine| coroutine.name().to_owned())
    }

    pub(crate) fn handle_name(&self, handle: CoroutineHandle) -> Option<String> {
        if handle.scheduler() != self.id {
            return None;
        }
        self.name_of(handle.key())
    }

    pub(crate) fn current(&self) -> Option<CoroutineHandle> {
        let current = self.current.get();
        if current == self.root.get() {
            return None;
        }
        self.ring
            .borrow()
            .get(current)
            .map(|coroutine| CoroutineHandle::new(self.id, current, coroutine.id()))
    }

    pub(crate) fn current_name(&self) -> String {
        self.name_of(self.current.get()).unwrap_or_default()
    }

    pub(crate) fn len(&self) -> usize {
        self.ring.borrow().len()
    }

    /// First coroutine after `from` (ending with `from` itself) that may run.
    fn find_eligible(&self, from: Key) -> Option<Key> {
        self.ring
            .borrow()
            .find_after(from, |coroutine| coroutine.status().is_eligible())
    }

    fn next_eligible(&self, from: Key) -> Key {
        if let Some(key) = self.find_eligible(from) {
            return key;
        }
        let name = self.name_of(from).unwrap_or_default();
        match self.config.get().livelock() {
            Livelock::Abort => die(&format!(
                "no eligible coroutine after `{}`: every coroutine is waiting or dead",
                name
            )),
            Livelock::Spin => {
                log::warn!(
                    "no eligible coroutine after `{}`, scheduler #{} spins forever",
                    name,
                    self.id
                );
                loop {
                    if let Some(key) = self.find_eligible(from) {
                        return key;
                    }
                    std::hint::spin_loop();
                }
            }
        }
    }

    /// Transfers control from `from` to `to`, returns once `from` is resumed.
    fn switch(&self, from: Key, to: Key) {
        if from == to {
            return;
        }
        let target = {
            let mut ring = self.ring.borrow_mut();
            let Some(coroutine) = ring.get_mut(to) else {
                die("switch target is missing from the ring")
            };
            if coroutine.status() == Status::New {
                coroutine.set_status(Status::Running);
                log::debug!("starting coroutine #{} `{}`", coroutine.id(), coroutine.name());
                coroutine.start_context(coroutine_function)
            } else {
                coroutine.take_context()
            }
        };
        let Some(target) = target else {
            die("switch target has no context to resume")
        };
        log::trace!("switch {:?} -> {:?}", from, to);
        self.previous.set(Some(from));
        self.current.set(to);
        // a coroutine starting up finds its scheduler in the transfer data
        let transfer = target.resume(self as *const Scheduler as *mut c_void);
        self.resumed(transfer);
    }

    /// Saves the context of the coroutine that just switched to the current one.
    fn resumed(&self, transfer: Transfer) {
        if let Some(previous) = self.previous.take() {
            if let Some(coroutine) = self.ring.borrow_mut().get_mut(previous) {
                coroutine.set_context(transfer.context);
            }
        }
    }

    /// Runs the entry of the current coroutine, then leaves it for good.
    fn run_current(&self) {
        let key = self.current.get();
        let entry = self
            .ring
            .borrow_mut()
            .get_mut(key)
            .and_then(Coroutine::take_entry);
        let Some(entry) = entry else {
            die("started coroutine has no entry")
        };
        if panic::catch_unwind(AssertUnwindSafe(entry)).is_err() {
            die(&format!(
                "coroutine `{}` panicked",
                self.name_of(key).unwrap_or_default()
            ));
        }
        self.finish(key);
    }

    fn finish(&self, key: Key) {
        let waiter = {
            let mut ring = self.ring.borrow_mut();
            let Some(coroutine) = ring.get_mut(key) else {
                die("finished coroutine is missing from the ring")
            };
            coroutine.set_status(Status::Dead);
            log::debug!("coroutine #{} `{}` finished", coroutine.id(), coroutine.name());
            coroutine.waiter()
        };
        let to = match waiter {
            Some(waiter) => waiter,
            None => self.next_eligible(key),
        };
        self.switch(key, to);
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        log::debug!(
            "scheduler #{} torn down with {} coroutines",
            self.id,
            self.ring.get_mut().len()
        );
    }
}

extern "C" fn coroutine_function(transfer: Transfer) -> ! {
    // the scheduler outlives every coroutine in its ring
    let scheduler = unsafe { &*(transfer.data as *const Scheduler) };
    scheduler.resumed(transfer);
    scheduler.run_current();
    die("finished coroutine was resumed")
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::env;
    use std::os::unix::process::ExitStatusExt;
    use std::process::Command;
    use std::rc::Rc;

    use crate::config::Livelock;
    use crate::coroutine::Status;
    use crate::scheduler::Scheduler;

    fn noop() -> crate::coroutine::Entry {
        Box::new(|| {})
    }

    #[test]
    fn root_only() {
        let scheduler = Scheduler::new();
        assert_eq!(1, scheduler.len());
        assert_eq!("main", scheduler.current_name());
        assert!(scheduler.current().is_none());
        // the root is its own successor, yielding is a no-op
        scheduler.yield_now();
        assert_eq!(Some(Status::Running), scheduler.status(scheduler.root.get()));
    }

    #[test]
    fn creation_order() {
        let scheduler = Scheduler::new();
        let size = scheduler.config().stack_size();
        let a = scheduler.create(String::from("a"), size, noop());
        let b = scheduler.create(String::from("b"), size, noop());
        let root = scheduler.root.get();
        assert_eq!(Some(a.key()), scheduler.find_eligible(root));
        assert_eq!(Some(b.key()), scheduler.find_eligible(a.key()));
        assert_eq!(Some(root), scheduler.find_eligible(b.key()));
        assert_eq!(Some(Status::New), scheduler.handle_status(a));
        assert_eq!(Some(String::from("b")), scheduler.handle_name(b));
        assert_eq!(3, scheduler.len());
    }

    #[test]
    fn skips_waiting_and_dead() {
        let scheduler = Scheduler::new();
        let size = scheduler.config().stack_size();
        let a = scheduler.create(String::from("a"), size, noop());
        let b = scheduler.create(String::from("b"), size, noop());
        let root = scheduler.root.get();
        {
            let mut ring = scheduler.ring.borrow_mut();
            ring.get_mut(a.key()).unwrap().set_status(Status::Dead);
        }
        assert_eq!(Some(b.key()), scheduler.find_eligible(root));
        {
            let mut ring = scheduler.ring.borrow_mut();
            ring.get_mut(b.key()).unwrap().set_status(Status::Waiting);
        }
        assert_eq!(Some(root), scheduler.find_eligible(root));
        {
            let mut ring = scheduler.ring.borrow_mut();
            ring.get_mut(root).unwrap().set_status(Status::Waiting);
        }
        // nothing left to run: this is where a livelock starts
        assert_eq!(None, scheduler.find_eligible(root));
    }

    #[test]
    fn foreign_handles_are_not_resolved() {
        let here = Scheduler::new();
        let there = Scheduler::new();
        let size = here.config().stack_size();
        let handle = here.create(String::from("local"), size, noop());
        assert_eq!(Some(Status::New), here.handle_status(handle));
        assert_eq!(None, there.handle_status(handle));
        assert_eq!(None, there.handle_name(handle));
    }

    #[test]
    fn teardown_drops_unstarted_entries() {
        let scheduler = Scheduler::new();
        let size = scheduler.config().stack_size();
        let token = Rc::new(RefCell::new(()));
        let captured = Rc::clone(&token);
        let handle = scheduler.create(
            String::from("never run"),
            size,
            Box::new(move || drop(captured)),
        );
        assert_eq!(2, Rc::strong_count(&token));
        scheduler.teardown();
        assert_eq!(1, Rc::strong_count(&token));
        assert_eq!(1, scheduler.len());
        assert_eq!(None, scheduler.handle_status(handle));
    }

    #[test]
    fn livelock_abort() {
        const CASE: &str = "RING_COROUTINE_LIVELOCK";
        if env::var_os(CASE).is_some() {
            let scheduler = Scheduler::new();
            scheduler.configure(scheduler.config().with_livelock(Livelock::Abort));
            let root = scheduler.root.get();
            scheduler
                .ring
                .borrow_mut()
                .get_mut(root)
                .unwrap()
                .set_status(Status::Waiting);
            scheduler.yield_now();
            std::process::exit(0);
        }
        let output = Command::new(env::current_exe().unwrap())
            .args([
                "scheduler::tests::livelock_abort",
                "--exact",
                "--nocapture",
                "--test-threads=1",
            ])
            .env(CASE, "1")
            .output()
            .unwrap();
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert_eq!(Some(libc::SIGABRT), output.status.signal(), "{}", stderr);
        assert!(
            stderr.contains("no eligible coroutine after `main`"),
            "{}",
            stderr
        );
    }
}
