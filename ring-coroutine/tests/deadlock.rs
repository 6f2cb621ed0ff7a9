use std::cell::Cell;
use std::rc::Rc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use ring_coroutine::{spawn, status, wait, yield_now, CoroutineHandle, Status};

const TIMEOUT: Duration = Duration::from_millis(300);

// The helper thread below never finishes. Its root keeps yielding to a ring
// where nothing else can run, and is left there when the test process exits.

#[test]
fn mutual_wait_never_completes() {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let slot_a: Rc<Cell<Option<CoroutineHandle>>> = Rc::new(Cell::new(None));
        let slot_b: Rc<Cell<Option<CoroutineHandle>>> = Rc::new(Cell::new(None));
        let a = {
            let slot_b = Rc::clone(&slot_b);
            spawn("a", move || {
                if let Some(b) = slot_b.get() {
                    wait(b);
                }
            })
        };
        let b = {
            let slot_a = Rc::clone(&slot_a);
            spawn("b", move || {
                if let Some(a) = slot_a.get() {
                    wait(a);
                }
            })
        };
        slot_a.set(Some(a));
        slot_b.set(Some(b));
        yield_now();
        let _ = tx.send((status(a), status(b)));
        while status(a) != Some(Status::Dead) && status(b) != Some(Status::Dead) {
            yield_now();
        }
        let _ = tx.send((status(a), status(b)));
    });

    let blocked = rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!((Some(Status::Waiting), Some(Status::Waiting)), blocked);
    assert_eq!(Err(RecvTimeoutError::Timeout), rx.recv_timeout(TIMEOUT));
}
