use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ring_coroutine::{
    coroutine_count, create, current, current_name, spawn, status, teardown, yield_now,
    CoroutineHandle, Status,
};

type Log = Rc<RefCell<Vec<String>>>;

fn push(log: &Log, event: impl Into<String>) {
    log.borrow_mut().push(event.into());
}

fn all_dead(handles: &[CoroutineHandle]) -> bool {
    handles
        .iter()
        .all(|handle| status(*handle) == Some(Status::Dead))
}

#[test]
fn concrete_trace() {
    let log = Log::default();
    let mut handles = Vec::new();
    for name in ["a", "b"] {
        let log = Rc::clone(&log);
        handles.push(spawn(name, move || {
            push(&log, format!("{}1", name));
            yield_now();
            push(&log, format!("{}2", name));
        }));
    }
    assert_eq!(3, coroutine_count());
    assert_eq!(Some(Status::New), status(handles[0]));

    yield_now();
    assert_eq!(vec!["a1", "b1"], *log.borrow());
    assert_eq!(Some(Status::Running), status(handles[0]));

    yield_now();
    assert_eq!(vec!["a1", "b1", "a2", "b2"], *log.borrow());
    assert!(all_dead(&handles));

    // both are dead: nothing else runs
    yield_now();
    assert_eq!(4, log.borrow().len());
    // finished coroutines nobody waited on stay in the ring
    assert_eq!(3, coroutine_count());
}

#[test]
fn round_robin() {
    let log = Log::default();
    let mut handles = Vec::new();
    for name in ["a", "b", "c"] {
        let log = Rc::clone(&log);
        handles.push(spawn(name, move || {
            for _ in 0..3 {
                push(&log, name);
                yield_now();
            }
        }));
    }
    while !all_dead(&handles) {
        push(&log, "main");
        yield_now();
    }
    let expected: Vec<&str> = vec![
        "main", "a", "b", "c", "main", "a", "b", "c", "main", "a", "b", "c", "main",
    ];
    assert_eq!(expected, *log.borrow());
}

#[test]
fn skips_finished_coroutines() {
    let log = Log::default();
    let short = {
        let log = Rc::clone(&log);
        spawn("short", move || push(&log, "short"))
    };
    let long = {
        let log = Rc::clone(&log);
        spawn("long", move || {
            for _ in 0..3 {
                push(&log, "long");
                yield_now();
            }
        })
    };
    for _ in 0..4 {
        yield_now();
    }
    assert_eq!(vec!["short", "long", "long", "long"], *log.borrow());
    assert_eq!(Some(Status::Dead), status(short));
    assert_eq!(Some(Status::Dead), status(long));
}

#[test]
fn created_while_running_runs_after_the_round() {
    let log = Log::default();
    for name in ["a", "b", "c"] {
        let log = Rc::clone(&log);
        spawn(name, move || {
            push(&log, name);
            if name == "a" {
                let log = Rc::clone(&log);
                spawn("d", move || push(&log, "d"));
            }
            yield_now();
        });
    }
    yield_now();
    push(&log, "main");
    yield_now();
    let log = log.borrow();
    assert_eq!(vec!["a", "b", "c", "main", "d"], log[..5].to_vec());
}

#[test]
fn every_coroutine_gets_a_turn() {
    let turns = Rc::new(Cell::new(0usize));
    let handles: Vec<_> = (0..50)
        .map(|i| {
            let turns = Rc::clone(&turns);
            spawn(format!("worker-{}", i), move || turns.set(turns.get() + 1))
        })
        .collect();
    assert_eq!(51, coroutine_count());
    yield_now();
    assert_eq!(50, turns.get());
    assert!(all_dead(&handles));
    teardown();
    assert_eq!(1, coroutine_count());
}

fn bump(counter: Rc<Cell<u32>>) {
    counter.set(counter.get() + 1);
    yield_now();
    counter.set(counter.get() + 1);
}

#[test]
fn create_with_argument() {
    let counter = Rc::new(Cell::new(0));
    let handle = create("bump", bump, Rc::clone(&counter));
    assert_eq!(Some(String::from("bump")), ring_coroutine::name(handle));
    yield_now();
    assert_eq!(1, counter.get());
    yield_now();
    assert_eq!(2, counter.get());
    assert_eq!(Some(Status::Dead), status(handle));
}

#[test]
fn current_coroutine() {
    assert!(current().is_none());
    assert_eq!("main", current_name());
    let seen = Rc::new(RefCell::new(None));
    let handle = {
        let seen = Rc::clone(&seen);
        spawn("worker", move || {
            let me = current().map(|handle| handle.id());
            *seen.borrow_mut() = Some((me, current_name()));
        })
    };
    yield_now();
    assert_eq!(
        Some((Some(handle.id()), String::from("worker"))),
        *seen.borrow()
    );
    assert!(current().is_none());
}

#[test]
fn runtime_is_per_thread() {
    let handle = spawn("local", || {});
    let there = std::thread::spawn(move || (status(handle), coroutine_count()))
        .join()
        .unwrap();
    assert_eq!((None, 1), there);
    assert_eq!(Some(Status::New), status(handle));
}
