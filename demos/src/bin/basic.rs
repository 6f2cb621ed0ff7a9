use ring_coroutine::{spawn, yield_now};

fn main() {
    for name in ["a", "b"] {
        let _ = spawn(name, move || {
            println!("{} first turn", name);
            yield_now();
            println!("{} second turn", name);
        });
    }
    for round in 1..=3 {
        println!("main yields ({})", round);
        yield_now();
    }
    println!("main done, {} coroutines left in the ring", ring_coroutine::coroutine_count());
}
