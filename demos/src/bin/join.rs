use ring_coroutine::{create, current_name, spawn, wait, yield_now};

fn count_down(from: u32) {
    for i in (1..=from).rev() {
        println!("{}: {}", current_name(), i);
        yield_now();
    }
}

fn main() {
    let parent = spawn("parent", || {
        let left = create("left", count_down, 3);
        let right = create("right", count_down, 2);
        wait(left);
        wait(right);
        println!("{}: both children joined", current_name());
    });
    wait(parent);
    println!("{}: parent joined", current_name());
}
