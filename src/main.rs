//! Example demonstrating usage of the `Mutex` from the `spinpark` crate.
//!
//! This program spawns 16 threads, each incrementing a shared counter
//! 100_000 times. The counter is protected by a `Mutex<i64>`; threads that
//! lose the race spin briefly, then park on the futex until woken.

use spinpark::{Mutex, RawMutex};
use std::thread;

// Shared static mutex protecting a 64-bit counter.
static Q: Mutex<i64> = Mutex::const_new(RawMutex::new(), 0);

/// Increment the global counter 100_000 times.
/// Each increment acquires the lock before modifying the value.
fn add() {
    for _ in 0..100_000 {
        *Q.lock() += 1;
    }
}

fn main() {
    println!("Starting spin-then-park mutex test...");

    // Spawn 16 threads performing concurrent increments.
    let mut threads = Vec::with_capacity(16);
    for _ in 0..16 {
        threads.push(thread::spawn(add));
    }

    // Wait for all threads to finish.
    for t in threads {
        let _ = t.join();
    }

    // Display the final result.
    println!("Final counter value: {}", *Q.lock());
}
