//! # spinpark 🅿️
//!
//! A lightweight **spin-then-park mutex** for concurrent Rust programs. All
//! lock bookkeeping lives in one 32-bit atomic word; contended threads spin
//! briefly and then park on a futex, so the uncontended path is a single
//! compare-and-swap and the contended path does not burn CPU.
//!
//! The crate includes:
//!
//! - [`RawMutex`] — the core state machine: CAS fast path, adaptive spin,
//!   park-on-semaphore slow path, wake-one unlock.
//! - [`Mutex<T>`] / [`MutexGuard`] — the typed RAII surface, provided
//!   through [`lock_api`] so the lock composes with anything generic over
//!   `lock_api::RawMutex`.
//! - [`Semaphore`] / [`FutexSemaphore`] — the pluggable parking backend.
//! - [`SpinPolicy`] / [`AdaptiveSpin`] / [`NoSpin`] — the pluggable spin
//!   heuristic.
//!
//! ## 🚀 Quick Example
//!
//! ```rust
//! use spinpark::{Mutex, RawMutex};
//!
//! static COUNTER: Mutex<u32> = Mutex::const_new(RawMutex::new(), 0);
//!
//! {
//!     let mut guard = COUNTER.lock();
//!     *guard += 1;
//! } // unlocked when the guard drops
//! assert_eq!(*COUNTER.lock(), 1);
//! ```
//!
//! ## 🧠 Design
//!
//! The state word packs a locked bit, a "woken" bit and a waiter count.
//! A thread that loses the fast-path CAS spins while the [`SpinPolicy`]
//! allows, advertises itself through the woken bit so a concurrent unlock
//! skips the semaphore, and otherwise increments the waiter count and parks.
//! Unlock drops the locked bit and, when waiters exist and nobody else has
//! taken over, claims the woken bit and releases exactly one permit.
//!
//! A wake never hands over the lock. It only grants the right to race again,
//! and a spinning newcomer may win that race. This deliberately trades
//! fairness for throughput; there is no starvation bound for an individual
//! thread.
//!
//! ## ⚠️ Safety & Usage Notes
//!
//! - The lock records **no owner**: any thread may unlock it, and guards may
//!   be dropped on another thread.
//! - It is **not re-entrant**. Locking twice from one thread deadlocks.
//! - Misuse is fatal by design: unlocking an unlocked mutex panics, as does
//!   a broken internal wake invariant. Neither is returned as an error.
//! - The provided collaborators need an OS (futex, core-count probe). In a
//!   freestanding environment, implement [`Semaphore`] and [`SpinPolicy`]
//!   against your own runtime and plug them into [`RawMutex`].
//!
//! ## 📦 Modules
//!
//! - [`raw`] — the state machine.
//! - [`sema`] — the parking collaborator.
//! - [`spin`] — the spin advisor.
//!
//! With the `trace` cargo feature enabled, every acquire and release emits a
//! [`log`](https://docs.rs/log) event under the `spinpark` target, which a
//! race-detection or lock-order layer can subscribe to. The feature is off
//! by default and costs nothing when disabled.

pub mod raw;
pub mod sema;
pub mod spin;

pub use raw::RawMutex;
pub use sema::{FutexSemaphore, Semaphore};
pub use spin::{AdaptiveSpin, NoSpin, SpinPolicy};

/// A mutual-exclusion lock around a value of type `T`.
///
/// RAII surface over [`RawMutex`] via [`lock_api::Mutex`]; the guard returned
/// by [`lock`](lock_api::Mutex::lock) unlocks on drop.
pub type Mutex<T> = lock_api::Mutex<RawMutex, T>;

/// Guard proving exclusive access to the data behind a [`Mutex`].
pub type MutexGuard<'a, T> = lock_api::MutexGuard<'a, RawMutex, T>;
