//! # RawMutex
//!
//! The core spin-then-park mutual exclusion state machine. All bookkeeping
//! lives in a single 32-bit atomic word, updated exclusively through
//! compare-and-swap and fetch-and-sub. Threads that lose the race first spin
//! (if the [`SpinPolicy`] says it is worth it) and then park themselves on the
//! [`Semaphore`] collaborator until an unlock wakes one of them.
//!
//! The state word packs three fields:
//!
//! | bits   | field        | meaning                                          |
//! |--------|--------------|--------------------------------------------------|
//! | 0      | locked       | some thread currently holds the lock             |
//! | 1      | woken        | a waiter has been granted the right to re-race   |
//! | 2..=31 | waiter count | threads currently parked on the semaphore        |
//!
//! ## Properties
//! - ✅ All-zero state is a ready-to-use unlocked mutex (`new()` is `const`)
//! - ✅ Uncontended lock/unlock is a single CAS / fetch-sub, no parking
//! - ✅ Unlock wakes at most one waiter, never more
//! - ⚠️ **Not fair** — a freshly arriving spinner can take the lock ahead of
//!   threads that have been parked longer; throughput is favored over FIFO
//! - ⚠️ **Not re-entrant** — locking twice from one thread deadlocks
//!
//! ## Ownership
//! The mutex records no owner identity. Any thread holding a reference may
//! call [`unlock`](RawMutex::unlock), including a thread other than the one
//! that locked it. The flip side is that misuse cannot be detected per-thread:
//! unlocking a mutex that is not locked is a hard `panic!`, as is the
//! internal woken-flag invariant breaking. Neither condition is recoverable,
//! so no `Result` is returned anywhere.

use core::marker::PhantomData;
use core::sync::atomic::{AtomicI32, Ordering};

use crate::sema::{FutexSemaphore, Semaphore};
use crate::spin::{AdaptiveSpin, SpinPolicy};

/// Bit 0 of the state word: the lock is held.
const LOCKED: i32 = 1 << 0;
/// Bit 1: one waiter has been promised the next chance to race.
const WOKEN: i32 = 1 << 1;
/// Waiter count occupies the bits above `LOCKED` and `WOKEN`.
const WAITER_SHIFT: u32 = 2;
/// Weight of a single parked waiter in the state word.
const WAITER: i32 = 1 << WAITER_SHIFT;

/// A word-sized mutex with a spin-then-park slow path.
///
/// `S` supplies the parking primitive and `P` the spin heuristic; see
/// [`Semaphore`] and [`SpinPolicy`]. The defaults (a futex-backed semaphore
/// and adaptive multicore spinning) are the right choice on a hosted target.
///
/// This type guards no data by itself. For a typed lock use the
/// [`Mutex`](crate::Mutex) alias, which wraps it via `lock_api`.
///
/// # Example
/// ```
/// use spinpark::RawMutex;
///
/// static LOCK: RawMutex = RawMutex::new();
///
/// LOCK.lock();
/// // critical section
/// LOCK.unlock();
/// ```
pub struct RawMutex<S = FutexSemaphore, P = AdaptiveSpin> {
    state: AtomicI32,
    sema: S,
    _spin: PhantomData<P>,
}

impl<S: Semaphore, P: SpinPolicy> RawMutex<S, P> {
    /// Creates an unlocked mutex.
    #[inline(always)]
    pub const fn new() -> Self {
        RawMutex {
            state: AtomicI32::new(0),
            sema: S::INIT,
            _spin: PhantomData,
        }
    }

    /// Acquires the lock, blocking the calling thread until it is held.
    ///
    /// The fast path is one CAS of the whole state word from zero. On
    /// contention the thread spins while [`SpinPolicy::can_spin`] allows,
    /// then registers itself as a waiter and parks on the semaphore. A wake
    /// only grants the right to re-race: a spinning thread may still take
    /// the lock first.
    ///
    /// Calling `lock` twice from the same thread without an intervening
    /// [`unlock`](Self::unlock) deadlocks.
    #[inline]
    pub fn lock(&self) {
        // Fast path: grab the fully free mutex in one CAS.
        if self
            .state
            .compare_exchange(0, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.note_acquire();
            return;
        }
        self.lock_slow();
    }

    #[cold]
    fn lock_slow(&self) {
        // `awoke` is set once this thread has consumed a wake, either by
        // winning the woken-bit CAS while spinning or by returning from the
        // semaphore. A thread that is "the woken one" must keep the WOKEN
        // bit alive in its candidate word until it commits, then clear it.
        let mut awoke = false;
        let mut iter = 0u32;
        loop {
            let old = self.state.load(Ordering::Relaxed);
            let mut new = old | LOCKED;
            if old & LOCKED != 0 {
                if P::can_spin(iter) {
                    // Claim the woken bit so a concurrent unlock skips the
                    // semaphore: this thread is about to retry anyway.
                    if !awoke
                        && old & WOKEN == 0
                        && old >> WAITER_SHIFT != 0
                        && self
                            .state
                            .compare_exchange(
                                old,
                                old | WOKEN,
                                Ordering::Relaxed,
                                Ordering::Relaxed,
                            )
                            .is_ok()
                    {
                        awoke = true;
                    }
                    P::spin();
                    iter += 1;
                    continue;
                }
                // Spinning is no longer profitable; commit to parking.
                new = old + WAITER;
            }
            if awoke {
                if new & WOKEN == 0 {
                    panic!("inconsistent mutex state");
                }
                // This thread stops being the woken one once it commits.
                new &= !WOKEN;
            }
            if self
                .state
                .compare_exchange(old, new, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                if old & LOCKED == 0 {
                    // The lock was free at the instant of the winning CAS.
                    break;
                }
                self.sema.acquire();
                awoke = true;
                iter = 0;
            }
        }
        self.note_acquire();
    }

    /// Attempts to acquire the lock without blocking or spinning.
    ///
    /// Makes one CAS attempt and reports whether the lock is now held by
    /// the caller. Never registers as a waiter.
    #[inline]
    pub fn try_lock(&self) -> bool {
        let old = self.state.load(Ordering::Relaxed);
        if old & LOCKED != 0 {
            return false;
        }
        let ok = self
            .state
            .compare_exchange(old, old | LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok();
        if ok {
            self.note_acquire();
        }
        ok
    }

    /// Releases the lock, waking at most one parked waiter.
    ///
    /// # Panics
    /// Panics if the mutex is not locked. That is a programming error on the
    /// caller's side and leaves the mutex unusable, so it is not reported as
    /// a recoverable result.
    #[inline]
    pub fn unlock(&self) {
        // Announce before mutating: after the sub another thread may already
        // be inside the critical section.
        self.note_release();

        let prev = self.state.fetch_sub(LOCKED, Ordering::Release);
        if prev & LOCKED == 0 {
            panic!("unlock of unlocked mutex");
        }

        let mut old = prev - LOCKED;
        loop {
            // No one to wake, or someone else already took over: either a
            // thread re-locked it, or a waiter was already promised a wake.
            if old >> WAITER_SHIFT == 0 || old & (LOCKED | WOKEN) != 0 {
                return;
            }
            // Claim the right to wake exactly one waiter. The hand-off
            // ordering is carried by the release sub above together with the
            // acquiring CAS in `lock_slow`, so relaxed is enough here.
            let new = (old - WAITER) | WOKEN;
            match self
                .state
                .compare_exchange(old, new, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => {
                    self.sema.release();
                    return;
                }
                Err(current) => old = current,
            }
        }
    }

    /// Reports whether some thread currently holds the lock.
    #[inline(always)]
    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) & LOCKED != 0
    }

    #[inline(always)]
    fn note_acquire(&self) {
        #[cfg(feature = "trace")]
        log::trace!(target: "spinpark", "acquire {:p}", self);
    }

    #[inline(always)]
    fn note_release(&self) {
        #[cfg(feature = "trace")]
        log::trace!(target: "spinpark", "release {:p}", self);
    }
}

// Lets the lock plug into everything generic over `lock_api`, and backs the
// crate-level `Mutex<T>` / `MutexGuard` aliases. `GuardSend` is correct
// because the lock tracks no owner: a guard may be dropped on another thread.
unsafe impl<S: Semaphore, P: SpinPolicy> lock_api::RawMutex for RawMutex<S, P> {
    const INIT: Self = RawMutex::new();

    type GuardMarker = lock_api::GuardSend;

    #[inline]
    fn lock(&self) {
        RawMutex::lock(self)
    }

    #[inline]
    fn try_lock(&self) -> bool {
        RawMutex::try_lock(self)
    }

    #[inline]
    unsafe fn unlock(&self) {
        RawMutex::unlock(self)
    }

    #[inline]
    fn is_locked(&self) -> bool {
        RawMutex::is_locked(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sema::FutexSemaphore;
    use crate::spin::NoSpin;
    use core::sync::atomic::AtomicU32;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    /// Semaphore that aborts the test if the lock ever parks or wakes.
    struct NeverPark;

    impl Semaphore for NeverPark {
        const INIT: Self = NeverPark;

        fn acquire(&self) {
            panic!("uncontended lock reached the semaphore");
        }

        fn release(&self) {
            panic!("uncontended unlock reached the semaphore");
        }
    }

    /// Counts how many times threads actually parked.
    struct CountingSema {
        inner: FutexSemaphore,
        parks: AtomicU32,
    }

    impl Semaphore for CountingSema {
        const INIT: Self = CountingSema {
            inner: FutexSemaphore::new(),
            parks: AtomicU32::new(0),
        };

        fn acquire(&self) {
            self.parks.fetch_add(1, Ordering::Relaxed);
            self.inner.acquire();
        }

        fn release(&self) {
            self.inner.release();
        }
    }

    #[test]
    fn lock_sets_and_clears_state() {
        let m: RawMutex = RawMutex::new();
        assert!(!m.is_locked());

        m.lock();
        assert!(m.is_locked());
        assert_eq!(m.state.load(Ordering::Relaxed), LOCKED);

        m.unlock();
        assert!(!m.is_locked());
        assert_eq!(m.state.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn try_lock_respects_holder() {
        let m: RawMutex = RawMutex::new();

        assert!(m.try_lock());
        assert!(!m.try_lock(), "second try_lock must fail while held");
        m.unlock();
        assert!(m.try_lock(), "try_lock must succeed once released");
        m.unlock();
    }

    #[test]
    #[should_panic(expected = "unlock of unlocked mutex")]
    fn unlock_of_fresh_mutex_panics() {
        let m: RawMutex = RawMutex::new();
        m.unlock();
    }

    #[test]
    #[should_panic(expected = "unlock of unlocked mutex")]
    fn double_unlock_panics() {
        let m: RawMutex = RawMutex::new();
        m.lock();
        m.unlock();
        m.unlock();
    }

    #[test]
    fn uncontended_lock_never_parks() {
        let m: RawMutex<NeverPark, NoSpin> = RawMutex::new();
        for _ in 0..10_000 {
            m.lock();
            m.unlock();
        }
    }

    #[test]
    fn mutual_exclusion_under_contention() {
        let m: Arc<RawMutex> = Arc::new(RawMutex::new());
        let counter = Arc::new(AtomicU32::new(0));
        let mut handles = vec![];

        for _ in 0..8 {
            let m = m.clone();
            let counter = counter.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..10_000 {
                    m.lock();
                    // Split load+store instead of fetch_add, so lost updates
                    // show up if mutual exclusion ever breaks.
                    let v = counter.load(Ordering::Relaxed);
                    counter.store(v + 1, Ordering::Relaxed);
                    m.unlock();
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(counter.load(Ordering::Relaxed), 8 * 10_000);
    }

    /// Two threads, forced past the spin path: the second must park, the
    /// unlock must hand it a wake, and it must end up owning the lock with
    /// a clean state word.
    #[test]
    fn parked_waiter_is_woken_and_acquires() {
        let m: Arc<RawMutex<CountingSema, NoSpin>> = Arc::new(RawMutex::new());
        m.lock();

        let waiter = {
            let m = m.clone();
            thread::spawn(move || {
                m.lock();
                assert!(m.is_locked());
                m.unlock();
            })
        };

        // Wait until the second thread has registered itself and parked.
        while m.state.load(Ordering::Relaxed) != LOCKED + WAITER {
            thread::sleep(Duration::from_millis(1));
        }

        m.unlock();
        waiter.join().unwrap();

        assert_eq!(m.state.load(Ordering::Relaxed), 0);
        assert_eq!(m.sema.parks.load(Ordering::Relaxed), 1);
    }

    /// Every parked thread is eventually woken; none is lost even when the
    /// wakes interleave with fresh contention.
    #[test]
    fn no_lost_wakeups() {
        let m: Arc<RawMutex<CountingSema, NoSpin>> = Arc::new(RawMutex::new());
        let acquired = Arc::new(AtomicU32::new(0));
        let mut handles = vec![];

        m.lock();
        for _ in 0..4 {
            let m = m.clone();
            let acquired = acquired.clone();
            handles.push(thread::spawn(move || {
                m.lock();
                acquired.fetch_add(1, Ordering::Relaxed);
                m.unlock();
            }));
        }

        // Let all four reach the parking lot, then start the hand-off chain.
        while m.state.load(Ordering::Relaxed) >> WAITER_SHIFT != 4 {
            thread::sleep(Duration::from_millis(1));
        }
        m.unlock();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(acquired.load(Ordering::Relaxed), 4);
        assert_eq!(m.state.load(Ordering::Relaxed), 0);
    }

    /// Locking twice from one thread deadlocks. That is the documented
    /// behavior, not a bug: there is no owner identity to detect re-entry.
    #[test]
    fn reentrant_lock_deadlocks() {
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let m: RawMutex = RawMutex::new();
            m.lock();
            m.lock(); // parks forever
            tx.send(()).unwrap();
        });

        assert!(
            rx.recv_timeout(Duration::from_millis(200)).is_err(),
            "re-entrant lock unexpectedly made progress"
        );
        // The deadlocked thread is leaked; nothing can unpark it.
    }
}
