//! # Semaphore
//!
//! The parking collaborator consumed by [`RawMutex`](crate::RawMutex). The
//! lock itself only decides *when* a thread should sleep; *how* it sleeps,
//! and which of several sleepers a wake reaches, belongs to the semaphore
//! and ultimately to the OS scheduler. No wake order is guaranteed.
//!
//! The provided [`FutexSemaphore`] keeps a permit counter in an `AtomicU32`
//! and parks threads through the cross-platform futex wrappers of the
//! [`atomic-wait`] crate.
//!
//! [`atomic-wait`]: https://docs.rs/atomic-wait

use core::sync::atomic::{AtomicU32, Ordering};

/// A counting semaphore usable as the parking backend of a lock.
///
/// Implementations must be constructible in a `const` context so that locks
/// embedding them can live in `static`s.
pub trait Semaphore {
    /// A semaphore with zero permits.
    const INIT: Self;

    /// Blocks the calling thread until a permit is available, then takes it.
    fn acquire(&self);

    /// Adds one permit, waking one blocked [`acquire`](Semaphore::acquire)
    /// if any. With no thread blocked, the permit is kept as a credit and
    /// satisfies the next `acquire` immediately.
    fn release(&self);
}

/// Futex-backed [`Semaphore`].
///
/// `acquire` first tries to grab a stored permit with a CAS; only when the
/// counter is zero does the thread enter the kernel wait. Spurious futex
/// wakeups are absorbed by re-checking the counter in a loop.
pub struct FutexSemaphore {
    permits: AtomicU32,
}

impl FutexSemaphore {
    /// Creates a semaphore holding no permits.
    #[inline(always)]
    pub const fn new() -> Self {
        FutexSemaphore {
            permits: AtomicU32::new(0),
        }
    }
}

impl Default for FutexSemaphore {
    fn default() -> Self {
        Self::new()
    }
}

impl Semaphore for FutexSemaphore {
    const INIT: Self = FutexSemaphore::new();

    fn acquire(&self) {
        let mut permits = self.permits.load(Ordering::Relaxed);
        loop {
            if permits == 0 {
                atomic_wait::wait(&self.permits, 0);
                permits = self.permits.load(Ordering::Relaxed);
                continue;
            }
            match self.permits.compare_exchange_weak(
                permits,
                permits - 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(current) => permits = current,
            }
        }
    }

    fn release(&self) {
        self.permits.fetch_add(1, Ordering::Release);
        atomic_wait::wake_one(&self.permits);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn release_leaves_a_credit() {
        let sema = FutexSemaphore::new();
        sema.release();
        // Must return without ever blocking.
        sema.acquire();
        assert_eq!(sema.permits.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn credits_accumulate() {
        let sema = FutexSemaphore::new();
        for _ in 0..3 {
            sema.release();
        }
        for _ in 0..3 {
            sema.acquire();
        }
        assert_eq!(sema.permits.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn blocked_acquire_is_woken_by_release() {
        let sema = Arc::new(FutexSemaphore::new());
        let (tx, rx) = mpsc::channel();

        let waiter = {
            let sema = sema.clone();
            thread::spawn(move || {
                sema.acquire();
                tx.send(()).unwrap();
            })
        };

        // The waiter must not get through before a permit exists.
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        sema.release();
        rx.recv_timeout(Duration::from_secs(5))
            .expect("waiter was never woken");
        waiter.join().unwrap();
    }

    #[test]
    fn one_release_per_acquire_drains_a_pool() {
        let sema = Arc::new(FutexSemaphore::new());
        let mut handles = vec![];

        for _ in 0..4 {
            let sema = sema.clone();
            handles.push(thread::spawn(move || sema.acquire()));
        }
        for _ in 0..4 {
            sema.release();
        }

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(sema.permits.load(Ordering::Relaxed), 0);
    }
}
