//! # SpinPolicy
//!
//! The spin advisor consumed by [`RawMutex`](crate::RawMutex). Before a
//! contended thread commits to parking, the lock asks the policy whether one
//! more round of busy-waiting is still worth it, and if so performs a single
//! low-latency spin step that burns CPU without entering the scheduler.
//!
//! Two policies ship with the crate:
//!
//! - [`AdaptiveSpin`] spins a few short bursts, and only on multicore hosts
//!   where the current holder can actually make progress in parallel.
//! - [`NoSpin`] parks immediately. Right for single-core targets, or when
//!   latency matters less than not burning cycles.

use core::hint::spin_loop;
use core::sync::atomic::{AtomicU32, Ordering};

/// Maximum consecutive spins before a thread gives up and parks.
const MAX_SPIN_ITERS: u32 = 4;

/// Length of one spin burst, in pause instructions.
const SPIN_BURST: u32 = 30;

/// Decides whether contended threads busy-wait before parking.
///
/// `can_spin` receives the number of spin rounds the calling thread has
/// already completed since it last parked, so policies can cap or shape the
/// busy-wait. Both methods are stateless by design; any per-attempt state
/// (the iteration count) is owned by the lock's slow path.
pub trait SpinPolicy {
    /// Is one more spin round worth it after `iter` completed rounds?
    fn can_spin(iter: u32) -> bool;

    /// Performs one spin round. Must not block or yield to the scheduler.
    fn spin();
}

/// Spin policy tuned for hosted multicore targets.
///
/// Allows up to four rounds of thirty pause instructions each, and none at
/// all on a single-core host where spinning only delays the holder. The
/// core count is probed once and cached.
pub struct AdaptiveSpin;

impl SpinPolicy for AdaptiveSpin {
    #[inline]
    fn can_spin(iter: u32) -> bool {
        iter < MAX_SPIN_ITERS && multicore()
    }

    #[inline]
    fn spin() {
        for _ in 0..SPIN_BURST {
            spin_loop();
        }
    }
}

/// Spin policy that never spins: every contended attempt parks.
pub struct NoSpin;

impl SpinPolicy for NoSpin {
    #[inline(always)]
    fn can_spin(_iter: u32) -> bool {
        false
    }

    #[inline(always)]
    fn spin() {}
}

/// True when more than one hardware thread is available.
///
/// Cached after the first probe; zero means "not probed yet", which can
/// never be a real parallelism value.
fn multicore() -> bool {
    static NCPU: AtomicU32 = AtomicU32::new(0);

    let mut ncpu = NCPU.load(Ordering::Relaxed);
    if ncpu == 0 {
        ncpu = std::thread::available_parallelism().map_or(1, |n| n.get()) as u32;
        NCPU.store(ncpu, Ordering::Relaxed);
    }
    ncpu > 1
}
