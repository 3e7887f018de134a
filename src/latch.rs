//! The resize latch: a shared/exclusive spin latch.
//!
//! Every map operation enters in shared mode (one CAS on the fast path);
//! resize, iteration and `clear` enter exclusively. Exclusive acquisition
//! claims the writer bit and then drains the reader count, which makes the
//! latch double as the grace period for deferred reclamation: once it is
//! held exclusively, no reader can still be looking at a displaced value.

use core::sync::atomic::{AtomicUsize, Ordering};
use crossbeam_utils::Backoff;

const WRITER: usize = 1 << (usize::BITS - 1);

pub(crate) struct Latch {
    state: AtomicUsize,
}

impl Latch {
    pub(crate) const fn new() -> Self {
        Self {
            state: AtomicUsize::new(0),
        }
    }

    /// Enter in shared mode. Contention-free in the absence of a resize;
    /// spins while the writer bit is held.
    #[inline]
    pub(crate) fn shared(&self) -> SharedGuard<'_> {
        let backoff = Backoff::new();
        loop {
            let state = self.state.load(Ordering::Relaxed);
            if state & WRITER == 0 {
                if self
                    .state
                    .compare_exchange_weak(state, state + 1, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
                {
                    return SharedGuard { latch: self };
                }
            } else {
                backoff.snooze();
            }
        }
    }

    /// Enter in exclusive mode: claim the writer bit, then wait for every
    /// shared holder to drain.
    pub(crate) fn exclusive(&self) -> ExclusiveGuard<'_> {
        let backoff = Backoff::new();
        loop {
            let state = self.state.load(Ordering::Relaxed);
            if state & WRITER == 0
                && self
                    .state
                    .compare_exchange_weak(
                        state,
                        state | WRITER,
                        Ordering::Acquire,
                        Ordering::Relaxed,
                    )
                    .is_ok()
            {
                break;
            }
            backoff.snooze();
        }
        while self.state.load(Ordering::Acquire) != WRITER {
            backoff.snooze();
        }
        ExclusiveGuard { latch: self }
    }
}

/// RAII guard for shared access. Releases on drop.
pub(crate) struct SharedGuard<'a> {
    latch: &'a Latch,
}

impl Drop for SharedGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.latch.state.fetch_sub(1, Ordering::Release);
    }
}

/// RAII guard for exclusive access. Releases on drop.
pub(crate) struct ExclusiveGuard<'a> {
    latch: &'a Latch,
}

impl Drop for ExclusiveGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.latch.state.store(0, Ordering::Release);
    }
}
