//! Run-wide cancellation flag.
//!
//! One `CancelFlag` is shared by every worker and primitive of a run. Blocking
//! waits poll it on a bounded interval; sleeping workers are woken directly
//! through the flag's condition variable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::core::PoolError;

/// Cooperative cancellation signal with an interruptible sleep.
#[derive(Debug, Default)]
pub struct CancelFlag {
    requested: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

impl CancelFlag {
    /// Create a flag in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
            lock: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    /// Request cancellation and wake every sleeper.
    pub fn cancel(&self) {
        self.requested.store(true, Ordering::Release);
        let _guard = self.lock.lock();
        self.wake.notify_all();
    }

    /// Whether cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Clear the flag at the start of a new run.
    pub fn reset(&self) {
        self.requested.store(false, Ordering::Release);
    }

    /// Sleep for `duration` unless cancellation is requested first.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::ForcedInterruption` if the flag is (or becomes) set
    /// before the full duration has elapsed.
    pub fn sleep(&self, duration: Duration) -> Result<(), PoolError> {
        let deadline = Instant::now() + duration;
        let mut guard = self.lock.lock();
        while !self.is_cancelled() {
            if self.wake.wait_until(&mut guard, deadline).timed_out() {
                return if self.is_cancelled() {
                    Err(PoolError::ForcedInterruption)
                } else {
                    Ok(())
                };
            }
        }
        Err(PoolError::ForcedInterruption)
    }
}
