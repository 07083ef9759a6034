//! Unfair counting semaphore.
//!
//! Permit gate for the spin-lock strategy. Waiters share one condition
//! variable and `release` wakes an arbitrary one of them, so there is no
//! ordering guarantee among blocked callers.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::core::PoolError;
use crate::sync::CancelFlag;

#[derive(Debug)]
struct PermitState {
    permits: usize,
    closed: bool,
}

/// Counting semaphore on a shared `Condvar` with `notify_one` wakeups.
#[derive(Debug)]
pub struct CountingSemaphore {
    state: Mutex<PermitState>,
    available: Condvar,
    poll_interval: Duration,
}

impl CountingSemaphore {
    /// Create a semaphore holding `permits` permits.
    #[must_use]
    pub fn new(permits: usize, poll_interval: Duration) -> Self {
        Self {
            state: Mutex::new(PermitState {
                permits,
                closed: false,
            }),
            available: Condvar::new(),
            poll_interval,
        }
    }

    /// Block until a permit is available.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Cancelled` once `cancel` is set or the semaphore
    /// is closed.
    pub fn acquire(&self, cancel: &CancelFlag) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        loop {
            if state.closed || cancel.is_cancelled() {
                return Err(PoolError::Cancelled);
            }
            if state.permits > 0 {
                state.permits -= 1;
                return Ok(());
            }
            self.available.wait_for(&mut state, self.poll_interval);
        }
    }

    /// Return a permit and wake one waiter.
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.permits += 1;
        drop(state);
        self.available.notify_one();
    }

    /// Fail every current and future `acquire` with `Cancelled`.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }

    /// Permits currently available.
    pub fn available_permits(&self) -> usize {
        self.state.lock().permits
    }
}
