//! Cancellable entry barrier.
//!
//! Holds every worker back until all of them have arrived, so the first
//! round of `acquire` calls hits the pool at the same moment.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::sync::CancelFlag;

#[derive(Debug)]
struct GateState {
    arrived: usize,
    expected: usize,
    open: bool,
    aborted: bool,
}

/// One-shot barrier that opens when `expected` parties have arrived.
#[derive(Debug)]
pub struct StartGate {
    state: Mutex<GateState>,
    opened: Condvar,
    poll_interval: Duration,
}

impl StartGate {
    /// Create a gate for `expected` parties.
    #[must_use]
    pub fn new(expected: usize, poll_interval: Duration) -> Self {
        Self {
            state: Mutex::new(GateState {
                arrived: 0,
                expected,
                open: expected == 0,
                aborted: false,
            }),
            opened: Condvar::new(),
            poll_interval,
        }
    }

    /// Arrive and wait for the remaining parties.
    ///
    /// Returns `true` once the gate opens, `false` if the gate was aborted or
    /// `cancel` was set first.
    pub fn arrive_and_wait(&self, cancel: &CancelFlag) -> bool {
        let mut state = self.state.lock();
        state.arrived += 1;
        if state.arrived >= state.expected {
            state.open = true;
            self.opened.notify_all();
        }
        loop {
            if state.aborted || cancel.is_cancelled() {
                return false;
            }
            if state.open {
                return true;
            }
            self.opened.wait_for(&mut state, self.poll_interval);
        }
    }

    /// Release every waiter with a `false` result.
    pub fn abort(&self) {
        self.state.lock().aborted = true;
        self.opened.notify_all();
    }

    /// Number of parties that have arrived so far.
    pub fn arrived(&self) -> usize {
        self.state.lock().arrived
    }
}
