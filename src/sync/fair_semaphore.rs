//! FIFO-fair counting semaphore built on the specific-notification pattern.
//!
//! Every blocked caller parks on its own private wait node instead of a
//! shared condition variable. `release` hands the permit directly to the node
//! at the head of the queue and notifies only that node, so a later arrival
//! can never be granted a permit ahead of an earlier one.
//!
//! # Design
//!
//! - **Fast path**: queue empty and permits available, decrement and return
//! - **Slow path**: enqueue a node, wait on it, re-check its state in a loop
//! - **Cancellation**: waits are bounded by `poll_interval`; a cancelled
//!   waiter dequeues its own node, and one granted concurrently with the
//!   cancellation passes the permit on
//!
//! Lock order is always semaphore state, then node.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::core::PoolError;
use crate::sync::CancelFlag;

/// Outcome recorded on a wait node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Waiting,
    Granted,
    Cancelled,
}

/// Private park handle for one blocked caller.
#[derive(Debug)]
struct WaitNode {
    state: Mutex<NodeState>,
    signal: Condvar,
}

impl WaitNode {
    fn new() -> Self {
        Self {
            state: Mutex::new(NodeState::Waiting),
            signal: Condvar::new(),
        }
    }

    /// Move a waiting node to `next` and wake its owner. Returns false if the
    /// node already left the waiting state.
    fn settle(&self, next: NodeState) -> bool {
        let mut state = self.state.lock();
        if *state != NodeState::Waiting {
            return false;
        }
        *state = next;
        self.signal.notify_one();
        true
    }
}

#[derive(Debug)]
struct SemaphoreState {
    permits: isize,
    closed: bool,
    waiters: VecDeque<Arc<WaitNode>>,
}

/// Counting semaphore that grants permits in strict arrival order.
#[derive(Debug)]
pub struct FairSemaphore {
    state: Mutex<SemaphoreState>,
    poll_interval: Duration,
}

impl FairSemaphore {
    /// Create a semaphore with `permits` initial permits.
    ///
    /// `poll_interval` bounds how long a blocked waiter goes without checking
    /// the caller's cancellation flag.
    #[must_use]
    pub fn new(permits: usize, poll_interval: Duration) -> Self {
        Self {
            state: Mutex::new(SemaphoreState {
                permits: isize::try_from(permits).unwrap_or(isize::MAX),
                closed: false,
                waiters: VecDeque::new(),
            }),
            poll_interval,
        }
    }

    /// Acquire one permit, blocking in FIFO order behind earlier callers.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Cancelled` if `cancel` is set or the semaphore is
    /// closed before a permit is granted.
    pub fn acquire(&self, cancel: &CancelFlag) -> Result<(), PoolError> {
        let node = {
            let mut state = self.state.lock();
            if state.closed || cancel.is_cancelled() {
                return Err(PoolError::Cancelled);
            }
            if state.waiters.is_empty() && state.permits > 0 {
                state.permits -= 1;
                return Ok(());
            }
            let node = Arc::new(WaitNode::new());
            state.waiters.push_back(Arc::clone(&node));
            trace!(queue_length = state.waiters.len(), "fair semaphore: parked");
            node
        };

        loop {
            {
                let mut node_state = node.state.lock();
                // Spurious wakeups and poll timeouts both land back here.
                loop {
                    match *node_state {
                        NodeState::Granted => return Ok(()),
                        NodeState::Cancelled => return Err(PoolError::Cancelled),
                        NodeState::Waiting => {}
                    }
                    if cancel.is_cancelled() {
                        break;
                    }
                    if node
                        .signal
                        .wait_for(&mut node_state, self.poll_interval)
                        .timed_out()
                    {
                        break;
                    }
                }
            }
            if cancel.is_cancelled() {
                return self.abandon(&node);
            }
        }
    }

    /// Try to take a permit without blocking. Respects queued waiters.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        if !state.closed && state.waiters.is_empty() && state.permits > 0 {
            state.permits -= 1;
            true
        } else {
            false
        }
    }

    /// Return one permit, handing it to the oldest waiter if there is one.
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.permits += 1;
        while let Some(node) = state.waiters.pop_front() {
            if node.settle(NodeState::Granted) {
                state.permits -= 1;
                trace!(queue_length = state.waiters.len(), "fair semaphore: handed off");
                break;
            }
        }
    }

    /// Close the semaphore: every queued waiter and every later caller gets
    /// `Cancelled`. Outstanding permits are unaffected.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        for node in state.waiters.drain(..) {
            node.settle(NodeState::Cancelled);
        }
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Permits currently available, read under the state lock.
    pub fn available_permits(&self) -> usize {
        usize::try_from(self.state.lock().permits).unwrap_or(0)
    }

    /// Number of parked waiters.
    pub fn queue_length(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Leave the queue after cancellation was observed.
    fn abandon(&self, node: &Arc<WaitNode>) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        if let Some(pos) = state.waiters.iter().position(|n| Arc::ptr_eq(n, node)) {
            state.waiters.remove(pos);
            node.settle(NodeState::Cancelled);
            return Err(PoolError::Cancelled);
        }
        drop(state);

        // Off the queue already: either granted or cancelled by `close`.
        let granted = *node.state.lock() == NodeState::Granted;
        if granted {
            self.release();
        }
        Err(PoolError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    const POLL: Duration = Duration::from_millis(5);

    fn wait_for_queue(sem: &FairSemaphore, len: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while sem.queue_length() < len {
            assert!(Instant::now() < deadline, "waiter never parked");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_fast_path() {
        let sem = FairSemaphore::new(2, POLL);
        let cancel = CancelFlag::new();
        assert!(sem.acquire(&cancel).is_ok());
        assert!(sem.acquire(&cancel).is_ok());
        assert_eq!(sem.available_permits(), 0);
        assert!(!sem.try_acquire());
        sem.release();
        sem.release();
        assert_eq!(sem.available_permits(), 2);
    }

    #[test]
    fn test_release_hands_off_to_waiter() {
        let sem = Arc::new(FairSemaphore::new(1, POLL));
        let cancel = Arc::new(CancelFlag::new());
        sem.acquire(&cancel).unwrap();

        let waiter = {
            let sem = Arc::clone(&sem);
            let cancel = Arc::clone(&cancel);
            thread::spawn(move || sem.acquire(&cancel))
        };
        wait_for_queue(&sem, 1);

        sem.release();
        assert!(waiter.join().unwrap().is_ok());
        // Permit went straight to the waiter.
        assert_eq!(sem.available_permits(), 0);
        assert_eq!(sem.queue_length(), 0);
    }

    #[test]
    fn test_fifo_grant_order() {
        const WAITERS: usize = 6;
        let sem = Arc::new(FairSemaphore::new(1, POLL));
        let cancel = Arc::new(CancelFlag::new());
        let granted = Arc::new(Mutex::new(Vec::new()));
        sem.acquire(&cancel).unwrap();

        let mut handles = vec![];
        for id in 0..WAITERS {
            let waiter_sem = Arc::clone(&sem);
            let cancel = Arc::clone(&cancel);
            let granted = Arc::clone(&granted);
            handles.push(thread::spawn(move || {
                waiter_sem.acquire(&cancel).unwrap();
                granted.lock().push(id);
                waiter_sem.release();
            }));
            // Arrival order is fixed before the next thread starts.
            wait_for_queue(&sem, id + 1);
        }

        sem.release();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*granted.lock(), (0..WAITERS).collect::<Vec<_>>());
        assert_eq!(sem.available_permits(), 1);
    }

    #[test]
    fn test_no_barging_past_queue() {
        let sem = Arc::new(FairSemaphore::new(1, POLL));
        let cancel = Arc::new(CancelFlag::new());
        sem.acquire(&cancel).unwrap();

        let waiter = {
            let sem = Arc::clone(&sem);
            let cancel = Arc::clone(&cancel);
            thread::spawn(move || sem.acquire(&cancel))
        };
        wait_for_queue(&sem, 1);

        // A permit freed while someone is queued belongs to the queue head.
        sem.release();
        assert!(!sem.try_acquire());
        assert!(waiter.join().unwrap().is_ok());
    }

    #[test]
    fn test_cancel_unblocks_waiter_without_leak() {
        let sem = Arc::new(FairSemaphore::new(1, POLL));
        let cancel = Arc::new(CancelFlag::new());
        sem.acquire(&cancel).unwrap();

        let waiter = {
            let sem = Arc::clone(&sem);
            let cancel = Arc::clone(&cancel);
            thread::spawn(move || sem.acquire(&cancel))
        };
        wait_for_queue(&sem, 1);

        cancel.cancel();
        assert_eq!(waiter.join().unwrap(), Err(PoolError::Cancelled));
        assert_eq!(sem.queue_length(), 0);

        sem.release();
        assert_eq!(sem.available_permits(), 1);
    }

    #[test]
    fn test_close_cancels_all_waiters() {
        let sem = Arc::new(FairSemaphore::new(0, Duration::from_secs(60)));
        let cancel = Arc::new(CancelFlag::new());

        let mut handles = vec![];
        for n in 0..4 {
            let waiter_sem = Arc::clone(&sem);
            let cancel = Arc::clone(&cancel);
            handles.push(thread::spawn(move || waiter_sem.acquire(&cancel)));
            wait_for_queue(&sem, n + 1);
        }

        let start = Instant::now();
        sem.close();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), Err(PoolError::Cancelled));
        }
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(sem.is_closed());
        assert_eq!(sem.acquire(&cancel), Err(PoolError::Cancelled));
    }
}
