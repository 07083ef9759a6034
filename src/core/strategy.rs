//! Pluggable acquisition strategies.
//!
//! A strategy owns the permit accounting and the busy table of a pool and
//! hands out slot indices. The pool layers ownership tracking and state
//! publication on top, so a strategy only has to guarantee that no slot is
//! handed out twice while busy.
//!
//! # Strategies
//!
//! - [`SpinLockStrategy`]: an unfair [`CountingSemaphore`] admits at most N
//!   callers; a [`SpinLock`] serializes the scan of the busy table.
//! - [`FairSemaphoreStrategy`]: a FIFO [`FairSemaphore`] admits callers in
//!   arrival order; slots are claimed with compare-and-set only.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::error;

use crate::config::StrategyKind;
use crate::core::error::PoolError;
use crate::sync::{CancelFlag, CountingSemaphore, FairSemaphore, SpinLock};

/// Permit and slot allocation behind a [`ResourcePool`](crate::core::ResourcePool).
pub trait AcquireStrategy: Send + Sync + fmt::Debug {
    /// Built-in kind, if this is one of the shipped strategies.
    fn kind(&self) -> Option<StrategyKind> {
        None
    }

    /// Number of slots managed.
    fn capacity(&self) -> usize;

    /// Block until a slot is free and claim it.
    ///
    /// # Errors
    ///
    /// `PoolError::Cancelled` when `cancel` is set or the strategy was shut
    /// down; `PoolError::ContractViolation` if a permit was granted but no
    /// slot was free.
    fn acquire(&self, cancel: &CancelFlag) -> Result<usize, PoolError>;

    /// Free `slot` and return its permit. Returns false, changing nothing,
    /// if the slot was not busy.
    fn release(&self, slot: usize) -> bool;

    /// Fail current and future blocked acquires with `Cancelled`.
    fn shutdown(&self);

    /// Permits currently available.
    fn available_permits(&self) -> usize;
}

fn no_free_slot(kind: StrategyKind, capacity: usize) -> PoolError {
    error!(strategy = %kind, capacity, "permit granted with no free slot");
    PoolError::ContractViolation(format!(
        "{kind}: permit granted but all {capacity} slots are busy"
    ))
}

/// Counting semaphore plus spin-locked busy table.
#[derive(Debug)]
pub struct SpinLockStrategy {
    permits: CountingSemaphore,
    table_lock: SpinLock,
    busy: Vec<AtomicBool>,
}

impl SpinLockStrategy {
    /// Create a strategy over `slots` slots.
    #[must_use]
    pub fn new(slots: usize, poll_interval: Duration) -> Self {
        Self {
            permits: CountingSemaphore::new(slots, poll_interval),
            table_lock: SpinLock::new(),
            busy: (0..slots).map(|_| AtomicBool::new(false)).collect(),
        }
    }
}

impl AcquireStrategy for SpinLockStrategy {
    fn kind(&self) -> Option<StrategyKind> {
        Some(StrategyKind::SpinLock)
    }

    fn capacity(&self) -> usize {
        self.busy.len()
    }

    fn acquire(&self, cancel: &CancelFlag) -> Result<usize, PoolError> {
        self.permits.acquire(cancel)?;
        if let Err(err) = self.table_lock.lock(|| cancel.is_cancelled()) {
            self.permits.release();
            return Err(err);
        }
        let slot = self
            .busy
            .iter()
            .position(|flag| !flag.load(Ordering::Relaxed));
        if let Some(idx) = slot {
            self.busy[idx].store(true, Ordering::Relaxed);
        }
        self.table_lock.unlock();

        slot.ok_or_else(|| {
            self.permits.release();
            no_free_slot(StrategyKind::SpinLock, self.busy.len())
        })
    }

    fn release(&self, slot: usize) -> bool {
        let Some(flag) = self.busy.get(slot) else {
            return false;
        };
        // Never cancelled: a release must always complete.
        if self.table_lock.lock(|| false).is_err() {
            return false;
        }
        let was_busy = flag.swap(false, Ordering::Relaxed);
        self.table_lock.unlock();
        if was_busy {
            self.permits.release();
        }
        was_busy
    }

    fn shutdown(&self) {
        self.permits.close();
    }

    fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

/// FIFO semaphore plus compare-and-set slot claims.
#[derive(Debug)]
pub struct FairSemaphoreStrategy {
    semaphore: FairSemaphore,
    busy: Vec<AtomicBool>,
}

impl FairSemaphoreStrategy {
    /// Create a strategy over `slots` slots.
    #[must_use]
    pub fn new(slots: usize, poll_interval: Duration) -> Self {
        Self {
            semaphore: FairSemaphore::new(slots, poll_interval),
            busy: (0..slots).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    /// Callers currently queued on the semaphore.
    pub fn queue_length(&self) -> usize {
        self.semaphore.queue_length()
    }
}

impl AcquireStrategy for FairSemaphoreStrategy {
    fn kind(&self) -> Option<StrategyKind> {
        Some(StrategyKind::FairSemaphore)
    }

    fn capacity(&self) -> usize {
        self.busy.len()
    }

    fn acquire(&self, cancel: &CancelFlag) -> Result<usize, PoolError> {
        self.semaphore.acquire(cancel)?;
        let claimed = self.busy.iter().position(|flag| {
            flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        });
        claimed.ok_or_else(|| {
            self.semaphore.release();
            no_free_slot(StrategyKind::FairSemaphore, self.busy.len())
        })
    }

    fn release(&self, slot: usize) -> bool {
        let released = self.busy.get(slot).is_some_and(|flag| {
            flag.compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        });
        if released {
            self.semaphore.release();
        }
        released
    }

    fn shutdown(&self) {
        self.semaphore.close();
    }

    fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}
