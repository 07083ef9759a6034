//! Cancellable busy-wait mutual exclusion.
//!
//! `SpinLock` never parks the calling thread: `lock` loops on a single
//! compare-and-swap and polls the caller's cancellation predicate on every
//! iteration. Critical sections guarded by it must stay short.
//!
//! ```
//! use prometheus_resource_pool::sync::SpinLock;
//!
//! let lock = SpinLock::new();
//! assert!(lock.try_lock());
//! assert!(!lock.try_lock());
//! lock.unlock();
//! assert!(lock.lock(|| false).is_ok());
//! lock.unlock();
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::PoolError;

/// Test-and-set spin lock over one atomic boolean.
#[derive(Debug, Default)]
pub struct SpinLock {
    locked: AtomicBool,
}

impl SpinLock {
    /// Create an unlocked spin lock.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    /// Try to take the lock with a single compare-and-swap.
    #[inline]
    pub fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Spin until the lock is taken or `is_cancelled` reports true.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Cancelled` as soon as the predicate returns true,
    /// without taking the lock.
    pub fn lock<F>(&self, is_cancelled: F) -> Result<(), PoolError>
    where
        F: Fn() -> bool,
    {
        loop {
            if is_cancelled() {
                return Err(PoolError::Cancelled);
            }
            if self.try_lock() {
                return Ok(());
            }
            // Read-only spin keeps the cache line shared until the holder leaves.
            while self.locked.load(Ordering::Relaxed) {
                if is_cancelled() {
                    return Err(PoolError::Cancelled);
                }
                std::hint::spin_loop();
            }
        }
    }

    /// Release the lock.
    #[inline]
    pub fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    /// Whether the lock is currently held. Diagnostic only.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}
