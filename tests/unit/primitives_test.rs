//! Tests for the synchronization primitives' public behavior

use prometheus_resource_pool::core::PoolError;
use prometheus_resource_pool::sync::{CancelFlag, FairSemaphore, SpinLock, StartGate};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_spin_lock_cancellable_while_contended() {
    let lock = Arc::new(SpinLock::new());
    assert!(lock.try_lock());
    let cancel = Arc::new(CancelFlag::new());

    let waiter = {
        let lock = Arc::clone(&lock);
        let cancel = Arc::clone(&cancel);
        thread::spawn(move || lock.lock(|| cancel.is_cancelled()))
    };
    thread::sleep(Duration::from_millis(10));
    cancel.cancel();
    assert_eq!(waiter.join().unwrap(), Err(PoolError::Cancelled));
    assert!(lock.is_locked());
    lock.unlock();
}

#[test]
fn test_cancel_interrupts_sleep() {
    let cancel = Arc::new(CancelFlag::new());
    let sleeper = {
        let cancel = Arc::clone(&cancel);
        thread::spawn(move || {
            let started = Instant::now();
            (cancel.sleep(Duration::from_secs(10)), started.elapsed())
        })
    };
    thread::sleep(Duration::from_millis(10));
    cancel.cancel();
    let (outcome, slept) = sleeper.join().unwrap();
    assert_eq!(outcome, Err(PoolError::ForcedInterruption));
    assert!(slept < Duration::from_secs(1));
}

#[test]
fn test_start_gate_releases_all_together() {
    let gate = Arc::new(StartGate::new(4, Duration::from_millis(1)));
    let cancel = Arc::new(CancelFlag::new());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let gate = Arc::clone(&gate);
            let cancel = Arc::clone(&cancel);
            thread::spawn(move || gate.arrive_and_wait(&cancel))
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap());
    }
    assert_eq!(gate.arrived(), 4);
}

#[test]
fn test_fair_semaphore_close_fails_waiters() {
    let semaphore = Arc::new(FairSemaphore::new(0, Duration::from_millis(1)));
    let cancel = Arc::new(CancelFlag::new());
    let waiter = {
        let semaphore = Arc::clone(&semaphore);
        let cancel = Arc::clone(&cancel);
        thread::spawn(move || semaphore.acquire(&cancel))
    };
    while semaphore.queue_length() == 0 {
        thread::yield_now();
    }
    semaphore.close();
    assert_eq!(waiter.join().unwrap(), Err(PoolError::Cancelled));
    assert!(semaphore.is_closed());
}
