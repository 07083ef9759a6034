//! Integration tests for WorkerPool
//!
//! These tests validate real-world functionality including:
//! - Runs to completion under both strategies
//! - Mutual exclusion observed through stats and published snapshots
//! - Start/stop stress with `shutdown_now`
//! - Contract violations reported to the error sink and ending in `Error`
//! - One run at a time per pool

use prometheus_resource_pool::config::{SimulationConfig, StrategyKind};
use prometheus_resource_pool::core::{
    AcquireStrategy, ErrorSink, InMemoryErrorSink, PoolError, RunReport, WorkerPool,
};
use prometheus_resource_pool::state::{ComponentState, ModelSnapshot, RunState};
use prometheus_resource_pool::sync::CancelFlag;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn config(resources: usize, strategy: StrategyKind) -> SimulationConfig {
    SimulationConfig::new()
        .with_resource_count(resources)
        .with_strategy(strategy)
        .with_poll_interval_ms(1)
}

fn wait_until_running(pool: &WorkerPool, runner: &thread::JoinHandle<Result<RunReport, PoolError>>) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !pool.is_running() && !runner.is_finished() {
        assert!(Instant::now() < deadline, "run never started");
        thread::yield_now();
    }
}

/// Tracks the highest number of workers seen gazing in any published model.
#[derive(Clone, Default)]
struct PeakGazers {
    peak: Arc<AtomicUsize>,
    models: Arc<AtomicUsize>,
}

impl PeakGazers {
    fn observe(&self, model: &ModelSnapshot) {
        self.models.fetch_add(1, Ordering::SeqCst);
        let gazing = model.workers_in(ComponentState::Gazing);
        self.peak.fetch_max(gazing, Ordering::SeqCst);
    }
}

/// Strategy that grants permits but names a resource that does not exist.
#[derive(Debug)]
struct OutOfRangeStrategy {
    slots: usize,
}

impl AcquireStrategy for OutOfRangeStrategy {
    fn capacity(&self) -> usize {
        self.slots
    }

    fn acquire(&self, cancel: &CancelFlag) -> Result<usize, PoolError> {
        if cancel.is_cancelled() {
            return Err(PoolError::Cancelled);
        }
        Ok(self.slots + 7)
    }

    fn release(&self, _slot: usize) -> bool {
        false
    }

    fn shutdown(&self) {}

    fn available_permits(&self) -> usize {
        self.slots
    }
}

// ============================================================================
// SCENARIO A - RUN TO COMPLETION
// ============================================================================

fn scenario_a(strategy: StrategyKind) {
    let pool = WorkerPool::new(config(2, strategy)).unwrap();
    let peak = PeakGazers::default();
    let observer = peak.clone();
    pool.aggregator()
        .add_observer(move |model: Arc<ModelSnapshot>| observer.observe(&model), false);

    let report = pool.run_simulation(6, 10, 1, 3).unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.worker_iterations, vec![10; 6]);
    assert_eq!(report.available_permits, 2);
    assert_eq!(pool.available_permits(), 2);
    assert_eq!(report.stats.acquisitions, 60);
    assert_eq!(report.stats.completed_iterations, 60);
    assert!(report.stats.gazing_peak <= 2, "peak {}", report.stats.gazing_peak);
    assert!(peak.peak.load(Ordering::SeqCst) <= 2);
    assert!(peak.models.load(Ordering::SeqCst) > 0);
    assert_eq!(pool.live_workers(), 0);

    let last = pool.aggregator().latest().unwrap();
    assert_eq!(last.run_state(), Some(RunState::Completed));
    assert_eq!(last.workers_in(ComponentState::Done), 6);
    assert!(last.workers.iter().all(|w| w.completed == 10));
    assert_eq!(last.busy_resources(), 0);
}

#[test]
fn test_scenario_a_spin_lock() {
    scenario_a(StrategyKind::SpinLock);
}

#[test]
fn test_scenario_a_fair_semaphore() {
    scenario_a(StrategyKind::FairSemaphore);
}

#[test]
fn test_run_uses_configured_values() {
    let pool = WorkerPool::new(
        config(1, StrategyKind::FairSemaphore)
            .with_worker_count(3)
            .with_iterations(2)
            .with_use_ms(0, 1),
    )
    .unwrap();
    let report = pool.run().unwrap();
    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.worker_iterations, vec![2, 2, 2]);
    assert_eq!(pool.stats().worker_count, 3);
    assert_eq!(pool.run_id(), Some(report.run_id));
}

#[test]
fn test_consecutive_runs_get_fresh_state() {
    let pool = WorkerPool::new(config(2, StrategyKind::SpinLock)).unwrap();
    let first = pool.run_simulation(4, 3, 0, 1).unwrap();
    let second = pool.run_simulation(2, 5, 0, 1).unwrap();
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(second.worker_iterations, vec![5, 5]);
    assert_eq!(second.stats.completed_iterations, 10);
    assert_eq!(pool.aggregator().workers().len(), 2);
}

// ============================================================================
// SCENARIO B - START/STOP STRESS
// ============================================================================

fn scenario_b(strategy: StrategyKind) {
    let pool = Arc::new(WorkerPool::new(config(2, strategy)).unwrap());
    for cycle in 0..20 {
        let runner = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.run_simulation(6, 100, 0, 2))
        };
        wait_until_running(&pool, &runner);
        thread::sleep(Duration::from_millis(1));
        pool.shutdown_now();

        let report = runner.join().unwrap().unwrap();
        assert!(
            matches!(report.state, RunState::Completed | RunState::Cancelled),
            "cycle {cycle} ended in {:?}",
            report.state
        );
        assert_eq!(pool.live_workers(), 0, "cycle {cycle} leaked threads");
        assert_eq!(report.available_permits, 2, "cycle {cycle} leaked permits");
        assert!(!pool.is_running());
    }
}

#[test]
fn test_scenario_b_spin_lock() {
    scenario_b(StrategyKind::SpinLock);
}

#[test]
fn test_scenario_b_fair_semaphore() {
    scenario_b(StrategyKind::FairSemaphore);
}

#[test]
fn test_shutdown_now_is_bounded() {
    let pool = Arc::new(WorkerPool::new(config(1, StrategyKind::FairSemaphore)).unwrap());
    let runner = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || pool.run_simulation(6, 1_000, 50, 100))
    };
    wait_until_running(&pool, &runner);
    thread::sleep(Duration::from_millis(20));

    let started = Instant::now();
    pool.shutdown_now();
    assert!(started.elapsed() < Duration::from_secs(1));

    let report = runner.join().unwrap().unwrap();
    assert_eq!(report.state, RunState::Cancelled);
    assert!(report.stats.cancellations + report.stats.interruptions >= 1);
    assert_eq!(report.available_permits, 1);
    assert!(pool.aggregator().latest().is_none());

    let model = pool.aggregator().current();
    assert_eq!(model.run_state(), Some(RunState::Cancelled));
    assert_eq!(model.workers_in(ComponentState::Done), 6);

    let interrupted = model
        .workers
        .iter()
        .filter(|w| w.message.as_deref() == Some("forced interruption"))
        .count();
    assert_eq!(interrupted as u64, report.stats.interruptions);

    for (worker_id, &completed) in report.worker_iterations.iter().enumerate() {
        assert_eq!(model.worker(worker_id).unwrap().completed, completed);
    }
}

#[test]
fn test_shutdown_right_after_spawn_cancels_run() {
    let pool = Arc::new(WorkerPool::new(config(2, StrategyKind::FairSemaphore)).unwrap());
    for cycle in 0..10 {
        let runner = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.run_simulation(6, 100, 1, 3))
        };
        pool.shutdown_now();

        let report = runner.join().unwrap().unwrap();
        assert_eq!(report.state, RunState::Cancelled, "cycle {cycle}");
        assert!(report.elapsed < Duration::from_millis(500), "cycle {cycle}");
        assert_eq!(report.available_permits, 2);
        assert_eq!(pool.live_workers(), 0);
        assert!(!pool.shutdown_pending());
    }
}

#[test]
fn test_shutdown_while_idle_cancels_next_run_only() {
    let pool = WorkerPool::new(config(2, StrategyKind::SpinLock)).unwrap();
    pool.shutdown_now();
    assert!(pool.shutdown_pending());

    let report = pool.run_simulation(3, 5, 0, 1).unwrap();
    assert_eq!(report.state, RunState::Cancelled);
    assert_eq!(report.worker_iterations, vec![0, 0, 0]);
    assert_eq!(report.available_permits, 2);
    assert!(!pool.shutdown_pending());
    let model = pool.aggregator().current();
    assert!(model
        .workers
        .iter()
        .all(|w| w.message.as_deref() == Some("cancelled before start")));

    let report = pool.run_simulation(3, 5, 0, 1).unwrap();
    assert_eq!(report.state, RunState::Completed);
}

#[test]
fn test_observer_may_query_pool() {
    let pool = Arc::new(WorkerPool::new(config(2, StrategyKind::FairSemaphore)).unwrap());
    let queried = Arc::new(AtomicUsize::new(0));
    let weak: Weak<WorkerPool> = Arc::downgrade(&pool);
    let counter = Arc::clone(&queried);
    pool.aggregator().add_observer(
        move |_model: Arc<ModelSnapshot>| {
            if let Some(pool) = weak.upgrade() {
                let _ = (pool.is_running(), pool.stats(), pool.available_permits());
                counter.fetch_add(1, Ordering::SeqCst);
            }
        },
        false,
    );

    let runner = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || pool.run_simulation(4, 1_000, 1, 2))
    };
    wait_until_running(&pool, &runner);
    thread::sleep(Duration::from_millis(10));
    pool.shutdown_now();

    let report = runner.join().unwrap().unwrap();
    assert_eq!(report.state, RunState::Cancelled);
    assert!(queried.load(Ordering::SeqCst) > 0);
}

#[test]
fn test_second_run_rejected_while_running() {
    let pool = Arc::new(WorkerPool::new(config(1, StrategyKind::SpinLock)).unwrap());
    let runner = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || pool.run_simulation(2, 1_000, 5, 10))
    };
    wait_until_running(&pool, &runner);

    assert_eq!(pool.run_simulation(1, 1, 0, 0).unwrap_err(), PoolError::AlreadyRunning);

    pool.shutdown_now();
    let report = runner.join().unwrap().unwrap();
    assert_eq!(report.state, RunState::Cancelled);
}

// ============================================================================
// ERROR PROPAGATION
// ============================================================================

#[test]
fn test_contract_violation_ends_run_in_error() {
    let sink = Arc::new(InMemoryErrorSink::new(64));
    let pool = WorkerPool::new(config(2, StrategyKind::FairSemaphore))
        .unwrap()
        .with_error_sink(Arc::clone(&sink) as Arc<dyn ErrorSink>)
        .with_strategy_factory(Arc::new(|cfg: &SimulationConfig| {
            Box::new(OutOfRangeStrategy {
                slots: cfg.resource_count,
            }) as Box<dyn AcquireStrategy>
        }));

    let report = pool.run_simulation(4, 10, 0, 1).unwrap();

    assert_eq!(report.state, RunState::Error);
    assert_eq!(pool.live_workers(), 0);
    assert!(!sink.is_empty());
    assert!(sink
        .events()
        .iter()
        .all(|event| matches!(event.error, PoolError::ContractViolation(_))));
    assert_eq!(report.stats.failures, sink.len() as u64);

    let model = pool.aggregator().current();
    assert!(model.workers_in(ComponentState::Error) >= 1);
    let failed = model
        .workers
        .iter()
        .find(|w| w.component_state() == Some(ComponentState::Error))
        .unwrap();
    assert!(failed.error.as_deref().unwrap().contains("contract violation"));
}

#[test]
fn test_invalid_run_parameters() {
    let pool = WorkerPool::new(config(2, StrategyKind::SpinLock)).unwrap();
    assert!(matches!(
        pool.run_simulation(3, 1, 10, 2),
        Err(PoolError::InvalidConfig(_))
    ));
    assert!(!pool.is_running());
}

#[test]
fn test_invalid_config_rejected_at_construction() {
    let err = WorkerPool::new(SimulationConfig::new().with_resource_count(0)).unwrap_err();
    assert!(matches!(err, PoolError::InvalidConfig(_)));
}
