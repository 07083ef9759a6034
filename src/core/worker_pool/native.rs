//! Native implementation of `WorkerPool` using one OS thread per worker.
//!
//! # Design Principles
//!
//! - **One run at a time**: a control mutex guards the run lifecycle; a
//!   second `run_simulation` fails fast with `AlreadyRunning`
//! - **Fresh state per run**: pool, workers and counters are rebuilt, the
//!   previous run's workers are marked `Removed`
//! - **Bounded waits**: blocking points poll the cancel flag so
//!   `shutdown_now` completes within a few poll intervals of the slowest
//!   worker's current step
//! - **No lock held while publishing**: run-state transitions are applied
//!   after the control mutex is released, so observers may query the pool

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::builders::build_pool;
use crate::config::SimulationConfig;
use crate::core::error::PoolError;
use crate::core::error_sink::{ErrorSink, TracingErrorSink};
use crate::core::resource_pool::ResourcePool;
use crate::core::strategy::AcquireStrategy;
use crate::state::{
    Component, ComponentId, ComponentState, RunState, SnapshotAggregator, Transition,
};
use crate::sync::{CancelFlag, StartGate};

use super::worker::{spawn_worker, RunShared};
use super::{PoolCounters, PoolStats, RunReport};

/// Caller-supplied strategy constructor, used instead of the configured
/// [`StrategyKind`](crate::config::StrategyKind).
pub type StrategyFactory =
    Arc<dyn Fn(&SimulationConfig) -> Box<dyn AcquireStrategy> + Send + Sync>;

#[derive(Default)]
struct RunControl {
    active: bool,
    run_id: Option<Uuid>,
    worker_count: usize,
    /// Pool of the current or most recent run.
    pool: Option<Arc<ResourcePool>>,
    /// `shutdown_now` arrived while no run was active; the next run starts
    /// cancelled.
    shutdown_requested: bool,
}

/// Runs simulations of W workers contending for N resources.
///
/// # Design
///
/// - **Threads**: workers are named `rp-worker-{id}` and joined before
///   `run_simulation` returns
/// - **Errors**: cancellation is absorbed per worker; any other failure goes
///   to the error sink and tears the whole run down
/// - **Shutdown**: `shutdown_now` cancels, shuts the pool down, and waits for
///   the running simulation to finish joining
pub struct WorkerPool {
    config: SimulationConfig,
    aggregator: Arc<SnapshotAggregator>,
    error_sink: Arc<dyn ErrorSink>,
    strategy_factory: Option<StrategyFactory>,
    cancel: Arc<CancelFlag>,
    control: Mutex<RunControl>,
    idle: Condvar,
    /// Orders run-state transitions between `run_simulation` and
    /// `shutdown_now`. Never held together with `control`.
    run_state: Mutex<()>,
    counters: Arc<PoolCounters>,
    live_threads: Arc<AtomicUsize>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("live_threads", &self.live_threads.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Create a worker pool with its own aggregator and a tracing error sink.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` if the configuration is invalid.
    pub fn new(config: SimulationConfig) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;
        info!(
            resource_count = config.resource_count,
            worker_count = config.worker_count,
            strategy = %config.strategy,
            "WorkerPool initialized"
        );
        Ok(Self {
            config,
            aggregator: SnapshotAggregator::new(),
            error_sink: Arc::new(TracingErrorSink),
            strategy_factory: None,
            cancel: Arc::new(CancelFlag::new()),
            control: Mutex::new(RunControl::default()),
            idle: Condvar::new(),
            run_state: Mutex::new(()),
            counters: Arc::new(PoolCounters::default()),
            live_threads: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Report fatal failures to `sink` instead of the log.
    #[must_use]
    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = sink;
        self
    }

    /// Publish state through `aggregator` instead of a private one.
    #[must_use]
    pub fn with_aggregator(mut self, aggregator: Arc<SnapshotAggregator>) -> Self {
        self.aggregator = aggregator;
        self
    }

    /// Build each run's strategy with `factory`.
    #[must_use]
    pub fn with_strategy_factory(mut self, factory: StrategyFactory) -> Self {
        self.strategy_factory = Some(factory);
        self
    }

    /// Base configuration used by [`run`](Self::run).
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Aggregator publishing this pool's state.
    pub const fn aggregator(&self) -> &Arc<SnapshotAggregator> {
        &self.aggregator
    }

    /// Create `count` idle workers with ids `0..count`, retiring the previous
    /// set.
    pub fn make_workers(&self, count: usize) -> Vec<Arc<Component>> {
        self.aggregator.register_workers(count)
    }

    /// Run with the iteration and timing values from the configuration.
    ///
    /// # Errors
    ///
    /// See [`run_simulation`](Self::run_simulation).
    pub fn run(&self) -> Result<RunReport, PoolError> {
        self.run_simulation(
            self.config.worker_count,
            self.config.iterations,
            self.config.min_use_ms,
            self.config.max_use_ms,
        )
    }

    /// Run `worker_count` workers, each for `iterations` cycles holding a
    /// resource for a random `min_use_ms..=max_use_ms` per cycle. Blocks
    /// until every worker thread has been joined.
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidConfig` if the parameters do not validate
    /// - `PoolError::AlreadyRunning` if a run is in progress
    /// - `PoolError::InvalidConfig` if a custom strategy's capacity does not
    ///   match the resource count
    ///
    /// Failures during the run do not error; they end the run in
    /// `RunState::Error`.
    pub fn run_simulation(
        &self,
        worker_count: usize,
        iterations: u64,
        min_use_ms: u64,
        max_use_ms: u64,
    ) -> Result<RunReport, PoolError> {
        let cfg = self
            .config
            .clone()
            .with_worker_count(worker_count)
            .with_iterations(iterations)
            .with_use_ms(min_use_ms, max_use_ms);
        cfg.validate().map_err(PoolError::InvalidConfig)?;

        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let run = self.aggregator.run_component();
        {
            let mut control = self.control.lock();
            if control.active {
                warn!(run_id = ?control.run_id, "simulation already running");
                return Err(PoolError::AlreadyRunning);
            }
            if std::mem::take(&mut control.shutdown_requested) {
                warn!(run_id = %run_id, "shutdown requested before start, run begins cancelled");
                self.cancel.cancel();
            } else {
                self.cancel.reset();
            }
            control.active = true;
            control.run_id = Some(run_id);
            control.worker_count = worker_count;
            control.pool = None;
        }

        self.counters.reset();
        self.aggregator.reset();
        let pool = match self.build_pool(&cfg) {
            Ok(pool) => Arc::new(pool.with_aggregator(&self.aggregator)),
            Err(err) => {
                self.finish_control();
                return Err(err);
            }
        };
        let workers = self.make_workers(worker_count);
        self.control.lock().pool = Some(Arc::clone(&pool));
        // A shutdown that raced the pool being stored has only set the flag.
        if self.cancel.is_cancelled() {
            pool.shutdown();
        }

        {
            let _order = self.run_state.lock();
            run.apply(Transition::to(RunState::Running).message(format!("run {run_id}")));
            if self.cancel.is_cancelled() {
                run.set_state(RunState::Cancelling);
            }
        }

        let shared = Arc::new(RunShared::new(
            pool,
            Arc::clone(&self.cancel),
            StartGate::new(worker_count, cfg.poll_interval()),
            Arc::clone(&self.counters),
            Arc::clone(&self.error_sink),
            iterations,
            min_use_ms,
            max_use_ms,
        ));

        info!(
            run_id = %run_id,
            worker_count,
            resource_count = cfg.resource_count,
            strategy = %cfg.strategy,
            iterations,
            "simulation run started"
        );

        let handles = self.spawn_all(&workers, &shared, &cfg);
        for (worker_id, handle) in handles {
            if handle.join().is_err() {
                let err = PoolError::Internal(format!("worker {worker_id} panicked"));
                error!(run_id = %run_id, worker_id, "worker thread panicked");
                workers[worker_id]
                    .apply(Transition::to(ComponentState::Error).error(err.to_string()));
                shared.fail(ComponentId::Worker(worker_id), &err);
            }
        }

        let worker_iterations: Vec<u64> = workers.iter().map(|w| w.completed()).collect();
        let state = if shared.has_failed() {
            RunState::Error
        } else if worker_iterations.iter().all(|&done| done >= iterations) {
            RunState::Completed
        } else {
            RunState::Cancelled
        };
        let total: u64 = worker_iterations.iter().sum();

        {
            let _order = self.run_state.lock();
            run.apply(
                Transition::to(state)
                    .completed(total)
                    .message(format!("run {run_id} finished")),
            );
        }
        self.finish_control();

        let report = RunReport {
            run_id,
            state,
            worker_iterations,
            available_permits: shared.pool.available_permits(),
            stats: self.counters.snapshot(worker_count),
            elapsed: started.elapsed(),
        };
        info!(
            run_id = %run_id,
            state = ?state,
            completed_iterations = total,
            gazing_peak = report.stats.gazing_peak,
            elapsed_ms = report.elapsed.as_millis(),
            "simulation run finished"
        );
        Ok(report)
    }

    /// Stop the current run and wait until all of its workers have been
    /// joined.
    ///
    /// If no run is active the request is kept, and the next
    /// [`run_simulation`](Self::run_simulation) starts already cancelled.
    /// This covers a shutdown issued while a run is still being started on
    /// another thread.
    pub fn shutdown_now(&self) {
        {
            let mut control = self.control.lock();
            if !control.active {
                debug!("shutdown requested with no run in progress, deferring to next run");
                control.shutdown_requested = true;
                return;
            }
            warn!(run_id = ?control.run_id, "shutting down simulation run");
            self.cancel.cancel();
            if let Some(pool) = control.pool.as_ref() {
                pool.shutdown();
            }
        }

        {
            let _order = self.run_state.lock();
            let run = self.aggregator.run_component();
            if run.state().run() == Some(RunState::Running) {
                run.set_state(RunState::Cancelling);
            }
        }

        let mut control = self.control.lock();
        while control.active {
            self.idle.wait(&mut control);
        }
        drop(control);
        debug!(live_threads = self.live_workers(), "shutdown complete");
    }

    /// Whether a shutdown is waiting for the next run to start.
    pub fn shutdown_pending(&self) -> bool {
        self.control.lock().shutdown_requested
    }

    /// Permits available in the current or most recent pool; the configured
    /// resource count before the first run.
    pub fn available_permits(&self) -> usize {
        self.control
            .lock()
            .pool
            .as_ref()
            .map_or(self.config.resource_count, |pool| pool.available_permits())
    }

    /// Counters of the current or most recent run.
    pub fn stats(&self) -> PoolStats {
        let worker_count = self.control.lock().worker_count;
        self.counters.snapshot(worker_count)
    }

    /// Worker threads currently alive.
    pub fn live_workers(&self) -> usize {
        self.live_threads.load(Ordering::Acquire)
    }

    /// Whether a run is in progress.
    pub fn is_running(&self) -> bool {
        self.control.lock().active
    }

    /// Id of the run in progress or the most recent run.
    pub fn run_id(&self) -> Option<Uuid> {
        self.control.lock().run_id
    }

    fn finish_control(&self) {
        let mut control = self.control.lock();
        control.active = false;
        self.idle.notify_all();
    }

    fn build_pool(&self, cfg: &SimulationConfig) -> Result<ResourcePool, PoolError> {
        match &self.strategy_factory {
            Some(factory) => {
                ResourcePool::build(cfg.resource_count, factory(cfg), Arc::clone(&self.cancel))
            }
            None => build_pool(cfg, Arc::clone(&self.cancel)),
        }
    }

    fn spawn_all(
        &self,
        workers: &[Arc<Component>],
        shared: &Arc<RunShared>,
        cfg: &SimulationConfig,
    ) -> Vec<(usize, JoinHandle<()>)> {
        let mut handles = Vec::with_capacity(workers.len());
        for (worker_id, worker) in workers.iter().enumerate() {
            match spawn_worker(
                Arc::clone(worker),
                worker_id,
                Arc::clone(shared),
                Arc::clone(&self.live_threads),
                cfg.thread_stack_size,
            ) {
                Ok(handle) => handles.push((worker_id, handle)),
                Err(e) => {
                    let err = PoolError::Internal(format!("failed to spawn worker thread: {e}"));
                    error!(worker_id, error = %e, "failed to spawn worker thread");
                    for unstarted in &workers[worker_id..] {
                        unstarted.apply(
                            Transition::to(ComponentState::Error).error(err.to_string()),
                        );
                    }
                    shared.fail(ComponentId::Worker(worker_id), &err);
                    break;
                }
            }
        }
        handles
    }
}
