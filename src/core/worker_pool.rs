//! Worker pool that drives a resource pool under contention.
//!
//! A `WorkerPool` runs simulations: every run builds a fresh
//! [`ResourcePool`](crate::core::ResourcePool), spawns one OS thread per
//! worker and lets each worker loop through acquire, use and release until it
//! reaches its iteration target or the run is cancelled.
//!
//! # Key Features
//!
//! - **Contention by construction**: a start gate releases all workers at
//!   once so their first acquires collide
//! - **Bounded shutdown**: `shutdown_now` wakes blocked acquirers and
//!   sleeping workers and returns after every thread has been joined
//! - **Observable**: every worker and resource transition is published
//!   through the pool's [`SnapshotAggregator`](crate::state::SnapshotAggregator)
//!
//! # Example
//!
//! ```no_run
//! use prometheus_resource_pool::config::{SimulationConfig, StrategyKind};
//! use prometheus_resource_pool::core::WorkerPool;
//! use prometheus_resource_pool::state::RunState;
//!
//! let pool = WorkerPool::new(
//!     SimulationConfig::new()
//!         .with_resource_count(2)
//!         .with_strategy(StrategyKind::FairSemaphore),
//! )?;
//! let report = pool.run_simulation(6, 10, 1, 5)?;
//! assert_eq!(report.state, RunState::Completed);
//! # Ok::<(), prometheus_resource_pool::core::PoolError>(())
//! ```

mod native;
mod worker;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::state::RunState;

/// Statistics about the most recent run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Workers in the run.
    pub worker_count: usize,

    /// Successful acquires.
    pub acquisitions: u64,

    /// Completed acquire/use/release cycles across all workers.
    pub completed_iterations: u64,

    /// Workers that stopped because the run was cancelled.
    pub cancellations: u64,

    /// Workers whose use of a resource was cut short.
    pub interruptions: u64,

    /// Fatal failures reported to the error sink.
    pub failures: u64,

    /// Workers currently holding a resource.
    pub gazing_now: usize,

    /// Highest number of workers holding a resource at the same time.
    pub gazing_peak: usize,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub acquisitions: AtomicU64,
    pub completed_iterations: AtomicU64,
    pub cancellations: AtomicU64,
    pub interruptions: AtomicU64,
    pub failures: AtomicU64,
    pub gazing_now: AtomicUsize,
    pub gazing_peak: AtomicUsize,
}

impl PoolCounters {
    /// Record a worker starting to use a resource.
    pub fn enter_gazing(&self) {
        let now = self.gazing_now.fetch_add(1, Ordering::AcqRel) + 1;
        self.gazing_peak.fetch_max(now, Ordering::AcqRel);
    }

    /// Record a worker done using a resource.
    pub fn leave_gazing(&self) {
        self.gazing_now.fetch_sub(1, Ordering::AcqRel);
    }

    /// Zero every counter before a run.
    pub fn reset(&self) {
        for counter in [
            &self.acquisitions,
            &self.completed_iterations,
            &self.cancellations,
            &self.interruptions,
            &self.failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.gazing_now.store(0, Ordering::Relaxed);
        self.gazing_peak.store(0, Ordering::Relaxed);
    }

    /// Get a snapshot of current statistics.
    pub fn snapshot(&self, worker_count: usize) -> PoolStats {
        PoolStats {
            worker_count,
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            completed_iterations: self.completed_iterations.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
            interruptions: self.interruptions.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            gazing_now: self.gazing_now.load(Ordering::Relaxed),
            gazing_peak: self.gazing_peak.load(Ordering::Relaxed),
        }
    }
}

/// Outcome of one simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Unique id of the run.
    pub run_id: Uuid,
    /// Final run state: `Completed`, `Cancelled` or `Error`.
    pub state: RunState,
    /// Completed iterations per worker, indexed by worker id.
    pub worker_iterations: Vec<u64>,
    /// Permits available after every worker was joined.
    pub available_permits: usize,
    /// Counters at the end of the run.
    pub stats: PoolStats,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

pub use native::{StrategyFactory, WorkerPool};
