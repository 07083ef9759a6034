//! # Prometheus Resource Pool
//!
//! A bounded pool of N interchangeable resources shared by W concurrent
//! workers, with pluggable acquisition strategies and immutable state
//! snapshots for observers.
//!
//! ## Core Problem Solved
//!
//! Exercising mutual exclusion under real contention needs more than a
//! semaphore: workers must start together, hold resources for varying
//! times, stop promptly on demand, and expose what they are doing without
//! slowing down the thing being observed.
//!
//! ## Key Features
//!
//! - **Two Strategies**: unfair counting semaphore plus spin lock, or a
//!   FIFO-fair semaphore with direct hand-off to the longest waiter
//! - **Bounded Cancellation**: every blocking wait observes shutdown within
//!   one poll interval; releases never block
//! - **Worker Pool**: one OS thread per worker behind a start gate, joined
//!   before a run reports its final state
//! - **Immutable Snapshots**: dirty-flag cached per-component snapshots,
//!   merged into numbered model snapshots and delivered to one observer
//! - **Runtime Adapters**: crossbeam channel and tokio watch observers
//!
//! ## WorkerPool
//!
//! ```no_run
//! use prometheus_resource_pool::config::{SimulationConfig, StrategyKind};
//! use prometheus_resource_pool::core::WorkerPool;
//! use prometheus_resource_pool::runtime::ChannelObserver;
//!
//! prometheus_resource_pool::util::init_tracing();
//!
//! let pool = WorkerPool::new(
//!     SimulationConfig::new()
//!         .with_resource_count(2)
//!         .with_strategy(StrategyKind::SpinLock),
//! )?;
//! let (observer, models) = ChannelObserver::unbounded();
//! pool.aggregator().add_observer(observer, true);
//!
//! let report = pool.run_simulation(6, 10, 1, 5)?;
//! println!("{:?} after {} models", report.state, models.try_iter().count());
//! # Ok::<(), prometheus_resource_pool::core::PoolError>(())
//! ```
//!
//! ## ResourcePool
//!
//! The pool can also be driven directly:
//!
//! ```
//! use std::sync::Arc;
//! use prometheus_resource_pool::builders::build_pool;
//! use prometheus_resource_pool::config::SimulationConfig;
//! use prometheus_resource_pool::sync::CancelFlag;
//!
//! let cfg = SimulationConfig::new().with_resource_count(3);
//! let pool = build_pool(&cfg, Arc::new(CancelFlag::new()))?;
//! let held = pool.acquire(0)?;
//! pool.release(Some(&held));
//! assert_eq!(pool.available_permits(), 3);
//! # Ok::<(), prometheus_resource_pool::core::PoolError>(())
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Resource pool, acquisition strategies, worker pool and error reporting.
pub mod core;
/// Configuration models for simulation runs.
pub mod config;
/// Builders to construct pools and strategies from configuration.
pub mod builders;
/// Runtime adapters for snapshot delivery.
pub mod runtime;
/// Component state machines and snapshot publication.
pub mod state;
/// Hand-rolled synchronization primitives.
pub mod sync;
/// Shared utilities.
pub mod util;
