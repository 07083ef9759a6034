//! Resource pool, acquisition strategies, worker pool and error reporting.

pub mod error;
pub mod error_sink;
pub mod resource_pool;
pub mod strategy;
pub mod worker_pool;

pub use error::{AppResult, PoolError};
pub use error_sink::{build_error_event, ErrorEvent, ErrorSink, InMemoryErrorSink, TracingErrorSink};
pub use resource_pool::{Resource, ResourcePool};
pub use strategy::{AcquireStrategy, FairSemaphoreStrategy, SpinLockStrategy};
pub use worker_pool::{PoolStats, RunReport, StrategyFactory, WorkerPool};
