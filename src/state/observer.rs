//! Snapshot observer extension point.
//!
//! The aggregator delivers each [`ModelSnapshot`] to at most one registered
//! observer. Closures taking `Arc<ModelSnapshot>` implement the trait
//! directly; `runtime` provides channel-backed observers for consumers on
//! other threads or async runtimes.
//!
//! ```
//! use std::sync::Arc;
//! use prometheus_resource_pool::state::{ModelSnapshot, SnapshotAggregator};
//!
//! let aggregator = SnapshotAggregator::new();
//! aggregator.add_observer(|model: Arc<ModelSnapshot>| {
//!     println!("model {} triggered by {}", model.id, model.trigger);
//! }, false);
//! ```
//!
//! Observers run while the aggregator's publish lock is held, which is what
//! keeps delivery order equal to id order. They must return promptly and
//! must not drive component transitions themselves. Read-only `WorkerPool`
//! queries such as `is_running` or `stats` are fine; `run_simulation` and
//! `shutdown_now` are not.

use std::fmt;
use std::sync::Arc;

use crate::state::snapshot::ModelSnapshot;

/// Receiver of published model snapshots.
pub trait SnapshotObserver: Send + Sync {
    /// Called once per published model, in strictly increasing id order.
    fn on_snapshot(&self, snapshot: Arc<ModelSnapshot>);
}

impl<F> SnapshotObserver for F
where
    F: Fn(Arc<ModelSnapshot>) + Send + Sync,
{
    fn on_snapshot(&self, snapshot: Arc<ModelSnapshot>) {
        self(snapshot);
    }
}

/// Handle identifying one observer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}
