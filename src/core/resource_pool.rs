//! Bounded resource pool.
//!
//! A `ResourcePool` owns N resources with ids `0..N` and lends them to
//! callers through an [`AcquireStrategy`]. The pool tracks which worker owns
//! each resource and, when attached to a [`SnapshotAggregator`], publishes a
//! resource state transition on every acquire and release.
//!
//! # Design
//!
//! - **Explicit strategy**: the strategy is a constructor argument, either a
//!   built-in chosen by [`StrategyKind`] or any boxed implementation
//! - **Ownership by compare-and-set**: `release` only succeeds for the
//!   current holder, which makes it idempotent
//! - **Shutdown never blocks releases**: blocked acquirers fail with
//!   `Cancelled`, holders can still hand their resources back
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use prometheus_resource_pool::core::{FairSemaphoreStrategy, ResourcePool};
//! use prometheus_resource_pool::sync::CancelFlag;
//!
//! let pool = ResourcePool::build(
//!     2,
//!     Box::new(FairSemaphoreStrategy::new(2, Duration::from_millis(5))),
//!     Arc::new(CancelFlag::new()),
//! )?;
//! let resource = pool.acquire(0)?;
//! assert_eq!(pool.available_permits(), 1);
//! assert!(pool.release(Some(&resource)));
//! assert!(!pool.release(Some(&resource)));
//! # Ok::<(), prometheus_resource_pool::core::PoolError>(())
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::config::StrategyKind;
use crate::core::error::PoolError;
use crate::core::strategy::AcquireStrategy;
use crate::state::{Component, ComponentState, ResourceId, SnapshotAggregator, Transition, WorkerId};
use crate::sync::CancelFlag;

const FREE: usize = usize::MAX;

/// Handle to an acquired resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resource {
    id: ResourceId,
    holder: WorkerId,
}

impl Resource {
    /// Resource id.
    #[must_use]
    pub const fn id(&self) -> ResourceId {
        self.id
    }

    /// Worker that acquired the resource.
    #[must_use]
    pub const fn holder(&self) -> WorkerId {
        self.holder
    }
}

/// Fixed-size pool of exclusively held resources.
#[derive(Debug)]
pub struct ResourcePool {
    strategy: Box<dyn AcquireStrategy>,
    owners: Vec<AtomicUsize>,
    components: Vec<Arc<Component>>,
    cancel: Arc<CancelFlag>,
    shut_down: AtomicBool,
}

impl ResourcePool {
    /// Create a pool of `resource_count` free resources.
    ///
    /// # Errors
    ///
    /// `PoolError::InvalidConfig` if `resource_count` is zero or differs from
    /// the strategy's capacity.
    pub fn build(
        resource_count: usize,
        strategy: Box<dyn AcquireStrategy>,
        cancel: Arc<CancelFlag>,
    ) -> Result<Self, PoolError> {
        if resource_count == 0 {
            return Err(PoolError::InvalidConfig(
                "resource_count must be greater than 0".into(),
            ));
        }
        if strategy.capacity() != resource_count {
            return Err(PoolError::InvalidConfig(format!(
                "strategy manages {} slots but the pool has {resource_count} resources",
                strategy.capacity()
            )));
        }
        debug!(resource_count, strategy = ?strategy.kind(), "resource pool built");
        Ok(Self {
            strategy,
            owners: (0..resource_count).map(|_| AtomicUsize::new(FREE)).collect(),
            components: Vec::new(),
            cancel,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Register one resource component per resource with `aggregator`.
    #[must_use]
    pub fn with_aggregator(mut self, aggregator: &SnapshotAggregator) -> Self {
        self.components = aggregator.register_resources(self.owners.len());
        self
    }

    /// Block until a resource is available and take it on behalf of `caller`.
    ///
    /// # Errors
    ///
    /// - `PoolError::Cancelled` if the run is cancelled or the pool shut down
    /// - `PoolError::ContractViolation` if the strategy hands back a slot
    ///   outside `0..resource_count` or grants a permit with no free slot
    ///
    /// A contract violation is fatal for the run. The permit and slot the
    /// strategy granted are not returned, so `available_permits()` stays
    /// below `resource_count` afterwards.
    pub fn acquire(&self, caller: WorkerId) -> Result<Resource, PoolError> {
        let slot = self.strategy.acquire(&self.cancel)?;
        let Some(owner) = self.owners.get(slot) else {
            error!(
                worker_id = caller,
                resource_id = slot,
                resource_count = self.owners.len(),
                "strategy returned an out-of-range resource"
            );
            return Err(PoolError::ContractViolation(format!(
                "strategy returned resource {slot} for a pool of {}",
                self.owners.len()
            )));
        };
        if let Err(current) =
            owner.compare_exchange(FREE, caller, Ordering::AcqRel, Ordering::Acquire)
        {
            error!(worker_id = caller, resource_id = slot, owner = current, "resource handed out twice");
            return Err(PoolError::ContractViolation(format!(
                "resource {slot} granted to worker {caller} while held by worker {current}"
            )));
        }
        if let Some(component) = self.components.get(slot) {
            component.apply(Transition::to(ComponentState::Gazing).link(Some(caller)));
        }
        debug!(worker_id = caller, resource_id = slot, "resource acquired");
        Ok(Resource {
            id: slot,
            holder: caller,
        })
    }

    /// Return a resource. `None`, a stale handle or an already free resource
    /// is a no-op returning false. Never blocks on shutdown.
    pub fn release(&self, resource: Option<&Resource>) -> bool {
        let Some(resource) = resource else {
            return false;
        };
        let Some(owner) = self.owners.get(resource.id) else {
            return false;
        };
        if owner
            .compare_exchange(resource.holder, FREE, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(
                worker_id = resource.holder,
                resource_id = resource.id,
                "ignoring release of a resource not held by caller"
            );
            return false;
        }
        if let Some(component) = self.components.get(resource.id) {
            let completed = component.completed() + 1;
            component.apply(
                Transition::to(ComponentState::Idle)
                    .link(None)
                    .completed(completed),
            );
        }
        self.strategy.release(resource.id);
        debug!(worker_id = resource.holder, resource_id = resource.id, "resource released");
        true
    }

    /// Fail every current and future blocked `acquire` with `Cancelled`.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.strategy.shutdown();
        info!(busy = self.busy_count(), "resource pool shut down");
    }

    /// Permits currently available. Read under the strategy's lock.
    pub fn available_permits(&self) -> usize {
        self.strategy.available_permits()
    }

    /// Number of resources.
    pub fn resource_count(&self) -> usize {
        self.owners.len()
    }

    /// Number of resources currently held.
    pub fn busy_count(&self) -> usize {
        self.owners
            .iter()
            .filter(|owner| owner.load(Ordering::Acquire) != FREE)
            .count()
    }

    /// Worker currently holding resource `id`.
    pub fn owner_of(&self, id: ResourceId) -> Option<WorkerId> {
        self.owners
            .get(id)
            .map(|owner| owner.load(Ordering::Acquire))
            .filter(|&owner| owner != FREE)
    }

    /// Built-in strategy in use, if any.
    pub fn strategy_kind(&self) -> Option<StrategyKind> {
        self.strategy.kind()
    }

    /// Whether `shutdown` has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Cancellation flag observed by blocked acquires.
    pub fn cancel_flag(&self) -> &Arc<CancelFlag> {
        &self.cancel
    }
}
