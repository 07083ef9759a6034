//! Builders to construct resource pools from configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{SimulationConfig, StrategyKind};
use crate::core::{
    AcquireStrategy, FairSemaphoreStrategy, PoolError, ResourcePool, SpinLockStrategy,
};
use crate::sync::CancelFlag;

/// Build the built-in strategy named by `kind` over `slots` slots.
#[must_use]
pub fn build_strategy(
    kind: StrategyKind,
    slots: usize,
    poll_interval: Duration,
) -> Box<dyn AcquireStrategy> {
    match kind {
        StrategyKind::SpinLock => Box::new(SpinLockStrategy::new(slots, poll_interval)),
        StrategyKind::FairSemaphore => Box::new(FairSemaphoreStrategy::new(slots, poll_interval)),
    }
}

/// Build a fresh pool of `cfg.resource_count` free resources using
/// `cfg.strategy`.
///
/// # Errors
///
/// `PoolError::InvalidConfig` if the configuration does not validate.
pub fn build_pool(cfg: &SimulationConfig, cancel: Arc<CancelFlag>) -> Result<ResourcePool, PoolError> {
    cfg.validate().map_err(PoolError::InvalidConfig)?;
    let strategy = build_strategy(cfg.strategy, cfg.resource_count, cfg.poll_interval());
    ResourcePool::build(cfg.resource_count, strategy, cancel)
}
