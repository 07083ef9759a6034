//! Tests for pool builders

use prometheus_resource_pool::builders::{build_pool, build_strategy};
use prometheus_resource_pool::config::{SimulationConfig, StrategyKind};
use prometheus_resource_pool::core::PoolError;
use prometheus_resource_pool::sync::CancelFlag;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_build_pool_uses_configured_strategy() {
    for kind in [StrategyKind::SpinLock, StrategyKind::FairSemaphore] {
        let cfg = SimulationConfig::new().with_resource_count(2).with_strategy(kind);
        let pool = build_pool(&cfg, Arc::new(CancelFlag::new())).unwrap();
        assert_eq!(pool.strategy_kind(), Some(kind));
        assert_eq!(pool.resource_count(), 2);
        assert!(!pool.is_shut_down());
    }
}

#[test]
fn test_build_pool_rejects_zero_resources() {
    let cfg = SimulationConfig::new().with_resource_count(0);
    assert!(matches!(
        build_pool(&cfg, Arc::new(CancelFlag::new())),
        Err(PoolError::InvalidConfig(_))
    ));
}

#[test]
fn test_build_strategy_capacity() {
    let strategy = build_strategy(StrategyKind::SpinLock, 7, Duration::from_millis(1));
    assert_eq!(strategy.capacity(), 7);
    assert_eq!(strategy.available_permits(), 7);
}
