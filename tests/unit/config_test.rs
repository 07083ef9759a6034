//! Tests for configuration loading

use prometheus_resource_pool::config::{SimulationConfig, StrategyKind};

#[test]
fn test_full_json_config() {
    let json = r#"{
        "resource_count": 3,
        "worker_count": 12,
        "iterations": 50,
        "min_use_ms": 2,
        "max_use_ms": 8,
        "strategy": "fair_semaphore",
        "poll_interval_ms": 10,
        "thread_stack_size": 1048576
    }"#;
    let cfg = SimulationConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.resource_count, 3);
    assert_eq!(cfg.worker_count, 12);
    assert_eq!(cfg.iterations, 50);
    assert_eq!(cfg.strategy, StrategyKind::FairSemaphore);
    assert_eq!(cfg.thread_stack_size, 1_048_576);
}

#[test]
fn test_unknown_strategy_rejected() {
    let err = SimulationConfig::from_json_str(r#"{"strategy": "lottery"}"#).unwrap_err();
    assert!(err.starts_with("parse error"));
}

#[test]
fn test_inverted_use_range_rejected() {
    let err =
        SimulationConfig::from_json_str(r#"{"min_use_ms": 9, "max_use_ms": 3}"#).unwrap_err();
    assert!(err.contains("min_use_ms"));
}

#[test]
fn test_from_env_reads_prefixed_variables() {
    // Only this test touches RESOURCE_POOL_* variables.
    std::env::set_var("RESOURCE_POOL_RESOURCE_COUNT", "5");
    std::env::set_var("RESOURCE_POOL_STRATEGY", "spin_lock");
    std::env::set_var("RESOURCE_POOL_MAX_USE_MS", "20");
    let cfg = SimulationConfig::from_env().unwrap();
    assert_eq!(cfg.resource_count, 5);
    assert_eq!(cfg.strategy, StrategyKind::SpinLock);
    assert_eq!(cfg.max_use_ms, 20);

    std::env::set_var("RESOURCE_POOL_RESOURCE_COUNT", "many");
    let err = SimulationConfig::from_env().unwrap_err();
    assert!(err.to_string().contains("RESOURCE_POOL_RESOURCE_COUNT"));

    for key in ["RESOURCE_COUNT", "STRATEGY", "MAX_USE_MS"] {
        std::env::remove_var(format!("RESOURCE_POOL_{key}"));
    }
}
