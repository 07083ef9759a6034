//! Tests for error types

use prometheus_resource_pool::core::{AppResult, PoolError};

#[test]
fn test_cancelled_error() {
    let err = PoolError::Cancelled;
    assert_eq!(format!("{}", err), "operation cancelled");
    assert!(err.is_cancelled());
    assert!(!err.is_fatal());
}

#[test]
fn test_contract_violation_error() {
    let err = PoolError::ContractViolation("slot 9 of 2".to_string());
    assert_eq!(format!("{}", err), "contract violation: slot 9 of 2");
    assert!(err.is_fatal());
}

#[test]
fn test_forced_interruption_error() {
    let err = PoolError::ForcedInterruption;
    assert_eq!(format!("{}", err), "forced interruption");
    assert!(!err.is_fatal());
}

#[test]
fn test_invalid_config_and_already_running() {
    assert_eq!(
        PoolError::InvalidConfig("resource_count must be greater than 0".into()).to_string(),
        "invalid configuration: resource_count must be greater than 0"
    );
    assert_eq!(PoolError::AlreadyRunning.to_string(), "simulation already running");
}

#[test]
fn test_pool_error_converts_into_app_result() {
    fn fails() -> AppResult<()> {
        Err(PoolError::Internal("worker 3 panicked".into()))?;
        Ok(())
    }
    let err = fails().unwrap_err();
    assert_eq!(err.to_string(), "internal error: worker 3 panicked");
    assert!(err.downcast_ref::<PoolError>().is_some());
}
