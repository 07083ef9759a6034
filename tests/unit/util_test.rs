//! Tests for utilities

use prometheus_resource_pool::core::{ErrorSink, InMemoryErrorSink, PoolError};
use prometheus_resource_pool::state::ComponentId;
use prometheus_resource_pool::util::{init_tracing, now_ms};

#[test]
fn test_now_ms_is_recent() {
    // 2020-01-01 in milliseconds.
    assert!(now_ms() > 1_577_836_800_000);
}

#[test]
fn test_init_tracing_twice() {
    init_tracing();
    init_tracing();
}

#[test]
fn test_in_memory_sink_records_component() {
    let sink = InMemoryErrorSink::new(4);
    sink.report(ComponentId::Worker(2), &PoolError::Cancelled);
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].component, ComponentId::Worker(2));
    assert!(events[0].created_at_ms > 0);
}
