//! Top-level error sinks.
//!
//! Fatal worker failures are reported to exactly one sink per worker pool
//! before the run is torn down. The default sink logs through `tracing`; the
//! in-memory sink keeps a bounded buffer for tests and dev tooling.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::error;

use crate::core::error::PoolError;
use crate::state::ComponentId;
use crate::util::clock::now_ms;

/// One reported failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    /// Component that failed.
    pub component: ComponentId,
    /// The failure.
    pub error: PoolError,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
}

/// Error sink abstraction.
pub trait ErrorSink: Send + Sync {
    /// Report a fatal failure of `component`.
    fn report(&self, component: ComponentId, error: &PoolError);
}

/// Sink that logs every failure at error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, component: ComponentId, error: &PoolError) {
        error!(component = %component, error = %error, "run failure reported");
    }
}

/// In-memory error sink for testing and dev.
#[derive(Debug)]
pub struct InMemoryErrorSink {
    events: Mutex<VecDeque<ErrorEvent>>,
    max_events: usize,
}

impl InMemoryErrorSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events)),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    pub fn events(&self) -> Vec<ErrorEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether nothing has been reported.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl ErrorSink for InMemoryErrorSink {
    fn report(&self, component: ComponentId, error: &PoolError) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(build_error_event(component, error.clone()));
    }
}

/// Helper to build an error event stamped with the current time.
#[must_use]
pub fn build_error_event(component: ComponentId, error: PoolError) -> ErrorEvent {
    ErrorEvent {
        component,
        error,
        created_at_ms: now_ms(),
    }
}
