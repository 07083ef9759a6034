//! Immutable snapshot records.

use std::sync::Arc;

use serde::Serialize;

use crate::state::component::{
    ComponentId, ComponentInner, ComponentKind, ComponentState, RunState, State,
};

/// Point-in-time capture of one component. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// Snapshot id, strictly increasing within a run.
    pub id: u64,
    /// Captured component.
    pub component: ComponentId,
    /// Component kind.
    pub kind: ComponentKind,
    /// State at capture time.
    pub state: State,
    /// State before the last transition.
    pub prev_state: Option<State>,
    /// Time of the last transition, milliseconds since the epoch.
    pub timestamp_ms: u128,
    /// Completed iterations (workers) or completed uses (resources).
    pub completed: u64,
    /// Current resource (workers) or owning worker (resources).
    pub link: Option<usize>,
    /// Recorded error, if any.
    pub error: Option<String>,
    /// Message attached to the last transition, if any.
    pub message: Option<String>,
}

impl Snapshot {
    /// The worker/resource state, if this is not the run snapshot.
    #[must_use]
    pub const fn component_state(&self) -> Option<ComponentState> {
        self.state.component()
    }

    /// The run state, if this is the run snapshot.
    #[must_use]
    pub const fn run_state(&self) -> Option<RunState> {
        self.state.run()
    }
}

/// Build a snapshot from a component's locked fields.
pub(crate) fn build_snapshot(id: u64, component: ComponentId, inner: &ComponentInner) -> Snapshot {
    Snapshot {
        id,
        component,
        kind: component.kind(),
        state: inner.state,
        prev_state: inner.prev_state,
        timestamp_ms: inner.timestamp_ms,
        completed: inner.completed,
        link: inner.link,
        error: inner.error.clone(),
        message: inner.message.clone(),
    }
}

/// Aggregate of every live component's latest snapshot, published as one
/// unit. Unchanged components share their `Arc<Snapshot>` between models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSnapshot {
    /// Model id, strictly increasing for the aggregator's lifetime.
    pub id: u64,
    /// Run-level snapshot.
    pub run: Arc<Snapshot>,
    /// Worker snapshots ordered by worker id.
    pub workers: Vec<Arc<Snapshot>>,
    /// Resource snapshots ordered by resource id.
    pub resources: Vec<Arc<Snapshot>>,
    /// Component whose transition produced this model.
    pub trigger: ComponentId,
}

impl ModelSnapshot {
    /// Run state captured in this model.
    #[must_use]
    pub fn run_state(&self) -> Option<RunState> {
        self.run.run_state()
    }

    /// Number of workers captured in `state`.
    #[must_use]
    pub fn workers_in(&self, state: ComponentState) -> usize {
        self.workers
            .iter()
            .filter(|w| w.component_state() == Some(state))
            .count()
    }

    /// Number of resources currently held by a worker.
    #[must_use]
    pub fn busy_resources(&self) -> usize {
        self.resources.iter().filter(|r| r.link.is_some()).count()
    }

    /// Snapshot of worker `id`, if captured.
    #[must_use]
    pub fn worker(&self, id: usize) -> Option<&Arc<Snapshot>> {
        self.workers
            .iter()
            .find(|w| w.component == ComponentId::Worker(id))
    }

    /// Serialize to JSON for external consumers.
    ///
    /// # Errors
    ///
    /// Propagates `serde_json` serialization failures.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
