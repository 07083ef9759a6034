//! Per-component state machine with dirty-flag snapshots.
//!
//! Workers, resources and the run itself are all represented by the same
//! [`Component`] record; [`ComponentKind`] says which one it is. Applying a
//! [`Transition`] records the previous state, stores the new one, marks the
//! component dirty and notifies the owning aggregator. The next call to
//! [`Component::snapshot`] rebuilds the cached snapshot; until then the same
//! `Arc<Snapshot>` is handed out.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::state::aggregator::SnapshotAggregator;
use crate::state::snapshot::{build_snapshot, Snapshot};
use crate::util::clock::now_ms;

/// Worker identifier, unique within one run.
pub type WorkerId = usize;

/// Resource identifier, unique within one pool.
pub type ResourceId = usize;

/// The fixed set of component kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    /// A worker thread.
    Worker,
    /// A pooled resource.
    Resource,
    /// The simulation run as a whole.
    Run,
}

/// Identity of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentId {
    /// The run-level component.
    Run,
    /// A worker by id.
    Worker(WorkerId),
    /// A resource by id.
    Resource(ResourceId),
}

impl ComponentId {
    /// Kind of the identified component.
    #[must_use]
    pub const fn kind(self) -> ComponentKind {
        match self {
            Self::Run => ComponentKind::Run,
            Self::Worker(_) => ComponentKind::Worker,
            Self::Resource(_) => ComponentKind::Resource,
        }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run => write!(f, "run"),
            Self::Worker(id) => write!(f, "worker-{id}"),
            Self::Resource(id) => write!(f, "resource-{id}"),
        }
    }
}

/// Lifecycle of a worker or resource.
///
/// Workers cycle `Idle → Acquiring → Gazing → Releasing → Idle`; resources
/// alternate between `Idle` (free) and `Gazing` (held).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    /// Not holding or waiting for a resource.
    Idle,
    /// Blocked in `acquire`.
    Acquiring,
    /// Holding (or being held as) a resource.
    Gazing,
    /// Returning a resource.
    Releasing,
    /// Finished, normally or through cancellation.
    Done,
    /// Failed fatally.
    Error,
    /// Retired; excluded from future model snapshots.
    Removed,
}

impl ComponentState {
    /// Whether no further transitions (other than `Removed`) are accepted.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Removed)
    }
}

/// Aggregate state of one simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// No run has started yet.
    Idle,
    /// Workers are running.
    Running,
    /// Shutdown was requested; waiting for workers to stop.
    Cancelling,
    /// The run stopped before every worker reached its target.
    Cancelled,
    /// Every worker reached its target.
    Completed,
    /// A fatal error tore the run down.
    Error,
}

impl RunState {
    /// Whether the run has finished.
    #[must_use]
    pub const fn is_final(self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed | Self::Error)
    }
}

/// State value held by any component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Worker or resource state.
    Component(ComponentState),
    /// Run state.
    Run(RunState),
}

impl State {
    /// The component state, if this is one.
    #[must_use]
    pub const fn component(self) -> Option<ComponentState> {
        match self {
            Self::Component(state) => Some(state),
            Self::Run(_) => None,
        }
    }

    /// The run state, if this is one.
    #[must_use]
    pub const fn run(self) -> Option<RunState> {
        match self {
            Self::Run(state) => Some(state),
            Self::Component(_) => None,
        }
    }

    const fn is_terminal(self) -> bool {
        match self {
            Self::Component(state) => state.is_terminal(),
            Self::Run(_) => false,
        }
    }

    const fn is_removed(self) -> bool {
        matches!(self, Self::Component(ComponentState::Removed))
    }
}

impl From<ComponentState> for State {
    fn from(state: ComponentState) -> Self {
        Self::Component(state)
    }
}

impl From<RunState> for State {
    fn from(state: RunState) -> Self {
        Self::Run(state)
    }
}

/// A state change plus the fields that change with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// New state.
    pub state: State,
    /// New completed count, if it changes.
    pub completed: Option<u64>,
    /// New link (`Some(None)` clears it), if it changes.
    pub link: Option<Option<usize>>,
    /// Error to record.
    pub error: Option<String>,
    /// Message to record. Replaces the previous message.
    pub message: Option<String>,
}

impl Transition {
    /// Transition to `state`, leaving every other field untouched.
    pub fn to(state: impl Into<State>) -> Self {
        Self {
            state: state.into(),
            completed: None,
            link: None,
            error: None,
            message: None,
        }
    }

    /// Set the completed count.
    #[must_use]
    pub fn completed(mut self, completed: u64) -> Self {
        self.completed = Some(completed);
        self
    }

    /// Set (or clear) the linked worker/resource id.
    #[must_use]
    pub fn link(mut self, link: Option<usize>) -> Self {
        self.link = Some(link);
        self
    }

    /// Record an error.
    #[must_use]
    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Record a message.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Mutable fields behind the component lock.
#[derive(Debug)]
pub(crate) struct ComponentInner {
    pub(crate) state: State,
    pub(crate) prev_state: Option<State>,
    pub(crate) completed: u64,
    pub(crate) link: Option<usize>,
    pub(crate) error: Option<String>,
    pub(crate) message: Option<String>,
    pub(crate) timestamp_ms: u128,
    dirty: bool,
    cached: Option<Arc<Snapshot>>,
}

/// One worker, resource, or run with its own state machine.
#[derive(Debug)]
pub struct Component {
    id: ComponentId,
    inner: Mutex<ComponentInner>,
    snapshot_ids: Arc<AtomicU64>,
    aggregator: Weak<SnapshotAggregator>,
}

impl Component {
    /// Create a standalone component with its own snapshot id counter.
    pub fn new(id: ComponentId, initial: impl Into<State>) -> Self {
        Self::attached(id, initial.into(), Arc::new(AtomicU64::new(0)), Weak::new())
    }

    pub(crate) fn attached(
        id: ComponentId,
        initial: State,
        snapshot_ids: Arc<AtomicU64>,
        aggregator: Weak<SnapshotAggregator>,
    ) -> Self {
        Self {
            id,
            inner: Mutex::new(ComponentInner {
                state: initial,
                prev_state: None,
                completed: 0,
                link: None,
                error: None,
                message: None,
                timestamp_ms: now_ms(),
                dirty: true,
                cached: None,
            }),
            snapshot_ids,
            aggregator,
        }
    }

    /// Component identity.
    #[must_use]
    pub const fn id(&self) -> ComponentId {
        self.id
    }

    /// Component kind.
    #[must_use]
    pub const fn kind(&self) -> ComponentKind {
        self.id.kind()
    }

    /// Current state.
    pub fn state(&self) -> State {
        self.inner.lock().state
    }

    /// Completed iterations (workers) or completed uses (resources).
    pub fn completed(&self) -> u64 {
        self.inner.lock().completed
    }

    /// Linked resource (workers) or owning worker (resources).
    pub fn link(&self) -> Option<usize> {
        self.inner.lock().link
    }

    /// Change state only.
    pub fn set_state(&self, state: impl Into<State>) {
        self.apply(Transition::to(state));
    }

    /// Apply a transition and notify the aggregator, if attached.
    pub fn apply(&self, transition: Transition) {
        match self.aggregator.upgrade() {
            Some(aggregator) => aggregator.on_transition(self, transition),
            None => {
                self.record(transition);
            }
        }
    }

    /// Latest snapshot, rebuilt only if the component changed since the last
    /// call.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        let mut inner = self.inner.lock();
        if let (false, Some(cached)) = (inner.dirty, inner.cached.as_ref()) {
            return Arc::clone(cached);
        }
        let id = self.snapshot_ids.fetch_add(1, Ordering::AcqRel) + 1;
        let snapshot = Arc::new(build_snapshot(id, self.id, &inner));
        inner.cached = Some(Arc::clone(&snapshot));
        inner.dirty = false;
        snapshot
    }

    /// Whether the component has been retired.
    pub fn is_removed(&self) -> bool {
        self.inner.lock().state.is_removed()
    }

    /// Store the transition under the component lock. Returns false if it
    /// was ignored because the component is already terminal.
    pub(crate) fn record(&self, transition: Transition) -> bool {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() && !transition.state.is_removed() {
            debug!(
                component = %self.id,
                from = ?inner.state,
                to = ?transition.state,
                "ignoring transition out of terminal state"
            );
            return false;
        }
        inner.prev_state = Some(inner.state);
        inner.state = transition.state;
        if let Some(completed) = transition.completed {
            inner.completed = completed;
        }
        if let Some(link) = transition.link {
            inner.link = link;
        }
        if transition.error.is_some() {
            inner.error = transition.error;
        }
        inner.message = transition.message;
        inner.timestamp_ms = now_ms();
        inner.dirty = true;
        true
    }

    /// Put a reused component back to `state` with cleared counters.
    pub(crate) fn reinitialize(&self, state: State) {
        let mut inner = self.inner.lock();
        inner.prev_state = Some(inner.state);
        inner.state = state;
        inner.completed = 0;
        inner.link = None;
        inner.error = None;
        inner.message = None;
        inner.timestamp_ms = now_ms();
        inner.dirty = true;
    }
}
