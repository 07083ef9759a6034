//! Aggregate snapshot publication.
//!
//! The aggregator owns every component of a run, the per-instance id
//! counters, and the single observer slot. Each transition is recorded and
//! turned into one [`ModelSnapshot`] under the publish lock, so models are
//! numbered and delivered in the same order.
//!
//! Lock order: publisher, then registry, then an individual component.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::state::component::{
    Component, ComponentId, ComponentState, RunState, State, Transition,
};
use crate::state::observer::{SnapshotObserver, SubscriptionId};
use crate::state::snapshot::{ModelSnapshot, Snapshot};

struct Registry {
    run: Arc<Component>,
    workers: Vec<Arc<Component>>,
    resources: Vec<Arc<Component>>,
}

impl Registry {
    fn lookup(&self, id: ComponentId) -> Option<&Arc<Component>> {
        match id {
            ComponentId::Run => Some(&self.run),
            ComponentId::Worker(idx) => self.workers.get(idx),
            ComponentId::Resource(idx) => self.resources.get(idx),
        }
    }
}

struct Publisher {
    observer: Option<(SubscriptionId, Arc<dyn SnapshotObserver>)>,
    last: Option<Arc<ModelSnapshot>>,
    /// A transition happened that no observer saw.
    pending: bool,
}

/// Merges component snapshots into published model snapshots.
pub struct SnapshotAggregator {
    me: Weak<Self>,
    snapshot_ids: Arc<AtomicU64>,
    model_ids: AtomicU64,
    subscriptions: AtomicU64,
    registry: RwLock<Registry>,
    publisher: Mutex<Publisher>,
}

impl std::fmt::Debug for SnapshotAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.read();
        f.debug_struct("SnapshotAggregator")
            .field("workers", &registry.workers.len())
            .field("resources", &registry.resources.len())
            .field("model_ids", &self.model_ids.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SnapshotAggregator {
    /// Create an aggregator holding only the run component, in `RunState::Idle`.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Self>| {
            let snapshot_ids = Arc::new(AtomicU64::new(0));
            let run = Arc::new(Component::attached(
                ComponentId::Run,
                State::Run(RunState::Idle),
                Arc::clone(&snapshot_ids),
                me.clone(),
            ));
            Self {
                me: me.clone(),
                snapshot_ids,
                model_ids: AtomicU64::new(0),
                subscriptions: AtomicU64::new(0),
                registry: RwLock::new(Registry {
                    run,
                    workers: Vec::new(),
                    resources: Vec::new(),
                }),
                publisher: Mutex::new(Publisher {
                    observer: None,
                    last: None,
                    pending: false,
                }),
            }
        })
    }

    /// Prepare for a new run: retire every worker and resource and restart
    /// component snapshot numbering. Model ids keep increasing so an existing
    /// subscription never sees them go backwards.
    pub fn reset(&self) {
        let mut publisher = self.publisher.lock();
        let mut guard = self.registry.write();
        let registry = &mut *guard;
        for component in registry.workers.drain(..).chain(registry.resources.drain(..)) {
            component.record(Transition::to(ComponentState::Removed));
        }
        self.snapshot_ids.store(0, Ordering::Release);
        registry.run.reinitialize(State::Run(RunState::Idle));
        publisher.pending = true;
        debug!("snapshot aggregator reset");
    }

    /// The run-level component.
    pub fn run_component(&self) -> Arc<Component> {
        Arc::clone(&self.registry.read().run)
    }

    /// Replace the worker set with `count` fresh `Idle` workers, ids `0..count`.
    pub fn register_workers(&self, count: usize) -> Vec<Arc<Component>> {
        let mut registry = self.registry.write();
        for old in registry.workers.drain(..) {
            old.record(Transition::to(ComponentState::Removed));
        }
        registry.workers = (0..count)
            .map(|id| self.attach(ComponentId::Worker(id)))
            .collect();
        registry.workers.clone()
    }

    /// Replace the resource set with `count` fresh `Idle` resources, ids `0..count`.
    pub fn register_resources(&self, count: usize) -> Vec<Arc<Component>> {
        let mut registry = self.registry.write();
        for old in registry.resources.drain(..) {
            old.record(Transition::to(ComponentState::Removed));
        }
        registry.resources = (0..count)
            .map(|id| self.attach(ComponentId::Resource(id)))
            .collect();
        registry.resources.clone()
    }

    /// Registered workers.
    pub fn workers(&self) -> Vec<Arc<Component>> {
        self.registry.read().workers.clone()
    }

    /// Registered resources.
    pub fn resources(&self) -> Vec<Arc<Component>> {
        self.registry.read().resources.clone()
    }

    /// Latest snapshot of one component.
    pub fn snapshot_of(&self, id: ComponentId) -> Option<Arc<Snapshot>> {
        self.registry.read().lookup(id).map(|c| c.snapshot())
    }

    /// Register `observer`, replacing any existing one.
    ///
    /// With `replay_last`, the observer immediately receives the most recent
    /// model; a fresh one is built if nothing was published yet or
    /// transitions happened while no observer was registered.
    pub fn add_observer<O>(&self, observer: O, replay_last: bool) -> SubscriptionId
    where
        O: SnapshotObserver + 'static,
    {
        let mut publisher = self.publisher.lock();
        let id = SubscriptionId(self.subscriptions.fetch_add(1, Ordering::Relaxed) + 1);
        if let Some((previous, _)) = publisher.observer.as_ref() {
            warn!(previous = %previous, replacement = %id, "replacing snapshot observer");
        }
        let observer: Arc<dyn SnapshotObserver> = Arc::new(observer);
        publisher.observer = Some((id, Arc::clone(&observer)));

        if replay_last {
            let model = match publisher.last.clone() {
                Some(last) if !publisher.pending => last,
                _ => {
                    let fresh = Arc::new(self.next_model(ComponentId::Run));
                    publisher.last = Some(Arc::clone(&fresh));
                    publisher.pending = false;
                    fresh
                }
            };
            observer.on_snapshot(model);
        }
        debug!(subscription = %id, replay_last, "snapshot observer registered");
        id
    }

    /// Unregister the observer if `id` is still the active subscription.
    pub fn remove_observer(&self, id: SubscriptionId) -> bool {
        let mut publisher = self.publisher.lock();
        match publisher.observer.as_ref() {
            Some((active, _)) if *active == id => {
                publisher.observer = None;
                true
            }
            _ => false,
        }
    }

    /// Whether an observer is registered.
    pub fn has_observer(&self) -> bool {
        self.publisher.lock().observer.is_some()
    }

    /// Most recently published model.
    pub fn latest(&self) -> Option<Arc<ModelSnapshot>> {
        self.publisher.lock().last.clone()
    }

    /// Assemble the current model without publishing it. Carries the id of
    /// the most recently numbered model.
    pub fn current(&self) -> ModelSnapshot {
        let _publisher = self.publisher.lock();
        self.assemble(self.model_ids.load(Ordering::Acquire), ComponentId::Run)
    }

    /// Record a transition of `component` and publish the resulting model.
    pub(crate) fn on_transition(&self, component: &Component, transition: Transition) {
        let mut publisher = self.publisher.lock();
        if !component.record(transition) {
            return;
        }
        let Some(observer) = publisher.observer.as_ref().map(|(_, o)| Arc::clone(o)) else {
            publisher.pending = true;
            return;
        };
        let model = Arc::new(self.next_model(component.id()));
        publisher.last = Some(Arc::clone(&model));
        publisher.pending = false;
        observer.on_snapshot(model);
    }

    fn attach(&self, id: ComponentId) -> Arc<Component> {
        Arc::new(Component::attached(
            id,
            State::Component(ComponentState::Idle),
            Arc::clone(&self.snapshot_ids),
            self.me.clone(),
        ))
    }

    fn next_model(&self, trigger: ComponentId) -> ModelSnapshot {
        let id = self.model_ids.fetch_add(1, Ordering::AcqRel) + 1;
        self.assemble(id, trigger)
    }

    fn assemble(&self, id: u64, trigger: ComponentId) -> ModelSnapshot {
        let registry = self.registry.read();
        let live = |components: &[Arc<Component>]| -> Vec<Arc<Snapshot>> {
            components
                .iter()
                .filter(|c| !c.is_removed())
                .map(|c| c.snapshot())
                .collect()
        };
        ModelSnapshot {
            id,
            run: registry.run.snapshot(),
            workers: live(&registry.workers),
            resources: live(&registry.resources),
            trigger,
        }
    }
}
