//! Component state machines and immutable snapshot publication.

pub mod aggregator;
pub mod component;
pub mod observer;
pub mod snapshot;

pub use aggregator::SnapshotAggregator;
pub use component::{
    Component, ComponentId, ComponentKind, ComponentState, ResourceId, RunState, State,
    Transition, WorkerId,
};
pub use observer::{SnapshotObserver, SubscriptionId};
pub use snapshot::{ModelSnapshot, Snapshot};
