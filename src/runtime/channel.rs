//! Channel-backed snapshot observer.
//!
//! Forwards every published model to a `crossbeam-channel` receiver so a
//! presentation or logging thread can consume snapshots without running
//! inside the aggregator's publish lock.

use std::sync::Arc;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use tracing::debug;

use crate::state::{ModelSnapshot, SnapshotObserver};

/// Observer that sends each model into a channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: Sender<Arc<ModelSnapshot>>,
}

impl ChannelObserver {
    /// Observer over an unbounded channel. Never drops a model.
    #[must_use]
    pub fn unbounded() -> (Self, Receiver<Arc<ModelSnapshot>>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }

    /// Observer over a channel of `capacity`. Models published while the
    /// channel is full are dropped so the publisher never blocks.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<Arc<ModelSnapshot>>) {
        let (tx, rx) = bounded(capacity);
        (Self { tx }, rx)
    }
}

impl SnapshotObserver for ChannelObserver {
    fn on_snapshot(&self, snapshot: Arc<ModelSnapshot>) {
        match self.tx.try_send(snapshot) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                debug!(model_id = dropped.id, "snapshot channel full, dropping model");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
