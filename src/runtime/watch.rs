//! Tokio `watch` snapshot observer for async consumers.
//!
//! Async presentation layers usually only care about the newest model. The
//! watch channel keeps exactly that, and `changed().await` wakes the consumer
//! without blocking the publishing worker thread.

use std::sync::Arc;

use tokio::sync::watch;

use crate::state::{ModelSnapshot, SnapshotObserver};

/// Receiver half handed to async consumers.
pub type SnapshotReceiver = watch::Receiver<Option<Arc<ModelSnapshot>>>;

/// Observer that publishes the latest model into a `tokio::sync::watch`.
#[derive(Debug)]
pub struct WatchObserver {
    tx: watch::Sender<Option<Arc<ModelSnapshot>>>,
}

impl WatchObserver {
    /// Create the observer and its first receiver. The receiver starts at
    /// `None` until the first model is published.
    #[must_use]
    pub fn new() -> (Self, SnapshotReceiver) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, rx)
    }

    /// Another receiver of the same channel.
    pub fn subscribe(&self) -> SnapshotReceiver {
        self.tx.subscribe()
    }
}

impl SnapshotObserver for WatchObserver {
    fn on_snapshot(&self, snapshot: Arc<ModelSnapshot>) {
        // Keeps the value even with no receiver alive.
        self.tx.send_replace(Some(snapshot));
    }
}
