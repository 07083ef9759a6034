//! Runtime adapters that carry published snapshots to other threads or to
//! async tasks.

pub mod channel;
#[cfg(feature = "tokio-runtime")]
pub mod watch;

pub use channel::ChannelObserver;
#[cfg(feature = "tokio-runtime")]
pub use watch::{SnapshotReceiver, WatchObserver};
