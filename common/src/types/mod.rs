//! Groups type definitions shared across the workspace

pub mod lock;
pub mod memory;
pub mod peer;
pub mod task;

use tokio::sync::watch;

pub use lock::{LockId, LockInfo};
pub use memory::{BlockId, BlockMetadata};
pub use peer::{NodeId, PeerRecord, PeerStatus};
pub use task::{TaskDescriptor, TaskId, TaskRecord, TaskStatus};

/// The channel over which the coordinator mandates that workers cancel their
/// execution; workers observe the signal at their next suspension point
pub type CancelChannel = watch::Receiver<()>;

/// Create a new cancel channel, the sender side is held by the coordinator
pub fn new_cancel_channel() -> (watch::Sender<()>, CancelChannel) {
    watch::channel(())
}
