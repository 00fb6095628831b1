//! Named-lock identifiers and ownership snapshots

use serde::{Deserialize, Serialize};

use super::{NodeId, TaskId};

/// A lock identifier; a local-monotonic counter
pub type LockId = u64;

/// A point-in-time snapshot of a named lock's ownership
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LockInfo {
    /// The lock's id
    pub lock_id: LockId,
    /// The lock's table-unique name
    pub name: String,
    /// The current holder, `None` when the lock is free; holding a lock and
    /// having an owner are the same condition by construction
    pub owner: Option<(NodeId, TaskId)>,
    /// When the current holder acquired the lock, unix millis; zero when free
    pub locked_at: u64,
}

impl LockInfo {
    /// Whether the lock is currently held
    pub fn is_locked(&self) -> bool {
        self.owner.is_some()
    }
}
