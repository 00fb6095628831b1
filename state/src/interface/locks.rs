//! The interface for interacting with the named lock table
//!
//! Locks coordinate task bodies on the local node; remote nodes do not
//! negotiate through this table

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use common::types::{LockId, LockInfo, NodeId, TaskId};
use tracing::{debug, warn};
use util::get_current_time_millis;

use crate::{error::StateError, StateInner};

/// The interval between acquisition attempts while waiting on a held lock
const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The table of named locks
pub struct LockTable {
    /// The next lock id to mint
    next_id: LockId,
    /// The locks by id
    by_id: HashMap<LockId, Arc<LockEntry>>,
    /// The id for each admitted name; names are table-unique
    by_name: HashMap<String, LockId>,
}

impl LockTable {
    /// Constructor
    pub fn new() -> Self {
        Self { next_id: 1, by_id: HashMap::new(), by_name: HashMap::new() }
    }
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}

/// A single named lock
struct LockEntry {
    /// The lock's id
    lock_id: LockId,
    /// The lock's name
    name: String,
    /// The ownership state, guarded independently of the table so that a
    /// waiter polling one lock never blocks table admission
    ownership: Mutex<Ownership>,
}

/// The guarded ownership state of a lock
#[derive(Default)]
struct Ownership {
    /// The holder; holding the lock and having an owner are the same
    /// condition
    owner: Option<(NodeId, TaskId)>,
    /// When the current holder acquired the lock, unix millis
    locked_at: u64,
}

impl StateInner {
    /// Admit a name into the lock table, returning the existing lock's id
    /// when the name is already present
    ///
    /// This is the only admission path; it is idempotent per name
    pub fn create_or_get_lock(&self, name: &str) -> Result<LockId, StateError> {
        let mut table = self.locks.lock().expect("lock table poisoned");
        if let Some(&lock_id) = table.by_name.get(name) {
            return Ok(lock_id);
        }

        if table.by_id.len() >= self.capacities().max_locks {
            warn!("lock table full, refusing admission of {name}");
            return Err(StateError::Capacity {
                table: "lock",
                capacity: self.capacities().max_locks,
            });
        }

        let lock_id = table.next_id;
        table.next_id += 1;
        table.by_id.insert(
            lock_id,
            Arc::new(LockEntry {
                lock_id,
                name: name.to_string(),
                ownership: Mutex::new(Ownership::default()),
            }),
        );
        table.by_name.insert(name.to_string(), lock_id);

        debug!("created lock {lock_id} ({name})");
        Ok(lock_id)
    }

    /// Acquire a lock for a local task, waiting at most `timeout_ms`
    ///
    /// Attempts are made every 10ms; a negative timeout waits indefinitely
    /// and a zero timeout makes a single attempt. Fairness among waiters is
    /// not guaranteed.
    pub fn acquire_lock(
        &self,
        lock_id: LockId,
        task_id: TaskId,
        timeout_ms: i64,
    ) -> Result<(), StateError> {
        let entry = self.get_lock_entry(lock_id)?;
        let deadline =
            (timeout_ms >= 0).then(|| Instant::now() + Duration::from_millis(timeout_ms as u64));

        loop {
            {
                let mut ownership = entry.ownership.lock().expect("lock entry poisoned");
                if ownership.owner.is_none() {
                    ownership.owner = Some((self.local_node_id(), task_id));
                    ownership.locked_at = get_current_time_millis();
                    return Ok(());
                }
            }

            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(StateError::Timeout(timeout_ms.max(0) as u64));
            }
            thread::sleep(ACQUIRE_POLL_INTERVAL);
        }
    }

    /// Release a lock held by the local node
    ///
    /// Releasing a lock the local node does not hold is a silent no-op so
    /// that recovery paths may release unconditionally
    pub fn release_lock(&self, lock_id: LockId) -> Result<(), StateError> {
        let entry = self.get_lock_entry(lock_id)?;

        let mut ownership = entry.ownership.lock().expect("lock entry poisoned");
        match ownership.owner {
            Some((holder, _)) if holder == self.local_node_id() => {
                ownership.owner = None;
                ownership.locked_at = 0;
            }
            _ => {}
        }

        Ok(())
    }

    /// Produce an ownership snapshot for a lock
    pub fn lock_info(&self, lock_id: LockId) -> Result<LockInfo, StateError> {
        let entry = self.get_lock_entry(lock_id)?;
        let ownership = entry.ownership.lock().expect("lock entry poisoned");

        Ok(LockInfo {
            lock_id: entry.lock_id,
            name: entry.name.clone(),
            owner: ownership.owner,
            locked_at: ownership.locked_at,
        })
    }

    /// The number of admitted locks
    pub fn n_locks(&self) -> usize {
        self.locks.lock().expect("lock table poisoned").by_id.len()
    }

    /// Look up a lock, cloning its shared entry out so ownership polling
    /// never holds the table guard
    fn get_lock_entry(&self, lock_id: LockId) -> Result<Arc<LockEntry>, StateError> {
        let table = self.locks.lock().expect("lock table poisoned");
        let entry = table.by_id.get(&lock_id).ok_or(StateError::NotFound(lock_id))?;
        Ok(Arc::clone(entry))
    }
}

#[cfg(test)]
mod test {
    use std::thread;
    use std::time::{Duration, Instant};

    use crate::{error::StateError, test_helpers::*};

    /// Tests that admission is idempotent per name
    #[test]
    fn test_create_or_get_idempotent() {
        let state = mock_state();
        let first = state.create_or_get_lock("db").unwrap();
        let second = state.create_or_get_lock("db").unwrap();

        assert_eq!(first, second);
        assert_eq!(state.n_locks(), 1);

        let other = state.create_or_get_lock("cache").unwrap();
        assert_ne!(other, first);
        assert_eq!(state.n_locks(), 2);
    }

    /// Tests the acquire/release round trip and the ownership invariant
    #[test]
    fn test_acquire_release() {
        let state = mock_state();
        let lock_id = state.create_or_get_lock("db").unwrap();

        state.acquire_lock(lock_id, 7, 100).unwrap();
        let info = state.lock_info(lock_id).unwrap();
        assert!(info.is_locked());
        assert_eq!(info.owner, Some((LOCAL_ID, 7)));
        assert!(info.locked_at > 0);

        state.release_lock(lock_id).unwrap();
        let info = state.lock_info(lock_id).unwrap();
        assert!(!info.is_locked());
        assert_eq!(info.owner, None);
    }

    /// Tests that a zero timeout on a held lock times out immediately
    #[test]
    fn test_zero_timeout_immediate() {
        let state = mock_state();
        let lock_id = state.create_or_get_lock("db").unwrap();
        state.acquire_lock(lock_id, 1, 100).unwrap();

        let start = Instant::now();
        let res = state.acquire_lock(lock_id, 2, 0);
        assert!(matches!(res, Err(StateError::Timeout(_))));
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    /// Tests that a bounded wait expires against a held lock
    #[test]
    fn test_bounded_wait_expires() {
        let state = mock_state();
        let lock_id = state.create_or_get_lock("db").unwrap();
        state.acquire_lock(lock_id, 1, 100).unwrap();

        let res = state.acquire_lock(lock_id, 2, 50);
        assert!(matches!(res, Err(StateError::Timeout(_))));
    }

    /// Tests that a waiter acquires once the holder releases
    #[test]
    fn test_waiter_acquires_after_release() {
        let state = mock_state();
        let lock_id = state.create_or_get_lock("db").unwrap();
        state.acquire_lock(lock_id, 1, 100).unwrap();

        let waiter = {
            let state = state.clone();
            thread::spawn(move || state.acquire_lock(lock_id, 2, 1_000))
        };

        thread::sleep(Duration::from_millis(50));
        state.release_lock(lock_id).unwrap();

        waiter.join().unwrap().unwrap();
        assert_eq!(state.lock_info(lock_id).unwrap().owner, Some((LOCAL_ID, 2)));
    }

    /// Tests that releasing an unheld lock is a silent no-op
    #[test]
    fn test_release_unheld_noop() {
        let state = mock_state();
        let lock_id = state.create_or_get_lock("db").unwrap();

        state.release_lock(lock_id).unwrap();
        assert!(!state.lock_info(lock_id).unwrap().is_locked());
    }

    /// Tests unknown-id handling
    #[test]
    fn test_unknown_lock() {
        let state = mock_state();
        assert!(matches!(state.acquire_lock(99, 1, 0), Err(StateError::NotFound(99))));
        assert!(matches!(state.release_lock(99), Err(StateError::NotFound(99))));
    }
}
