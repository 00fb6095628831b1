//! Defines the node-global state: the peer registry maintained by the
//! membership layer, the scheduler's task table, the versioned shared-memory
//! registry, and the named lock table
//!
//! Each table is protected by its own guard; no interface method holds one
//! table's guard while acquiring another's, and the per-block reader/writer
//! lock in the memory registry is only taken after the table guard is
//! released
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

pub mod error;
pub mod interface;

use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, RwLock,
};

use common::types::{NodeId, PeerRecord};
use constants::{
    DEFAULT_MAX_LOCKS, DEFAULT_MAX_MEMORY_BLOCKS, DEFAULT_MAX_NODES, DEFAULT_MAX_TASKS,
    DEFAULT_REPLICA_LIMIT,
};

use interface::{locks::LockTable, memory::BlockTable, peers::PeerIndex, tasks::TaskTable};

/// The capacities the state's tables are constructed with
#[derive(Clone, Copy, Debug)]
pub struct TableCapacities {
    /// The peer registry capacity
    pub max_nodes: usize,
    /// The task table capacity
    pub max_tasks: usize,
    /// The memory block table capacity
    pub max_memory_blocks: usize,
    /// The lock table capacity
    pub max_locks: usize,
    /// The per-block replica set capacity
    pub replica_limit: usize,
}

impl Default for TableCapacities {
    fn default() -> Self {
        Self {
            max_nodes: DEFAULT_MAX_NODES,
            max_tasks: DEFAULT_MAX_TASKS,
            max_memory_blocks: DEFAULT_MAX_MEMORY_BLOCKS,
            max_locks: DEFAULT_MAX_LOCKS,
            replica_limit: DEFAULT_REPLICA_LIMIT,
        }
    }
}

/// The handle to the node-global state shared by all workers; cheap to clone
#[derive(Clone)]
pub struct State {
    /// The shared inner state
    inner: Arc<StateInner>,
}

impl Deref for State {
    type Target = StateInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl State {
    /// Construct the state around the local node's registry record
    pub fn new(local: PeerRecord, capacities: TableCapacities) -> Self {
        Self { inner: Arc::new(StateInner::new(local, capacities)) }
    }

    /// Construct a state with default capacities; used by tests and demos
    pub fn new_with_defaults(
        node_id: NodeId,
        host_name: String,
        address: SocketAddr,
    ) -> Self {
        let local = PeerRecord::new_local(node_id, host_name, address);
        Self::new(local, TableCapacities::default())
    }
}

/// The state proper; reached through the `State` handle
pub struct StateInner {
    /// The local node's id
    local_node_id: NodeId,
    /// The capacities the tables were constructed with
    capacities: TableCapacities,
    /// The peer registry (membership's table)
    peers: RwLock<PeerIndex>,
    /// The scheduler's task table
    tasks: RwLock<TaskTable>,
    /// The shared-memory block table
    memory: Mutex<BlockTable>,
    /// The named lock table
    locks: Mutex<LockTable>,
    /// Tasks assigned since startup
    total_assigned: AtomicU64,
    /// Tasks completed successfully since startup
    total_completed: AtomicU64,
    /// Tasks failed since startup
    total_failed: AtomicU64,
    /// Tasks migrated off failed peers since startup
    total_migrated: AtomicU64,
}

impl StateInner {
    /// Constructor
    fn new(local: PeerRecord, capacities: TableCapacities) -> Self {
        Self {
            local_node_id: local.node_id,
            capacities,
            peers: RwLock::new(PeerIndex::new(local)),
            tasks: RwLock::new(TaskTable::new()),
            memory: Mutex::new(BlockTable::new()),
            locks: Mutex::new(LockTable::new()),
            total_assigned: AtomicU64::new(0),
            total_completed: AtomicU64::new(0),
            total_failed: AtomicU64::new(0),
            total_migrated: AtomicU64::new(0),
        }
    }

    /// The local node's id
    pub fn local_node_id(&self) -> NodeId {
        self.local_node_id
    }

    /// The capacities the tables were constructed with
    pub fn capacities(&self) -> TableCapacities {
        self.capacities
    }

    // ------------------------
    // | Informational Counters |
    // ------------------------

    /// Record a task assignment
    pub fn incr_assigned(&self) {
        self.total_assigned.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful completion
    pub fn incr_completed(&self) {
        self.total_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed completion
    pub fn incr_failed(&self) {
        self.total_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a migration
    pub fn incr_migrated(&self) {
        self.total_migrated.fetch_add(1, Ordering::Relaxed);
    }

    /// Tasks assigned since startup
    pub fn total_assigned(&self) -> u64 {
        self.total_assigned.load(Ordering::Relaxed)
    }

    /// Tasks completed successfully since startup
    pub fn total_completed(&self) -> u64 {
        self.total_completed.load(Ordering::Relaxed)
    }

    /// Tasks failed since startup
    pub fn total_failed(&self) -> u64 {
        self.total_failed.load(Ordering::Relaxed)
    }

    /// Tasks migrated off failed peers since startup
    pub fn total_migrated(&self) -> u64 {
        self.total_migrated.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
pub(crate) mod test_helpers {
    //! Shared constructors for the state tests

    use common::types::{NodeId, PeerRecord, PeerStatus};
    use util::get_current_time_millis;

    use crate::{State, TableCapacities};

    /// The local node id used throughout the state tests
    pub const LOCAL_ID: NodeId = NodeId(1);

    /// Build a state whose local node is `LOCAL_ID`
    pub fn mock_state() -> State {
        mock_state_with_capacities(TableCapacities::default())
    }

    /// Build a state with explicit capacities
    pub fn mock_state_with_capacities(capacities: TableCapacities) -> State {
        let local =
            PeerRecord::new_local(LOCAL_ID, "local".to_string(), "127.0.0.1:8889".parse().unwrap());
        State::new(local, capacities)
    }

    /// Build a non-local peer record in the given status
    pub fn mock_peer(id: u64, status: PeerStatus) -> PeerRecord {
        PeerRecord {
            node_id: NodeId(id),
            host_name: format!("peer-{id}"),
            address: format!("192.168.1.{}:8889", (id % 200) + 2).parse().unwrap(),
            cpu_load: 0.2,
            memory_usage: 0.2,
            reputation: 0.5,
            tasks_completed: 0,
            tasks_failed: 0,
            status,
            last_seen: get_current_time_millis(),
            is_local: false,
        }
    }
}
