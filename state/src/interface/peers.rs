//! The interface for interacting with the peer registry

use std::net::{IpAddr, SocketAddr};

use common::types::{NodeId, PeerRecord, PeerStatus};
use indexmap::IndexMap;
use tracing::{debug, info, warn};
use util::get_current_time_millis;

use crate::{error::StateError, StateInner};

/// The registry of known peers, local node included
///
/// Insertion order is preserved so that scheduler iteration is stable; peers
/// are never removed, their status transitions instead
pub struct PeerIndex {
    /// The records, keyed by node id in insertion order
    records: IndexMap<NodeId, PeerRecord>,
}

impl PeerIndex {
    /// Construct an index seeded with the local node's record
    pub fn new(local: PeerRecord) -> Self {
        let mut records = IndexMap::new();
        records.insert(local.node_id, local);
        Self { records }
    }
}

/// A beacon's content after envelope validation, paired with the address the
/// datagram was observed from
#[derive(Clone, Debug)]
pub struct BeaconObservation {
    /// The announcing node's id
    pub node_id: NodeId,
    /// The announcing node's host name
    pub host_name: String,
    /// The ip the beacon was observed from; authoritative over any address
    /// text the payload carried
    pub observed_ip: IpAddr,
    /// The TCP port the announcing node accepts data connections on
    pub data_port: u16,
    /// The announcing node's cpu load
    pub cpu_load: f32,
    /// The announcing node's memory utilization
    pub memory_usage: f32,
    /// The announcing node's self-reported reputation
    pub reputation: f32,
    /// Tasks the announcing node reports completed
    pub tasks_completed: u32,
    /// Tasks the announcing node reports failed
    pub tasks_failed: u32,
    /// The announcing node's status
    pub status: PeerStatus,
}

/// What an ingest changed, used to decide whether the scheduler should be
/// told the membership changed
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PeerDelta {
    /// A previously unknown peer was inserted
    pub is_new: bool,
    /// The peer transitioned into Active from a non-live status
    pub became_active: bool,
}

impl StateInner {
    // -----------
    // | Getters |
    // -----------

    /// Get a copy of a peer's record
    pub fn get_peer(&self, node_id: NodeId) -> Option<PeerRecord> {
        self.peers.read().expect("peer index poisoned").records.get(&node_id).cloned()
    }

    /// Get a copy of the local node's record
    pub fn local_peer(&self) -> PeerRecord {
        self.get_peer(self.local_node_id()).expect("local record always present")
    }

    /// Produce a point-in-time snapshot of every record, in stable registry
    /// order
    pub fn snapshot_peers(&self) -> Vec<PeerRecord> {
        self.peers.read().expect("peer index poisoned").records.values().cloned().collect()
    }

    /// The number of registered peers, local node included
    pub fn n_peers(&self) -> usize {
        self.peers.read().expect("peer index poisoned").records.len()
    }

    // -----------
    // | Setters |
    // -----------

    /// Refresh the local record from freshly sampled host counters and
    /// return a copy for announcement
    pub fn refresh_local_record(
        &self,
        cpu_load: f32,
        memory_usage: f32,
        status: PeerStatus,
    ) -> PeerRecord {
        let mut index = self.peers.write().expect("peer index poisoned");
        let local =
            index.records.get_mut(&self.local_node_id()).expect("local record always present");

        local.cpu_load = cpu_load;
        local.memory_usage = memory_usage;
        local.status = status;
        local.last_seen = get_current_time_millis();

        local.clone()
    }

    /// Ingest a validated beacon for a single peer
    ///
    /// Fields are last-writer-wins so duplicate beacons are idempotent up to
    /// `last_seen`, which may advance. Beacons from the local node are
    /// dropped before this point. A beacon for an unknown peer inserts a new
    /// record unless the registry is full, in which case the beacon is
    /// dropped with a log line only.
    pub fn ingest_beacon(&self, obs: BeaconObservation) -> Result<PeerDelta, StateError> {
        let now = get_current_time_millis();
        let address = SocketAddr::new(obs.observed_ip, obs.data_port);
        let mut index = self.peers.write().expect("peer index poisoned");

        if let Some(record) = index.records.get_mut(&obs.node_id) {
            // Recovery chain: a beacon from a failed peer moves it through
            // Recovering before it may rejoin the eligible set
            let next_status = match record.status {
                PeerStatus::Failed => PeerStatus::Recovering,
                _ => obs.status,
            };
            let became_active =
                next_status == PeerStatus::Active && record.status != PeerStatus::Active;

            record.host_name = obs.host_name;
            record.address = address;
            record.cpu_load = obs.cpu_load;
            record.memory_usage = obs.memory_usage;
            record.reputation = obs.reputation.clamp(
                constants::REPUTATION_FLOOR,
                constants::REPUTATION_CEILING,
            );
            record.tasks_completed = obs.tasks_completed;
            record.tasks_failed = obs.tasks_failed;
            record.status = next_status;
            record.last_seen = record.last_seen.max(now);

            if became_active {
                info!("peer {} recovered, now active", obs.node_id);
            }

            return Ok(PeerDelta { is_new: false, became_active });
        }

        // New peer; respect the registry capacity
        if index.records.len() >= self.capacities().max_nodes {
            warn!(
                "registry full (capacity {}), dropping new peer {}",
                self.capacities().max_nodes,
                obs.node_id,
            );
            return Err(StateError::Capacity {
                table: "peer registry",
                capacity: self.capacities().max_nodes,
            });
        }

        info!("discovered peer {} ({}) at {}", obs.node_id, obs.host_name, address);
        index.records.insert(
            obs.node_id,
            PeerRecord {
                node_id: obs.node_id,
                host_name: obs.host_name,
                address,
                cpu_load: obs.cpu_load,
                memory_usage: obs.memory_usage,
                reputation: obs
                    .reputation
                    .clamp(constants::REPUTATION_FLOOR, constants::REPUTATION_CEILING),
                tasks_completed: obs.tasks_completed,
                tasks_failed: obs.tasks_failed,
                status: obs.status,
                last_seen: now,
                is_local: false,
            },
        );

        Ok(PeerDelta { is_new: true, became_active: obs.status == PeerStatus::Active })
    }

    /// Sweep the registry for silent peers
    ///
    /// Every non-local live peer whose last beacon is older than
    /// `timeout_ms` transitions to Failed and has its reputation halved.
    /// Returns the newly failed ids; the caller signals the scheduler after
    /// this method has released the registry guard.
    pub fn reap_silent_peers(&self, now_ms: u64, timeout_ms: u64) -> Vec<NodeId> {
        let mut failed = Vec::new();
        let mut index = self.peers.write().expect("peer index poisoned");

        for record in index.records.values_mut() {
            if record.is_local || !record.status.is_live() {
                continue;
            }

            if now_ms.saturating_sub(record.last_seen) > timeout_ms {
                record.status = PeerStatus::Failed;
                record.halve_reputation();
                warn!(
                    "peer {} silent for over {}ms, marking failed (reputation now {:.2})",
                    record.node_id, timeout_ms, record.reputation,
                );
                failed.push(record.node_id);
            }
        }

        failed
    }

    /// Apply a terminal task outcome to the executing peer's record
    ///
    /// The smoothed delta is +0.05 on success and -0.10 on failure; the
    /// update applies even when the peer has since been marked Failed
    pub fn apply_task_outcome(&self, node_id: NodeId, success: bool) {
        let mut index = self.peers.write().expect("peer index poisoned");
        let Some(record) = index.records.get_mut(&node_id) else {
            debug!("outcome for unknown peer {node_id}, skipping reputation update");
            return;
        };

        let delta = if success { 0.05 } else { -0.10 };
        record.apply_reputation_delta(delta);
        if success {
            record.tasks_completed += 1;
        } else {
            record.tasks_failed += 1;
        }
    }

    /// Overwrite a peer's status; test and recovery tooling only
    pub fn set_peer_status(&self, node_id: NodeId, status: PeerStatus) {
        let mut index = self.peers.write().expect("peer index poisoned");
        if let Some(record) = index.records.get_mut(&node_id) {
            record.status = status;
        }
    }

    /// Insert a fully formed peer record; test tooling for seeding
    /// registries without beacon plumbing
    pub fn insert_peer_record(&self, record: PeerRecord) -> Result<(), StateError> {
        let mut index = self.peers.write().expect("peer index poisoned");
        if index.records.len() >= self.capacities().max_nodes {
            return Err(StateError::Capacity {
                table: "peer registry",
                capacity: self.capacities().max_nodes,
            });
        }

        index.records.insert(record.node_id, record);
        Ok(())
    }
}
