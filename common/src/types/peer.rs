//! Peer identity and registry record types

use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;

use constants::{REPUTATION_CEILING, REPUTATION_FLOOR, REPUTATION_INITIAL};
use serde::{Deserialize, Serialize};
use util::get_current_time_millis;

/// The opaque 64-bit identifier of a node in the fabric
///
/// Minted once at startup and stable for the process lifetime; uniqueness
/// across the network is probabilistic but effectively collision free for
/// realistic fleet sizes
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    /// The sentinel id meaning "no node"
    pub const ZERO: NodeId = NodeId(0);

    /// Mint a fresh node id from the high-resolution clock, the process id,
    /// and a random source
    pub fn generate() -> Self {
        loop {
            let nanos = util::get_current_time_nanos() as u64;
            let pid = u64::from(std::process::id());
            let entropy: u64 = rand::random();

            let id = nanos ^ pid.rotate_left(32) ^ entropy;
            if id != 0 {
                return Self(id);
            }
        }
    }

    /// Whether this id is the "no node" sentinel
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s.trim_start_matches("0x"), 16).map(Self)
    }
}

/// The liveness state of a peer as tracked by the membership layer
///
/// Peers are never deleted from the registry; their status walks
/// Active/Busy -> Failed -> Recovering -> Active so that identifier recycling
/// cannot race a concurrent lookup
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum PeerStatus {
    /// The peer has been named but never observed
    #[default]
    Unknown,
    /// The peer is alive and accepting work
    Active,
    /// The peer is alive but saturated; it still heartbeats
    Busy,
    /// The peer missed its heartbeat deadline
    Failed,
    /// A previously failed peer has been heard from again
    Recovering,
}

impl PeerStatus {
    /// Encode the status as its single wire byte
    pub fn to_wire(self) -> u8 {
        match self {
            PeerStatus::Unknown => 0,
            PeerStatus::Active => 1,
            PeerStatus::Busy => 2,
            PeerStatus::Failed => 3,
            PeerStatus::Recovering => 4,
        }
    }

    /// Decode a status from its wire byte, unrecognized bytes map to Unknown
    pub fn from_wire(byte: u8) -> Self {
        match byte {
            1 => PeerStatus::Active,
            2 => PeerStatus::Busy,
            3 => PeerStatus::Failed,
            4 => PeerStatus::Recovering,
            _ => PeerStatus::Unknown,
        }
    }

    /// Whether the peer is currently heartbeating
    pub fn is_live(&self) -> bool {
        matches!(self, PeerStatus::Active | PeerStatus::Busy)
    }
}

/// A registry entry for a single peer, local node included
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerRecord {
    /// The peer's node id
    pub node_id: NodeId,
    /// The peer's self-reported host name
    pub host_name: String,
    /// The address the peer was last observed at, data port included
    pub address: SocketAddr,
    /// The peer's cpu load, normalized to [0, 1]
    pub cpu_load: f32,
    /// The peer's memory utilization, normalized to [0, 1]
    pub memory_usage: f32,
    /// The smoothed estimate of the peer's task-completion reliability,
    /// clamped to [0.1, 1.0] after every update
    pub reputation: f32,
    /// The number of tasks the peer has completed successfully
    pub tasks_completed: u32,
    /// The number of tasks the peer has failed
    pub tasks_failed: u32,
    /// The peer's liveness status
    pub status: PeerStatus,
    /// The last time a beacon was ingested for this peer, unix millis;
    /// non-decreasing while the peer is live
    pub last_seen: u64,
    /// Whether this record describes the local node; true for exactly one
    /// record in the registry
    pub is_local: bool,
}

impl PeerRecord {
    /// Build the record for the local node at startup
    pub fn new_local(node_id: NodeId, host_name: String, address: SocketAddr) -> Self {
        Self {
            node_id,
            host_name,
            address,
            cpu_load: 0.,
            memory_usage: 0.,
            reputation: REPUTATION_INITIAL,
            tasks_completed: 0,
            tasks_failed: 0,
            status: PeerStatus::Active,
            last_seen: get_current_time_millis(),
            is_local: true,
        }
    }

    /// Apply a smoothed reputation delta: `rep <- rep + delta * (1 - rep)`,
    /// then clamp into the admissible band
    ///
    /// Positive deltas have diminishing returns near the ceiling; negative
    /// deltas retain their full force near the floor
    pub fn apply_reputation_delta(&mut self, delta: f32) {
        let updated = self.reputation + delta * (1. - self.reputation);
        self.reputation = updated.clamp(REPUTATION_FLOOR, REPUTATION_CEILING);
    }

    /// Halve the peer's reputation, clamped; applied when the failure
    /// detector declares the peer dead
    pub fn halve_reputation(&mut self) {
        self.reputation = (self.reputation / 2.).clamp(REPUTATION_FLOOR, REPUTATION_CEILING);
    }

    /// The age of the record's last beacon relative to `now_ms`, in seconds
    pub fn age_seconds(&self, now_ms: u64) -> f64 {
        (now_ms.saturating_sub(self.last_seen) as f64) / 1_000.
    }
}
