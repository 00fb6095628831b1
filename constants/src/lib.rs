//! Defines constants used throughout the fabric node workspace
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::missing_docs_in_private_items)]

// ---------------
// | Wire Layout |
// ---------------

/// The magic bytes prefixing a framed envelope on the data channel
pub const ENVELOPE_MAGIC: u32 = 0xDEAD_BEEF;
/// The protocol version stamped into framed envelope headers
pub const PROTOCOL_VERSION: u32 = 1;
/// The size of the framed envelope header on the data channel, in bytes:
/// magic (4B) + version (4B) + msg_type (4B) + sender_node_id (8B) +
/// sequence (4B) + payload_size (4B)
pub const FRAME_HEADER_BYTES: usize = 28;
/// The size of the compact envelope header on the discovery channel, in bytes
pub const ENVELOPE_HEADER_BYTES: usize = 19;
/// The maximum payload carried by a single envelope, in bytes
pub const MAX_PAYLOAD_SIZE: usize = 1024;
/// The fixed width of the host name field in a discovery payload
pub const HOST_NAME_BYTES: usize = 64;
/// The fixed width of the address text field in a discovery payload
pub const ADDR_TEXT_BYTES: usize = 16;
/// The exact encoded size of a discovery payload
pub const DISCOVERY_PAYLOAD_BYTES: usize = 111;

// ------------
// | Networking |
// ------------

/// The default UDP port for the discovery channel
pub const DEFAULT_DISCOVERY_PORT: u16 = 8888;
/// The default TCP port for the data channel
pub const DEFAULT_DATA_PORT: u16 = 8889;
/// The directed-broadcast addresses announced to by default, covering the
/// common private subnets alongside the true limited-broadcast address
pub const DEFAULT_BROADCAST_ADDRS: &[&str] = &[
    "255.255.255.255",
    "192.168.0.255",
    "192.168.1.255",
    "10.0.0.255",
    "10.0.1.255",
    "172.16.255.255",
];

// -----------------------
// | Membership Schedule |
// -----------------------

/// The default interval between local presence announcements, in milliseconds
pub const DEFAULT_BROADCAST_INTERVAL_MS: u64 = 3_000;
/// The interval between failure-detection sweeps, in milliseconds
pub const REAP_INTERVAL_MS: u64 = 5_000;
/// The default silence threshold after which a peer is declared failed,
/// in milliseconds
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 15_000;
/// The cpu load above which the local node announces itself as busy
pub const BUSY_CPU_THRESHOLD: f32 = 0.85;

// ----------------------
// | Table Capacities |
// ----------------------

/// The default capacity of the peer registry
pub const DEFAULT_MAX_NODES: usize = 64;
/// The default capacity of the scheduler's task table
pub const DEFAULT_MAX_TASKS: usize = 1024;
/// The default capacity of the shared memory block table
pub const DEFAULT_MAX_MEMORY_BLOCKS: usize = 256;
/// The default capacity of the named lock table
pub const DEFAULT_MAX_LOCKS: usize = 128;
/// The default per-block replica set capacity
pub const DEFAULT_REPLICA_LIMIT: usize = 3;

// --------------
// | Reputation |
// --------------

/// The lower clamp on a peer's reputation
pub const REPUTATION_FLOOR: f32 = 0.1;
/// The upper clamp on a peer's reputation
pub const REPUTATION_CEILING: f32 = 1.0;
/// The reputation assigned to a newly discovered peer
pub const REPUTATION_INITIAL: f32 = 0.5;

// ------------
// | Tasks |
// ------------

/// The lowest admissible task priority
pub const TASK_PRIORITY_MIN: i32 = 1;
/// The highest admissible task priority
pub const TASK_PRIORITY_MAX: i32 = 10;
