//! Defines the node's configuration surface and its parsing from the CLI
//! and an optional TOML file
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

pub mod cli;
pub mod parsing;

use std::{error::Error, fmt::Display, time::Duration};

use common::types::NodeId;
use constants::{
    DEFAULT_BROADCAST_ADDRS, DEFAULT_BROADCAST_INTERVAL_MS, DEFAULT_DATA_PORT,
    DEFAULT_DISCOVERY_PORT, DEFAULT_HEARTBEAT_TIMEOUT_MS, DEFAULT_MAX_LOCKS,
    DEFAULT_MAX_MEMORY_BLOCKS, DEFAULT_MAX_NODES, DEFAULT_MAX_TASKS, DEFAULT_REPLICA_LIMIT,
};
use serde::Deserialize;

/// The error type returned while assembling a config
#[derive(Clone, Debug)]
pub enum ConfigError {
    /// The config file could not be read
    FileRead(String),
    /// The config file could not be parsed
    FileParse(String),
    /// A value failed validation
    InvalidValue(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
impl Error for ConfigError {}

/// The node's full configuration after defaults, file, and CLI have been
/// merged
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// The node id to run under; minted at startup when absent
    pub node_id: Option<NodeId>,
    /// The UDP port for the discovery channel
    pub discovery_port: u16,
    /// The TCP port for the data channel
    pub data_port: u16,
    /// The interval between presence announcements
    pub broadcast_interval: Duration,
    /// The silence threshold after which a peer is reaped
    pub heartbeat_timeout: Duration,
    /// The directed-broadcast addresses announcements are sent to
    pub broadcast_addrs: Vec<String>,
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
    /// The default log verbosity; `RUST_LOG` overrides per module
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            discovery_port: DEFAULT_DISCOVERY_PORT,
            data_port: DEFAULT_DATA_PORT,
            broadcast_interval: Duration::from_millis(DEFAULT_BROADCAST_INTERVAL_MS),
            heartbeat_timeout: Duration::from_millis(DEFAULT_HEARTBEAT_TIMEOUT_MS),
            broadcast_addrs: DEFAULT_BROADCAST_ADDRS.iter().map(|s| s.to_string()).collect(),
            max_nodes: DEFAULT_MAX_NODES,
            max_tasks: DEFAULT_MAX_TASKS,
            max_memory_blocks: DEFAULT_MAX_MEMORY_BLOCKS,
            max_locks: DEFAULT_MAX_LOCKS,
            replica_limit: DEFAULT_REPLICA_LIMIT,
            log_level: "info".to_string(),
        }
    }
}

/// The subset of options recognized in a TOML config file; every field is
/// optional, absent fields keep their defaults
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// A deterministic node id, hex encoded
    pub node_id: Option<String>,
    /// The UDP port for the discovery channel
    pub discovery_port: Option<u16>,
    /// The TCP port for the data channel
    pub data_port: Option<u16>,
    /// Seconds between presence announcements
    pub broadcast_interval_s: Option<u64>,
    /// Seconds of silence before a peer is reaped
    pub heartbeat_timeout_s: Option<u64>,
    /// The directed-broadcast addresses announcements are sent to
    pub broadcast_addrs: Option<Vec<String>>,
    /// The peer registry capacity
    pub max_nodes: Option<usize>,
    /// The task table capacity
    pub max_tasks: Option<usize>,
    /// The memory block table capacity
    pub max_memory_blocks: Option<usize>,
    /// The lock table capacity
    pub max_locks: Option<usize>,
    /// The per-block replica set capacity
    pub replica_limit: Option<usize>,
    /// The default log verbosity
    pub log_level: Option<String>,
}
