//! Assembles a `NodeConfig` from defaults, an optional TOML file, and the
//! command line; later sources win

use std::fs;
use std::time::Duration;

use common::types::NodeId;

use crate::{cli::Cli, ConfigError, FileConfig, NodeConfig};

/// Parse a TOML config file from disk
pub fn parse_config_from_file(path: &str) -> Result<FileConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|e| ConfigError::FileRead(e.to_string()))?;
    toml::from_str(&raw).map_err(|e| ConfigError::FileParse(e.to_string()))
}

/// Build the effective config from the parsed command line
pub fn config_from_cli(cli: &Cli) -> Result<NodeConfig, ConfigError> {
    let file = match &cli.config_file {
        Some(path) => parse_config_from_file(path)?,
        None => FileConfig::default(),
    };

    let mut config = apply_file(NodeConfig::default(), file)?;

    // CLI flags override the file
    if let Some(raw) = &cli.node_id {
        config.node_id = Some(parse_node_id(raw)?);
    }
    if let Some(port) = cli.discovery_port {
        config.discovery_port = port;
    }
    if let Some(port) = cli.data_port {
        config.data_port = port;
    }
    if let Some(secs) = cli.broadcast_interval_s {
        config.broadcast_interval = Duration::from_secs(secs);
    }
    if let Some(secs) = cli.heartbeat_timeout_s {
        config.heartbeat_timeout = Duration::from_secs(secs);
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }

    validate(&config)?;
    Ok(config)
}

/// Layer a file config over the defaults
fn apply_file(mut config: NodeConfig, file: FileConfig) -> Result<NodeConfig, ConfigError> {
    if let Some(raw) = &file.node_id {
        config.node_id = Some(parse_node_id(raw)?);
    }
    if let Some(port) = file.discovery_port {
        config.discovery_port = port;
    }
    if let Some(port) = file.data_port {
        config.data_port = port;
    }
    if let Some(secs) = file.broadcast_interval_s {
        config.broadcast_interval = Duration::from_secs(secs);
    }
    if let Some(secs) = file.heartbeat_timeout_s {
        config.heartbeat_timeout = Duration::from_secs(secs);
    }
    if let Some(addrs) = file.broadcast_addrs {
        config.broadcast_addrs = addrs;
    }
    if let Some(value) = file.max_nodes {
        config.max_nodes = value;
    }
    if let Some(value) = file.max_tasks {
        config.max_tasks = value;
    }
    if let Some(value) = file.max_memory_blocks {
        config.max_memory_blocks = value;
    }
    if let Some(value) = file.max_locks {
        config.max_locks = value;
    }
    if let Some(value) = file.replica_limit {
        config.replica_limit = value;
    }
    if let Some(level) = file.log_level {
        config.log_level = level;
    }

    Ok(config)
}

/// Parse a hex node id
fn parse_node_id(raw: &str) -> Result<NodeId, ConfigError> {
    raw.parse::<NodeId>()
        .map_err(|_| ConfigError::InvalidValue(format!("node_id must be hex, got {raw}")))
}

/// Reject configs that cannot produce a working runtime
fn validate(config: &NodeConfig) -> Result<(), ConfigError> {
    if config.discovery_port == config.data_port {
        return Err(ConfigError::InvalidValue(
            "discovery_port and data_port must differ".to_string(),
        ));
    }
    if config.max_nodes == 0 {
        return Err(ConfigError::InvalidValue("max_nodes must be nonzero".to_string()));
    }
    if config.broadcast_interval.is_zero() {
        return Err(ConfigError::InvalidValue(
            "broadcast_interval_s must be nonzero".to_string(),
        ));
    }
    if let Some(node_id) = config.node_id {
        if node_id.is_zero() {
            return Err(ConfigError::InvalidValue("node_id must be nonzero".to_string()));
        }
    }

    Ok(())
}
