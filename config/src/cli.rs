//! The node's command line definition

use clap::Parser;

/// An ad-hoc LAN compute-fabric node
#[derive(Clone, Debug, Parser)]
#[command(name = "fabric-node", about, version)]
pub struct Cli {
    /// A deterministic node id, hex encoded; minted from clock, pid, and a
    /// random source when omitted
    pub node_id: Option<String>,

    /// Path to a TOML config file
    #[arg(long)]
    pub config_file: Option<String>,

    /// The UDP port for the discovery channel
    #[arg(long)]
    pub discovery_port: Option<u16>,

    /// The TCP port for the data channel
    #[arg(long)]
    pub data_port: Option<u16>,

    /// Seconds between presence announcements
    #[arg(long)]
    pub broadcast_interval_s: Option<u64>,

    /// Seconds of silence before a peer is reaped
    #[arg(long)]
    pub heartbeat_timeout_s: Option<u64>,

    /// The default log verbosity
    #[arg(long)]
    pub log_level: Option<String>,
}
