//! The fabric node entrypoint; manages the node's startup and shutdown
#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]
#![deny(unsafe_code)]

use std::process::ExitCode;
use std::str::FromStr;

use clap::Parser;
use config::{cli::Cli, parsing::config_from_cli};
use fabric_node::FabricNode;
use tracing::{error, info};
use util::telemetry::{setup_system_logger, LevelFilter};

/// Parse the config, bring the node up, and hold it until interrupted
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match config_from_cli(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    let level = LevelFilter::from_str(&config.log_level).unwrap_or(LevelFilter::INFO);
    setup_system_logger(level);

    // Initialization failures (socket creation, registry allocation) are the
    // only condition that exits nonzero; runtime errors are recovered inside
    // the workers
    let node = match FabricNode::start(&config) {
        Ok(node) => node,
        Err(err) => {
            error!("failed to start node: {err}");
            return ExitCode::FAILURE;
        }
    };

    info!("node running; press ctrl-c to stop");
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed waiting for shutdown signal: {err}");
    }

    node.shutdown();
    ExitCode::SUCCESS
}
