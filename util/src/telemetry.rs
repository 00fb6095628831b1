//! Configures logging for the node

pub use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber
///
/// The `RUST_LOG` environment variable overrides the given default level,
/// allowing per-module filtering without a rebuild
pub fn setup_system_logger(level: LevelFilter) {
    let filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}
