//! Defines the `Worker` abstraction that all long-running node components
//! implement; the coordinator drives workers through this interface only

use std::fmt::Debug;
use std::thread::JoinHandle;

/// A worker is a long-lived component of the node runtime; it is constructed
/// from a config by the coordinator, started once, and joined at shutdown
pub trait Worker: Sized {
    /// The configuration passed from the coordinator to the worker
    type WorkerConfig;
    /// The error type the worker's threads resolve to
    type Error: Debug + Send;

    /// Create the worker from its config without starting any threads
    fn new(config: Self::WorkerConfig) -> Result<Self, Self::Error>;

    /// The display name of the worker, used in logs and thread names
    fn name(&self) -> String;

    /// Whether the coordinator may restart this worker after a crash
    fn is_recoverable(&self) -> bool;

    /// Spawn the worker's threads; called exactly once after `new`
    fn start(&mut self) -> Result<(), Self::Error>;

    /// Hand the worker's join handles to the coordinator
    fn join(&mut self) -> Vec<JoinHandle<Self::Error>>;

    /// Tear down any resources the worker holds outside its threads
    fn cleanup(&mut self) -> Result<(), Self::Error>;
}
