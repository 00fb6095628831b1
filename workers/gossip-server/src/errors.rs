//! Errors emitted by the gossip server

use std::{error::Error, fmt::Display};

/// The error type emitted by the gossip server and its timers
#[derive(Clone, Debug)]
pub enum GossipServerError {
    /// Error setting up the worker's threads
    SetupError(String),
    /// Error parsing an inbound payload
    Parse(String),
    /// Error enqueuing a job onto another worker's queue
    SendMessage(String),
    /// A timer thread could not enqueue its tick
    TimerFailed(String),
    /// The coordinator cancelled the worker
    Cancelled(String),
}

impl Display for GossipServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
impl Error for GossipServerError {}
