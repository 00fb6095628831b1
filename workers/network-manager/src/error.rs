//! Errors emitted by the network manager

use std::{error::Error, fmt::Display};

/// The error type emitted by the network manager
#[derive(Clone, Debug)]
pub enum NetworkManagerError {
    /// Error binding or configuring a socket at startup
    SetupError(String),
    /// Error sending on the network; logged and recovered at the callsite
    Network(String),
    /// Error dispatching an inbound message to another worker
    Dispatch(String),
    /// The coordinator cancelled the worker
    Cancelled(String),
}

impl Display for NetworkManagerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
impl Error for NetworkManagerError {}
