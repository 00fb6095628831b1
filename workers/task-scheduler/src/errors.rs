//! Errors emitted by the task scheduler

use std::{error::Error, fmt::Display};

/// The error type emitted by the task scheduler
#[derive(Clone, Debug)]
pub enum TaskSchedulerError {
    /// Error setting up the worker's threads
    SetupError(String),
    /// Error serializing a task body for the wire
    Serialize(String),
    /// Error enqueuing a job onto another worker's queue
    SendMessage(String),
    /// A table operation failed
    State(String),
    /// The coordinator cancelled the worker
    Cancelled(String),
}

impl Display for TaskSchedulerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
impl Error for TaskSchedulerError {}
