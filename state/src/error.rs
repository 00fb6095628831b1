//! The error type returned by the state interface

use thiserror::Error;

/// Errors surfaced by table operations
///
/// Transport and peer-failure conditions never appear here; the former are
/// handled inside the network manager, the latter are internal signals
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum StateError {
    /// The referenced id is not present in its table
    #[error("no such entry: {0}")]
    NotFound(u64),
    /// An offset or size fell outside the referenced buffer
    #[error("out of bounds: offset {offset} + len {len} exceeds size {size}")]
    OutOfBounds {
        /// The requested offset
        offset: usize,
        /// The requested length
        len: usize,
        /// The buffer's fixed size
        size: usize,
    },
    /// The table is at capacity and the operation was refused
    #[error("{table} table full (capacity {capacity})")]
    Capacity {
        /// The table that refused the operation
        table: &'static str,
        /// The table's configured capacity
        capacity: usize,
    },
    /// A bounded wait expired before the operation could proceed
    #[error("timed out after {0}ms")]
    Timeout(u64),
}
