//! Defines the wire types exchanged between fabric nodes: the compact
//! envelope used on the discovery channel, the bit-exact discovery payload,
//! and the framed envelope used on the data channel
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

pub mod discovery;
pub mod framing;
pub mod message;
pub mod tasks;

use std::{error::Error, fmt::Display};

/// The error type returned by the wire codecs
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WireError {
    /// The buffer ended before the declared structure did
    Truncated,
    /// A declared payload size exceeds the fixed envelope capacity
    PayloadTooLarge(usize),
    /// A framed header's magic did not match; receivers drop these silently
    BadMagic(u32),
    /// An unrecognized message type tag was observed
    UnknownMessageType(u32),
}

impl Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
impl Error for WireError {}
