//! The network manager handles lower level interaction with the fabric's
//! two channels: the connectionless discovery channel that beacons travel
//! on, and the connection-oriented data channel that framed envelopes
//! travel on
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

pub mod error;
pub mod manager;
pub mod worker;
