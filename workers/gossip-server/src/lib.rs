//! The gossip server maintains the peer registry: it announces the local
//! node's presence, ingests beacons from peers, and reaps peers that have
//! gone silent, signaling the scheduler to migrate their tasks
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

pub mod errors;
pub mod heartbeat;
pub mod server;
pub mod worker;
