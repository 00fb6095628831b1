//! The task scheduler accepts submissions from the local node, scores
//! candidate peers against their advertised load and earned reputation,
//! records assignments, and migrates in-flight tasks away from peers the
//! failure detector declares dead
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

pub mod errors;
pub mod manager;
pub mod selection;
pub mod worker;
