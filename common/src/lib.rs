//! Defines types, traits, and helpers shared across the fabric node workspace
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

pub mod types;
pub mod worker;
