//! Job types for the gossip server

use std::net::SocketAddr;

use gossip_api::message::Envelope;
use tokio::sync::mpsc::{
    unbounded_channel, UnboundedReceiver as TokioReceiver, UnboundedSender as TokioSender,
};

/// The queue sender type to send jobs to the gossip server
pub type GossipServerQueue = TokioSender<GossipServerJob>;
/// The queue receiver type to receive jobs for the gossip server
pub type GossipServerReceiver = TokioReceiver<GossipServerJob>;

/// Create a new gossip server queue
pub fn new_gossip_server_queue() -> (GossipServerQueue, GossipServerReceiver) {
    unbounded_channel()
}

/// The job type for the gossip server
#[derive(Debug)]
pub enum GossipServerJob {
    /// An inbound envelope from the discovery or data channel, paired with
    /// the address it was observed from
    Ingest {
        /// The received envelope
        envelope: Envelope,
        /// The datagram's observed source; authoritative over any address
        /// text in the payload
        sender: SocketAddr,
    },
    /// A timer tick requesting that the local presence be announced
    ExecuteAnnounce,
    /// A timer tick requesting a failure-detection sweep
    ExecuteReap,
}
