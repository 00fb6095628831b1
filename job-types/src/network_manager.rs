//! Job types for the network manager

use std::net::SocketAddr;

use gossip_api::message::Envelope;
use tokio::sync::mpsc::{
    unbounded_channel, UnboundedReceiver as TokioReceiver, UnboundedSender as TokioSender,
};

/// The queue sender type to send jobs to the network manager
pub type NetworkManagerQueue = TokioSender<NetworkManagerJob>;
/// The queue receiver type to receive jobs for the network manager
pub type NetworkManagerReceiver = TokioReceiver<NetworkManagerJob>;

/// Create a new network manager queue
pub fn new_network_manager_queue() -> (NetworkManagerQueue, NetworkManagerReceiver) {
    unbounded_channel()
}

/// The job type for the network manager; outbound traffic only, inbound
/// traffic is dispatched directly from the socket loops
#[derive(Debug)]
pub enum NetworkManagerJob {
    /// Broadcast an envelope on the discovery channel to every configured
    /// broadcast address
    Broadcast(Envelope),
    /// Send a framed envelope to a single peer's data port
    SendDirect {
        /// The peer's data-channel address
        addr: SocketAddr,
        /// The envelope to frame and send
        envelope: Envelope,
    },
}
