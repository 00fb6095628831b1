//! The network manager executor: socket loops for both channels and the
//! outbound job queue

use std::net::SocketAddr;

use common::types::CancelChannel;
use constants::{FRAME_HEADER_BYTES, MAX_PAYLOAD_SIZE};
use gossip_api::{
    framing::{frame_envelope, FrameHeader},
    message::{Envelope, MessageType},
    tasks::{TaskAssignment, TaskOutcome},
    WireError,
};
use job_types::{
    gossip_server::{GossipServerJob, GossipServerQueue},
    network_manager::{NetworkManagerJob, NetworkManagerReceiver},
    task_scheduler::{TaskSchedulerJob, TaskSchedulerQueue},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream, UdpSocket},
};
use tracing::{debug, info, warn};

use crate::error::NetworkManagerError;

/// The receive buffer size for discovery datagrams; comfortably above the
/// largest legal envelope
const RECV_BUFFER_BYTES: usize = 2 * MAX_PAYLOAD_SIZE;

/// The executor abstraction runs in a thread separately from the network
/// manager worker, which retains only the join handle
pub struct NetworkManagerExecutor {
    /// The UDP socket bound to the discovery port, broadcast enabled;
    /// taken by the execution loop
    udp_socket: Option<std::net::UdpSocket>,
    /// The TCP listener bound to the data port; taken by the execution loop
    tcp_listener: Option<std::net::TcpListener>,
    /// The port beacons are broadcast to on each target address
    discovery_port: u16,
    /// The directed-broadcast addresses announcements are sent to
    broadcast_addrs: Vec<String>,
    /// The sequence stamped into outbound frames, incremented per send
    sequence: u32,
    /// The channel to receive outbound requests on from other workers
    job_channel: Option<NetworkManagerReceiver>,
    /// The gossip server's queue, for inbound beacons
    gossip_work_queue: GossipServerQueue,
    /// The scheduler's queue, for inbound task traffic
    scheduler_work_queue: TaskSchedulerQueue,
    /// The cancel channel that the coordinator may use to cancel this worker
    cancel: Option<CancelChannel>,
}

impl NetworkManagerExecutor {
    /// Create a new executor
    pub fn new(
        udp_socket: std::net::UdpSocket,
        tcp_listener: std::net::TcpListener,
        discovery_port: u16,
        broadcast_addrs: Vec<String>,
        job_channel: NetworkManagerReceiver,
        gossip_work_queue: GossipServerQueue,
        scheduler_work_queue: TaskSchedulerQueue,
        cancel: CancelChannel,
    ) -> Self {
        Self {
            udp_socket: Some(udp_socket),
            tcp_listener: Some(tcp_listener),
            discovery_port,
            broadcast_addrs,
            sequence: 0,
            job_channel: Some(job_channel),
            gossip_work_queue,
            scheduler_work_queue,
            cancel: Some(cancel),
        }
    }

    /// The main loop in which the worker processes traffic in both
    /// directions
    ///
    /// Transport errors are logged and swallowed; the next interval or
    /// connection retries. No branch may crash the runtime.
    pub async fn executor_loop(mut self) -> NetworkManagerError {
        info!("starting executor loop for network manager...");
        let mut cancel = self.cancel.take().expect("cancel channel taken twice");
        let mut job_channel = self.job_channel.take().expect("job queue taken twice");

        let std_udp = self.udp_socket.take().expect("udp socket taken twice");
        let udp_socket = match UdpSocket::from_std(std_udp) {
            Ok(socket) => socket,
            Err(err) => return NetworkManagerError::SetupError(err.to_string()),
        };
        let std_tcp = self.tcp_listener.take().expect("tcp listener taken twice");
        let tcp_listener = match TcpListener::from_std(std_tcp) {
            Ok(listener) => listener,
            Err(err) => return NetworkManagerError::SetupError(err.to_string()),
        };

        let mut recv_buf = vec![0u8; RECV_BUFFER_BYTES];
        loop {
            tokio::select! {
                // Outbound requests from worker components of the node
                Some(job) = job_channel.recv() => {
                    if let Err(err) = self.handle_outbound_job(&udp_socket, job).await {
                        warn!("error sending outbound message: {err}");
                    }
                },

                // Inbound datagrams on the discovery channel
                recv = udp_socket.recv_from(&mut recv_buf) => {
                    match recv {
                        Ok((n_bytes, sender)) => {
                            self.handle_datagram(&recv_buf[..n_bytes], sender);
                        },
                        Err(err) => warn!("discovery receive failed: {err}"),
                    }
                },

                // Inbound connections on the data channel
                accept = tcp_listener.accept() => {
                    match accept {
                        Ok((stream, sender)) => {
                            let gossip_queue = self.gossip_work_queue.clone();
                            let scheduler_queue = self.scheduler_work_queue.clone();
                            tokio::spawn(async move {
                                serve_data_connection(
                                    stream,
                                    sender,
                                    gossip_queue,
                                    scheduler_queue,
                                ).await;
                            });
                        },
                        Err(err) => warn!("data channel accept failed: {err}"),
                    }
                },

                // A cancel signal from the coordinator
                _ = cancel.changed() => {
                    return NetworkManagerError::Cancelled("received cancel signal".to_string());
                }
            }
        }
    }

    /// Handle an outbound job from the other workers
    async fn handle_outbound_job(
        &mut self,
        udp_socket: &UdpSocket,
        job: NetworkManagerJob,
    ) -> Result<(), NetworkManagerError> {
        match job {
            NetworkManagerJob::Broadcast(envelope) => {
                self.broadcast_envelope(udp_socket, &envelope).await
            }
            NetworkManagerJob::SendDirect { addr, envelope } => {
                self.sequence = self.sequence.wrapping_add(1);
                let frame = frame_envelope(&envelope, self.sequence);
                tokio::spawn(async move {
                    if let Err(err) = send_frame(addr, &frame).await {
                        warn!("direct send to {addr} failed: {err}");
                    }
                });
                Ok(())
            }
        }
    }

    /// Send an envelope to every configured broadcast address
    ///
    /// Individual send failures are logged and skipped so one misconfigured
    /// subnet cannot mute the rest
    async fn broadcast_envelope(
        &self,
        udp_socket: &UdpSocket,
        envelope: &Envelope,
    ) -> Result<(), NetworkManagerError> {
        let bytes = envelope.encode();
        for addr in &self.broadcast_addrs {
            let target = format!("{addr}:{}", self.discovery_port);
            if let Err(err) = udp_socket.send_to(&bytes, &target).await {
                debug!("broadcast to {target} failed: {err}");
            }
        }

        Ok(())
    }

    /// Decode and dispatch a discovery datagram
    fn handle_datagram(&self, bytes: &[u8], sender: SocketAddr) {
        match Envelope::decode(bytes) {
            Ok(envelope) => {
                if let Err(err) = dispatch_envelope(
                    envelope,
                    sender,
                    &self.gossip_work_queue,
                    &self.scheduler_work_queue,
                ) {
                    warn!("error dispatching datagram from {sender}: {err}");
                }
            }
            Err(err) => debug!("dropping malformed datagram from {sender}: {err}"),
        }
    }
}

/// Route an inbound envelope to the worker that owns its type
fn dispatch_envelope(
    envelope: Envelope,
    sender: SocketAddr,
    gossip_queue: &GossipServerQueue,
    scheduler_queue: &TaskSchedulerQueue,
) -> Result<(), NetworkManagerError> {
    match envelope.msg_type {
        MessageType::Discovery | MessageType::Heartbeat | MessageType::NodeFailure => gossip_queue
            .send(GossipServerJob::Ingest { envelope, sender })
            .map_err(|err| NetworkManagerError::Dispatch(err.to_string())),

        // A migration hand-off carries the same body as a fresh assignment
        MessageType::TaskAssign | MessageType::TaskMigrate => {
            let assignment: TaskAssignment = bincode::deserialize(&envelope.payload)
                .map_err(|err| NetworkManagerError::Dispatch(err.to_string()))?;
            scheduler_queue
                .send(TaskSchedulerJob::InboundAssignment(assignment))
                .map_err(|err| NetworkManagerError::Dispatch(err.to_string()))
        }

        MessageType::TaskResult => {
            let outcome: TaskOutcome = bincode::deserialize(&envelope.payload)
                .map_err(|err| NetworkManagerError::Dispatch(err.to_string()))?;
            scheduler_queue
                .send(TaskSchedulerJob::Complete {
                    task_id: outcome.task_id,
                    exit_code: outcome.exit_code,
                    result: outcome.result,
                })
                .map_err(|err| NetworkManagerError::Dispatch(err.to_string()))
        }

        // Memory and lock traffic is serviced by the data channel
        // collaborator; the core only records that it arrived
        MessageType::MemRequest
        | MessageType::MemResponse
        | MessageType::MemReplicate
        | MessageType::SyncLock
        | MessageType::SyncUnlock => {
            debug!("{:?} from {sender} left to the data channel collaborator", envelope.msg_type);
            Ok(())
        }
    }
}

/// Read framed envelopes off an accepted data connection until the peer
/// hangs up
///
/// Frames with a non-matching magic are dropped silently, per the channel
/// contract; other malformed traffic closes the connection with a log line
async fn serve_data_connection(
    mut stream: TcpStream,
    sender: SocketAddr,
    gossip_queue: GossipServerQueue,
    scheduler_queue: TaskSchedulerQueue,
) {
    let mut header_buf = [0u8; FRAME_HEADER_BYTES];
    loop {
        if stream.read_exact(&mut header_buf).await.is_err() {
            return;
        }

        let header = match FrameHeader::decode(&header_buf) {
            Ok(header) => header,
            Err(WireError::BadMagic(_)) => return,
            Err(err) => {
                debug!("malformed frame from {sender}: {err}");
                return;
            }
        };

        let mut payload = vec![0u8; header.payload_size as usize];
        if stream.read_exact(&mut payload).await.is_err() {
            return;
        }

        let envelope = Envelope {
            msg_type: header.msg_type,
            sender_id: header.sender_node_id,
            timestamp: util::get_current_time_seconds(),
            payload,
        };
        if let Err(err) = dispatch_envelope(envelope, sender, &gossip_queue, &scheduler_queue) {
            warn!("error dispatching frame from {sender}: {err}");
        }
    }
}

/// Open a connection to a peer's data port and write one framed envelope
async fn send_frame(addr: SocketAddr, frame: &[u8]) -> Result<(), NetworkManagerError> {
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|err| NetworkManagerError::Network(err.to_string()))?;
    stream.write_all(frame).await.map_err(|err| NetworkManagerError::Network(err.to_string()))?;
    stream.shutdown().await.map_err(|err| NetworkManagerError::Network(err.to_string()))
}
