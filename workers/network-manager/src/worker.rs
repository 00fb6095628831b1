//! Implements the `Worker` trait for the network manager

use std::net::{TcpListener, UdpSocket};
use std::thread::{Builder, JoinHandle};

use common::{types::CancelChannel, worker::Worker};
use job_types::{
    gossip_server::GossipServerQueue, network_manager::NetworkManagerReceiver,
    task_scheduler::TaskSchedulerQueue,
};
use tokio::runtime::Builder as RuntimeBuilder;
use tracing::info;

use crate::{error::NetworkManagerError, manager::NetworkManagerExecutor};

/// The configuration passed from the coordinator to the network manager
pub struct NetworkManagerConfig {
    /// The UDP port for the discovery channel
    pub discovery_port: u16,
    /// The TCP port for the data channel
    pub data_port: u16,
    /// The directed-broadcast addresses announcements are sent to
    pub broadcast_addrs: Vec<String>,
    /// The queue on which to receive outbound requests
    pub job_receiver: Option<NetworkManagerReceiver>,
    /// The gossip server's queue, for inbound beacons
    pub gossip_sender: GossipServerQueue,
    /// The scheduler's queue, for inbound task traffic
    pub scheduler_sender: TaskSchedulerQueue,
    /// The channel on which the coordinator may mandate that the network
    /// manager cancel its execution
    pub cancel_channel: CancelChannel,
}

/// The network manager worker; binds both channels at construction so a
/// port conflict surfaces as an initialization failure
pub struct NetworkManager {
    /// The executor, present between construction and start
    executor: Option<NetworkManagerExecutor>,
    /// The join handle of the executor thread
    executor_handle: Option<JoinHandle<NetworkManagerError>>,
}

impl Worker for NetworkManager {
    type WorkerConfig = NetworkManagerConfig;
    type Error = NetworkManagerError;

    fn new(mut config: Self::WorkerConfig) -> Result<Self, Self::Error> {
        let udp_socket = UdpSocket::bind(("0.0.0.0", config.discovery_port))
            .map_err(|err| NetworkManagerError::SetupError(err.to_string()))?;
        udp_socket
            .set_broadcast(true)
            .map_err(|err| NetworkManagerError::SetupError(err.to_string()))?;
        udp_socket
            .set_nonblocking(true)
            .map_err(|err| NetworkManagerError::SetupError(err.to_string()))?;

        let tcp_listener = TcpListener::bind(("0.0.0.0", config.data_port))
            .map_err(|err| NetworkManagerError::SetupError(err.to_string()))?;
        tcp_listener
            .set_nonblocking(true)
            .map_err(|err| NetworkManagerError::SetupError(err.to_string()))?;

        info!(
            "listening on udp {} (discovery) and tcp {} (data)",
            config.discovery_port, config.data_port,
        );

        let executor = NetworkManagerExecutor::new(
            udp_socket,
            tcp_listener,
            config.discovery_port,
            config.broadcast_addrs.clone(),
            config.job_receiver.take().expect("job receiver missing"),
            config.gossip_sender.clone(),
            config.scheduler_sender.clone(),
            config.cancel_channel.clone(),
        );

        Ok(Self { executor: Some(executor), executor_handle: None })
    }

    fn name(&self) -> String {
        "network-manager".to_string()
    }

    fn is_recoverable(&self) -> bool {
        false
    }

    fn start(&mut self) -> Result<(), Self::Error> {
        let executor = self.executor.take().expect("executor started twice");
        let executor_handle = Builder::new()
            .name("network-manager-executor".to_string())
            .spawn(move || {
                let runtime = RuntimeBuilder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("building network runtime");
                runtime.block_on(executor.executor_loop())
            })
            .map_err(|err| NetworkManagerError::SetupError(err.to_string()))?;

        self.executor_handle = Some(executor_handle);
        Ok(())
    }

    fn join(&mut self) -> Vec<JoinHandle<Self::Error>> {
        vec![self.executor_handle.take().expect("joined twice")]
    }

    fn cleanup(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
