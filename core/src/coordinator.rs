//! The coordinator constructs the state, channels, and workers, starts them,
//! and drives shutdown

use std::net::{IpAddr, SocketAddr};
use std::{error::Error, fmt::Display};

use common::{
    types::{new_cancel_channel, NodeId, PeerRecord},
    worker::Worker,
};
use config::NodeConfig;
use gossip_server::worker::{GossipServer, GossipServerConfig};
use job_types::{
    gossip_server::new_gossip_server_queue,
    network_manager::new_network_manager_queue,
    task_scheduler::{new_assignment_channel, new_task_scheduler_queue, AssignmentReceiver},
};
use network_manager::worker::{NetworkManager, NetworkManagerConfig};
use state::{State, TableCapacities};
use task_scheduler::worker::{TaskScheduler, TaskSchedulerConfig};
use tokio::sync::watch;
use tracing::{info, warn};
use util::{
    networking::{is_private, local_ipv4, subnet_broadcast},
    system::host_name,
};

use crate::handle::NodeHandle;

/// The error type returned while bringing the node up
#[derive(Clone, Debug)]
pub enum CoordinatorError {
    /// A worker failed to initialize; socket creation and registry
    /// allocation surface here
    WorkerSetup(String),
}

impl Display for CoordinatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
impl Error for CoordinatorError {}

/// A running fabric node: its state handle, its workers, and the cancel
/// switch that stops them
pub struct FabricNode {
    /// The collaborator handle
    handle: NodeHandle,
    /// The receiving side of the inbound-assignment channel, for the
    /// executor collaborator to take
    assignment_receiver: Option<AssignmentReceiver>,
    /// The sender half of the cancel channel
    cancel_sender: watch::Sender<()>,
    /// The network manager worker
    network_manager: NetworkManager,
    /// The gossip server worker
    gossip_server: GossipServer,
    /// The task scheduler worker
    task_scheduler: TaskScheduler,
}

impl FabricNode {
    /// Build and start a node from its config
    pub fn start(config: &NodeConfig) -> Result<Self, CoordinatorError> {
        // Mint the node's identity and seed the registry with it
        let node_id = config.node_id.unwrap_or_else(NodeId::generate);
        let local_ip = local_ipv4();
        let address = SocketAddr::new(IpAddr::V4(local_ip), config.data_port);
        let local = PeerRecord::new_local(node_id, host_name(), address);
        info!("starting fabric node {node_id} on {address}");

        // Announce to the interface's own subnet broadcast alongside the
        // configured directed-broadcast list
        let mut broadcast_addrs = config.broadcast_addrs.clone();
        if is_private(&IpAddr::V4(local_ip)) {
            let derived = subnet_broadcast(local_ip).to_string();
            if !broadcast_addrs.contains(&derived) {
                broadcast_addrs.push(derived);
            }
        }

        let state = State::new(
            local,
            TableCapacities {
                max_nodes: config.max_nodes,
                max_tasks: config.max_tasks,
                max_memory_blocks: config.max_memory_blocks,
                max_locks: config.max_locks,
                replica_limit: config.replica_limit,
            },
        );

        // One queue per worker, one cancel switch for all of them
        let (gossip_sender, gossip_receiver) = new_gossip_server_queue();
        let (network_sender, network_receiver) = new_network_manager_queue();
        let (scheduler_sender, scheduler_receiver) = new_task_scheduler_queue();
        let (assignment_sender, assignment_receiver) = new_assignment_channel();
        let (cancel_sender, cancel_channel) = new_cancel_channel();

        let mut network_manager = NetworkManager::new(NetworkManagerConfig {
            discovery_port: config.discovery_port,
            data_port: config.data_port,
            broadcast_addrs,
            job_receiver: Some(network_receiver),
            gossip_sender: gossip_sender.clone(),
            scheduler_sender: scheduler_sender.clone(),
            cancel_channel: cancel_channel.clone(),
        })
        .map_err(|err| CoordinatorError::WorkerSetup(err.to_string()))?;

        let mut gossip_server = GossipServer::new(GossipServerConfig {
            state: state.clone(),
            broadcast_interval: config.broadcast_interval,
            heartbeat_timeout: config.heartbeat_timeout,
            job_sender: gossip_sender,
            job_receiver: Some(gossip_receiver),
            network_sender: network_sender.clone(),
            scheduler_sender: scheduler_sender.clone(),
            cancel_channel: cancel_channel.clone(),
        })
        .map_err(|err| CoordinatorError::WorkerSetup(err.to_string()))?;

        let mut task_scheduler = TaskScheduler::new(TaskSchedulerConfig {
            state: state.clone(),
            job_receiver: Some(scheduler_receiver),
            network_sender,
            assignment_sender: Some(assignment_sender),
            cancel_channel,
        })
        .map_err(|err| CoordinatorError::WorkerSetup(err.to_string()))?;

        network_manager
            .start()
            .map_err(|err| CoordinatorError::WorkerSetup(err.to_string()))?;
        gossip_server.start().map_err(|err| CoordinatorError::WorkerSetup(err.to_string()))?;
        task_scheduler.start().map_err(|err| CoordinatorError::WorkerSetup(err.to_string()))?;

        Ok(Self {
            handle: NodeHandle::new(state, scheduler_sender),
            assignment_receiver: Some(assignment_receiver),
            cancel_sender,
            network_manager,
            gossip_server,
            task_scheduler,
        })
    }

    /// The collaborator handle
    pub fn handle(&self) -> NodeHandle {
        self.handle.clone()
    }

    /// Take the inbound-assignment channel for the executor collaborator
    pub fn take_assignment_receiver(&mut self) -> Option<AssignmentReceiver> {
        self.assignment_receiver.take()
    }

    /// Signal every worker to stop and join them
    ///
    /// Workers observe the signal at their next suspension point; the timer
    /// threads drain once their queues close
    pub fn shutdown(mut self) {
        info!("shutting down fabric node...");
        let _ = self.cancel_sender.send(());

        let handles = self
            .network_manager
            .join()
            .into_iter()
            .map(|handle| ("network-manager", handle.join().map(|err| err.to_string())))
            .chain(
                self.gossip_server
                    .join()
                    .into_iter()
                    .map(|handle| ("gossip-server", handle.join().map(|err| err.to_string()))),
            )
            .chain(
                self.task_scheduler
                    .join()
                    .into_iter()
                    .map(|handle| ("task-scheduler", handle.join().map(|err| err.to_string()))),
            );

        for (name, outcome) in handles {
            match outcome {
                Ok(reason) => info!("{name} stopped: {reason}"),
                Err(_) => warn!("{name} thread panicked during shutdown"),
            }
        }
    }
}
