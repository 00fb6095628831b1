//! Implements the `Worker` trait for the gossip server

use std::thread::{Builder, JoinHandle};
use std::time::Duration;

use common::{types::CancelChannel, worker::Worker};
use constants::REAP_INTERVAL_MS;
use job_types::{
    gossip_server::{GossipServerQueue, GossipServerReceiver},
    network_manager::NetworkManagerQueue,
    task_scheduler::TaskSchedulerQueue,
};
use state::State;
use tokio::runtime::Builder as RuntimeBuilder;

use crate::{
    errors::GossipServerError,
    heartbeat::GossipTimer,
    server::GossipProtocolExecutor,
};

/// The configuration passed from the coordinator to the gossip server
pub struct GossipServerConfig {
    /// The node-global state
    pub state: State,
    /// The interval between presence announcements
    pub broadcast_interval: Duration,
    /// The silence threshold after which a peer is reaped
    pub heartbeat_timeout: Duration,
    /// A sender on the gossip server's own queue, used by the timers
    pub job_sender: GossipServerQueue,
    /// The queue on which to receive jobs
    pub job_receiver: Option<GossipServerReceiver>,
    /// The network manager's queue, for outbound announcements
    pub network_sender: NetworkManagerQueue,
    /// The scheduler's queue, for failure and membership signals
    pub scheduler_sender: TaskSchedulerQueue,
    /// The channel on which the coordinator may mandate that the gossip
    /// server cancel its execution
    pub cancel_channel: CancelChannel,
}

/// The gossip server worker
pub struct GossipServer {
    /// The config the worker was constructed from
    config: GossipServerConfig,
    /// The executor, present between construction and start
    executor: Option<GossipProtocolExecutor>,
    /// The join handle of the executor thread
    executor_handle: Option<JoinHandle<GossipServerError>>,
    /// The announce timer
    announce_timer: Option<GossipTimer>,
    /// The reaper timer
    reaper_timer: Option<GossipTimer>,
}

impl Worker for GossipServer {
    type WorkerConfig = GossipServerConfig;
    type Error = GossipServerError;

    fn new(mut config: Self::WorkerConfig) -> Result<Self, Self::Error> {
        let executor = GossipProtocolExecutor::new(
            config.state.clone(),
            config.heartbeat_timeout.as_millis() as u64,
            config.job_receiver.take().expect("job receiver missing"),
            config.network_sender.clone(),
            config.scheduler_sender.clone(),
            config.cancel_channel.clone(),
        );

        Ok(Self {
            config,
            executor: Some(executor),
            executor_handle: None,
            announce_timer: None,
            reaper_timer: None,
        })
    }

    fn name(&self) -> String {
        "gossip-server".to_string()
    }

    fn is_recoverable(&self) -> bool {
        true
    }

    fn start(&mut self) -> Result<(), Self::Error> {
        // Spawn the executor in a thread with its own single-threaded runtime
        let executor = self.executor.take().expect("executor started twice");
        let executor_handle = Builder::new()
            .name("gossip-server-executor".to_string())
            .spawn(move || {
                let runtime = RuntimeBuilder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("building gossip runtime");
                runtime.block_on(executor.execution_loop())
            })
            .map_err(|err| GossipServerError::SetupError(err.to_string()))?;
        self.executor_handle = Some(executor_handle);

        // The timers pace the protocol; they exit when the executor drops
        // the queue at shutdown
        self.announce_timer = Some(GossipTimer::new_announce_timer(
            self.config.job_sender.clone(),
            self.config.broadcast_interval,
        )?);
        self.reaper_timer = Some(GossipTimer::new_reaper_timer(
            self.config.job_sender.clone(),
            Duration::from_millis(REAP_INTERVAL_MS),
        )?);

        Ok(())
    }

    fn join(&mut self) -> Vec<JoinHandle<Self::Error>> {
        vec![
            self.executor_handle.take().expect("joined twice"),
            self.announce_timer.take().expect("joined twice").join_handle(),
            self.reaper_timer.take().expect("joined twice").join_handle(),
        ]
    }

    fn cleanup(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
