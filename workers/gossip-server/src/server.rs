//! The gossip protocol executor: the job loop driving announcements,
//! beacon ingest, and failure sweeps

use common::types::CancelChannel;
use job_types::{
    gossip_server::{GossipServerJob, GossipServerReceiver},
    network_manager::NetworkManagerQueue,
    task_scheduler::TaskSchedulerQueue,
};
use state::State;
use tracing::{info, warn};
use util::system::HostSampler;

use crate::errors::GossipServerError;

/// The executor runs in its own thread and owns the inbound job queue; the
/// `GossipServer` worker retains only the join handles
pub struct GossipProtocolExecutor {
    /// The node-global state
    pub(crate) state: State,
    /// The silence threshold for the failure sweep, in milliseconds
    pub(crate) heartbeat_timeout_ms: u64,
    /// The sampler for the local node's load counters
    pub(crate) sampler: HostSampler,
    /// The queue of inbound jobs; taken by the execution loop
    pub(crate) job_receiver: Option<GossipServerReceiver>,
    /// The network manager's queue, for outbound announcements
    pub(crate) network_sender: NetworkManagerQueue,
    /// The scheduler's queue, for failure and membership signals
    pub(crate) scheduler_sender: TaskSchedulerQueue,
    /// The channel on which the coordinator may cancel execution
    pub(crate) cancel_channel: Option<CancelChannel>,
}

impl GossipProtocolExecutor {
    /// Constructor
    pub fn new(
        state: State,
        heartbeat_timeout_ms: u64,
        job_receiver: GossipServerReceiver,
        network_sender: NetworkManagerQueue,
        scheduler_sender: TaskSchedulerQueue,
        cancel_channel: CancelChannel,
    ) -> Self {
        Self {
            state,
            heartbeat_timeout_ms,
            sampler: HostSampler::new(),
            job_receiver: Some(job_receiver),
            network_sender,
            scheduler_sender,
            cancel_channel: Some(cancel_channel),
        }
    }

    /// The main loop in which the executor processes jobs until cancelled
    pub async fn execution_loop(mut self) -> GossipServerError {
        info!("starting executor loop for gossip server...");
        let mut cancel_channel = self.cancel_channel.take().expect("cancel channel taken twice");
        let mut job_receiver = self.job_receiver.take().expect("job queue taken twice");

        loop {
            tokio::select! {
                Some(job) = job_receiver.recv() => {
                    if let Err(err) = self.handle_job(job) {
                        warn!("error handling gossip job: {err}");
                    }
                },

                _ = cancel_channel.changed() => {
                    return GossipServerError::Cancelled("received cancel signal".to_string());
                }
            }
        }
    }

    /// Dispatch a single job
    pub fn handle_job(&mut self, job: GossipServerJob) -> Result<(), GossipServerError> {
        match job {
            GossipServerJob::Ingest { envelope, sender } => self.handle_ingest(envelope, sender),
            GossipServerJob::ExecuteAnnounce => self.announce(),
            GossipServerJob::ExecuteReap => self.reap(),
        }
    }
}
