//! Groups gossip server logic for the announcement and failure-detection
//! protocol, along with the timers that pace it

use std::net::SocketAddr;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use common::types::PeerStatus;
use constants::BUSY_CPU_THRESHOLD;
use gossip_api::{
    discovery::DiscoveryPayload,
    message::{Envelope, MessageType},
};
use job_types::{
    gossip_server::{GossipServerJob, GossipServerQueue},
    network_manager::NetworkManagerJob,
    task_scheduler::TaskSchedulerJob,
};
use state::interface::peers::BeaconObservation;
use tracing::{debug, info, warn};
use util::get_current_time_millis;

use crate::{errors::GossipServerError, server::GossipProtocolExecutor};

/// Announcement and sweep implementation of the protocol executor
impl GossipProtocolExecutor {
    /// Refresh the local record from host counters and broadcast it
    ///
    /// The local node announces Busy above the cpu saturation threshold so
    /// that peers deprioritize it without dropping it from their registries
    pub(crate) fn announce(&mut self) -> Result<(), GossipServerError> {
        let cpu_load = self.sampler.cpu_load();
        let memory_usage = self.sampler.memory_usage();
        let status =
            if cpu_load > BUSY_CPU_THRESHOLD { PeerStatus::Busy } else { PeerStatus::Active };

        let local = self.state.refresh_local_record(cpu_load, memory_usage, status);
        let payload = DiscoveryPayload::from_record(&local).encode();

        let envelope = Envelope::new(MessageType::Discovery, local.node_id, payload)
            .map_err(|err| GossipServerError::SendMessage(err.to_string()))?;
        self.network_sender
            .send(NetworkManagerJob::Broadcast(envelope))
            .map_err(|err| GossipServerError::SendMessage(err.to_string()))
    }

    /// Ingest an inbound envelope observed at `sender`
    pub(crate) fn handle_ingest(
        &mut self,
        envelope: Envelope,
        sender: SocketAddr,
    ) -> Result<(), GossipServerError> {
        // The local node hears its own broadcasts; drop them by sender id
        if envelope.sender_id == self.state.local_node_id() {
            return Ok(());
        }

        match envelope.msg_type {
            MessageType::Discovery | MessageType::Heartbeat => {
                self.ingest_beacon(&envelope, sender)
            }

            // Failure notices are hints only; the local failure detector is
            // the sole authority for marking a peer failed
            MessageType::NodeFailure => {
                info!("peer {} reports a node failure (hint only)", envelope.sender_id);
                Ok(())
            }

            other => {
                debug!("unexpected {other:?} on the discovery channel, ignoring");
                Ok(())
            }
        }
    }

    /// Decode and apply a single beacon
    fn ingest_beacon(
        &mut self,
        envelope: &Envelope,
        sender: SocketAddr,
    ) -> Result<(), GossipServerError> {
        let payload = DiscoveryPayload::decode(&envelope.payload)
            .map_err(|err| GossipServerError::Parse(err.to_string()))?;

        let obs = BeaconObservation {
            node_id: envelope.sender_id,
            host_name: payload.host_name,
            observed_ip: sender.ip(),
            data_port: payload.data_port,
            cpu_load: payload.cpu_load,
            memory_usage: payload.memory_usage,
            reputation: payload.reputation,
            tasks_completed: payload.tasks_completed,
            tasks_failed: payload.tasks_failed,
            status: payload.status,
        };

        // A full registry drops the beacon; the refusal is already logged
        let Ok(delta) = self.state.ingest_beacon(obs) else {
            return Ok(());
        };

        if delta.is_new || delta.became_active {
            self.scheduler_sender
                .send(TaskSchedulerJob::MembershipChanged)
                .map_err(|err| GossipServerError::SendMessage(err.to_string()))?;
        }

        Ok(())
    }

    /// Sweep the registry for silent peers and signal the scheduler for each
    /// newly failed one
    ///
    /// The registry guard is released inside the sweep before any signal is
    /// sent, so the scheduler never runs under it
    pub(crate) fn reap(&mut self) -> Result<(), GossipServerError> {
        let now = get_current_time_millis();
        let failed = self.state.reap_silent_peers(now, self.heartbeat_timeout_ms);

        for node_id in failed {
            warn!("signaling scheduler: peer {node_id} failed");
            self.scheduler_sender
                .send(TaskSchedulerJob::PeerFailed { node_id })
                .map_err(|err| GossipServerError::SendMessage(err.to_string()))?;

            // Hint the rest of the fabric; receivers run their own failure
            // detectors and treat this as advisory only
            let hint = Envelope::new(
                MessageType::NodeFailure,
                self.state.local_node_id(),
                node_id.0.to_le_bytes().to_vec(),
            )
            .map_err(|err| GossipServerError::SendMessage(err.to_string()))?;
            self.network_sender
                .send(NetworkManagerJob::Broadcast(hint))
                .map_err(|err| GossipServerError::SendMessage(err.to_string()))?;
        }

        Ok(())
    }
}

/// A timer thread that enqueues a fixed job onto the gossip server's queue
/// at a regular interval
///
/// The timer exits when the executor side of the queue is dropped
#[derive(Debug)]
pub struct GossipTimer {
    /// The join handle of the thread executing the timer
    thread_handle: Option<JoinHandle<GossipServerError>>,
}

impl GossipTimer {
    /// Spawn a timer that enqueues announce ticks
    pub fn new_announce_timer(
        job_queue: GossipServerQueue,
        interval: Duration,
    ) -> Result<Self, GossipServerError> {
        Self::spawn("announce-timer", job_queue, interval, || GossipServerJob::ExecuteAnnounce)
    }

    /// Spawn a timer that enqueues failure-sweep ticks
    pub fn new_reaper_timer(
        job_queue: GossipServerQueue,
        interval: Duration,
    ) -> Result<Self, GossipServerError> {
        Self::spawn("reaper-timer", job_queue, interval, || GossipServerJob::ExecuteReap)
    }

    /// Spawn the timing loop
    fn spawn(
        name: &str,
        job_queue: GossipServerQueue,
        interval: Duration,
        tick: fn() -> GossipServerJob,
    ) -> Result<Self, GossipServerError> {
        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || loop {
                thread::sleep(interval);
                if let Err(err) = job_queue.send(tick()) {
                    return GossipServerError::TimerFailed(err.to_string());
                }
            })
            .map_err(|err| GossipServerError::SetupError(err.to_string()))?;

        Ok(Self { thread_handle: Some(thread_handle) })
    }

    /// Joins the calling thread's execution to the execution of the timer
    pub fn join_handle(&mut self) -> JoinHandle<GossipServerError> {
        self.thread_handle.take().expect("timer joined twice")
    }
}
