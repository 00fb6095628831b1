//! The task scheduler executor: the job loop driving submission,
//! completion, and migration

use common::types::{CancelChannel, NodeId, TaskDescriptor, TaskId, TaskStatus};
use constants::MAX_PAYLOAD_SIZE;
use gossip_api::{
    message::{Envelope, MessageType},
    tasks::{TaskAssignment, TaskOutcome},
};
use job_types::{
    network_manager::{NetworkManagerJob, NetworkManagerQueue},
    task_scheduler::{AssignmentSender, SubmitResponseSender, TaskSchedulerJob, TaskSchedulerReceiver},
};
use state::State;
use tracing::{info, warn};
use util::{err_str, get_current_time_millis};

use crate::{errors::TaskSchedulerError, selection::select_best_node};

/// The executor runs in its own thread and owns the inbound job queue
pub struct TaskSchedulerExecutor {
    /// The node-global state
    pub(crate) state: State,
    /// The network manager's queue, for remote assignment envelopes
    pub(crate) network_sender: NetworkManagerQueue,
    /// Where inbound remote assignments are surfaced for the executor
    /// collaborator; dropped on the floor when unset
    pub(crate) assignment_sender: Option<AssignmentSender>,
    /// The queue of inbound jobs; taken by the execution loop
    pub(crate) job_receiver: Option<TaskSchedulerReceiver>,
    /// The channel on which the coordinator may cancel execution
    pub(crate) cancel_channel: Option<CancelChannel>,
}

impl TaskSchedulerExecutor {
    /// Constructor
    pub fn new(
        state: State,
        network_sender: NetworkManagerQueue,
        assignment_sender: Option<AssignmentSender>,
        job_receiver: TaskSchedulerReceiver,
        cancel_channel: CancelChannel,
    ) -> Self {
        Self {
            state,
            network_sender,
            assignment_sender,
            job_receiver: Some(job_receiver),
            cancel_channel: Some(cancel_channel),
        }
    }

    /// The main loop in which the executor processes jobs until cancelled
    pub async fn execution_loop(mut self) -> TaskSchedulerError {
        info!("starting executor loop for task scheduler...");
        let mut cancel_channel = self.cancel_channel.take().expect("cancel channel taken twice");
        let mut job_receiver = self.job_receiver.take().expect("job queue taken twice");

        loop {
            tokio::select! {
                Some(job) = job_receiver.recv() => {
                    if let Err(err) = self.handle_job(job) {
                        warn!("error handling scheduler job: {err}");
                    }
                },

                _ = cancel_channel.changed() => {
                    return TaskSchedulerError::Cancelled("received cancel signal".to_string());
                }
            }
        }
    }

    /// Dispatch a single job
    pub fn handle_job(&mut self, job: TaskSchedulerJob) -> Result<(), TaskSchedulerError> {
        match job {
            TaskSchedulerJob::Submit { descriptor, resp } => self.handle_submit(descriptor, resp),
            TaskSchedulerJob::MarkRunning { task_id } => self
                .state
                .mark_task_running(task_id)
                .map_err(err_str!(TaskSchedulerError::State)),
            TaskSchedulerJob::Complete { task_id, exit_code, result } => {
                self.handle_complete(task_id, exit_code, result)
            }
            TaskSchedulerJob::PeerFailed { node_id } => self.handle_peer_failed(node_id),
            TaskSchedulerJob::MembershipChanged => self.handle_membership_changed(),
            TaskSchedulerJob::InboundAssignment(assignment) => {
                self.handle_inbound_assignment(assignment)
            }
            TaskSchedulerJob::ReportOutcome { owner, outcome } => {
                self.report_outcome(owner, outcome)
            }
        }
    }

    // --------------
    // | Submission |
    // --------------

    /// Submit a task: mint the record and attempt an assignment
    ///
    /// Submission never blocks on peer availability; with no eligible
    /// candidate the task stays Pending until the membership changes
    fn handle_submit(
        &mut self,
        descriptor: TaskDescriptor,
        resp: Option<SubmitResponseSender>,
    ) -> Result<(), TaskSchedulerError> {
        let outcome = self.submit_task(descriptor);
        if let Some(channel) = resp {
            // The submitter may have given up waiting; that is not an error
            let _ = channel.send(outcome.clone().map_err(|err| err.to_string()));
        }

        outcome.map(|_| ()).map_err(err_str!(TaskSchedulerError::State))
    }

    /// Mint and try to assign a task, returning its id
    pub fn submit_task(
        &mut self,
        descriptor: TaskDescriptor,
    ) -> Result<TaskId, state::error::StateError> {
        if descriptor.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(state::error::StateError::OutOfBounds {
                offset: 0,
                len: descriptor.payload.len(),
                size: MAX_PAYLOAD_SIZE,
            });
        }

        let task_id = self.state.new_task(descriptor)?;
        self.try_assign(task_id, None);
        Ok(task_id)
    }

    /// Run selection for a task and record the result
    ///
    /// Returns the chosen assignee, if any; with none the task is left in
    /// its current state
    fn try_assign(&mut self, task_id: TaskId, exclude: Option<NodeId>) -> Option<NodeId> {
        let record = self.state.get_task(task_id)?;
        let snapshot = self.state.snapshot_peers();
        let now = get_current_time_millis();

        let chosen =
            select_best_node(&snapshot, record.descriptor.priority, exclude, now)?;

        if self.state.assign_task(task_id, chosen).is_err() {
            return None;
        }
        self.state.incr_assigned();
        info!("task {task_id} assigned to {chosen}");

        if chosen != self.state.local_node_id() {
            self.send_remote_assignment(task_id, chosen, MessageType::TaskAssign);
        }
        Some(chosen)
    }

    /// Ship an assignment to a remote assignee's data port; migrations are
    /// tagged `TaskMigrate` so the assignee can tell a hand-off from a fresh
    /// submission
    ///
    /// Best effort: a refusal here leaves the task Assigned and is retried
    /// through migration if the assignee is later reaped
    fn send_remote_assignment(&mut self, task_id: TaskId, assignee: NodeId, tag: MessageType) {
        let Some(task) = self.state.get_task(task_id) else {
            return;
        };
        let Some(peer) = self.state.get_peer(assignee) else {
            return;
        };

        let assignment = TaskAssignment {
            owner_node: self.state.local_node_id(),
            task_id,
            descriptor: task.descriptor,
        };
        let body = match bincode::serialize(&assignment) {
            Ok(body) => body,
            Err(err) => {
                warn!("failed serializing assignment for task {task_id}: {err}");
                return;
            }
        };

        match Envelope::new(tag, self.state.local_node_id(), body) {
            Ok(envelope) => {
                if let Err(err) = self
                    .network_sender
                    .send(NetworkManagerJob::SendDirect { addr: peer.address, envelope })
                {
                    warn!("failed enqueuing assignment for task {task_id}: {err}");
                }
            }
            Err(err) => warn!("assignment for task {task_id} exceeds envelope capacity: {err}"),
        }
    }

    // --------------
    // | Completion |
    // --------------

    /// Record a terminal outcome and update the executing peer's reputation
    ///
    /// The reputation delta lands even when the executing peer has since
    /// been marked Failed; a duplicate report changes nothing
    fn handle_complete(
        &mut self,
        task_id: TaskId,
        exit_code: i32,
        result: Vec<u8>,
    ) -> Result<(), TaskSchedulerError> {
        let updated = self
            .state
            .complete_task(task_id, exit_code, result)
            .map_err(err_str!(TaskSchedulerError::State))?;

        let Some(record) = updated else {
            return Ok(());
        };

        let success = record.status == TaskStatus::Completed;
        if success {
            self.state.incr_completed();
        } else {
            self.state.incr_failed();
        }

        if !record.assigned_node.is_zero() {
            self.state.apply_task_outcome(record.assigned_node, success);
        }

        info!(
            "task {task_id} finished with exit code {exit_code} on {}",
            record.assigned_node,
        );
        Ok(())
    }

    // -------------
    // | Migration |
    // -------------

    /// Migrate every in-flight task off a failed peer
    ///
    /// Each affected task passes through Migrating and leaves it within this
    /// sweep: either re-assigned to the best remaining candidate, or parked
    /// as Assigned on the failed peer until the membership changes
    fn handle_peer_failed(&mut self, failed: NodeId) -> Result<(), TaskSchedulerError> {
        let affected = self.state.begin_migration(failed);
        if affected.is_empty() {
            return Ok(());
        }
        info!("migrating {} task(s) off failed peer {failed}", affected.len());

        for task_id in affected {
            let replacement = self.select_replacement(task_id, failed);
            self.state
                .finish_migration(task_id, replacement)
                .map_err(err_str!(TaskSchedulerError::State))?;

            match replacement {
                Some(assignee) => {
                    self.state.incr_migrated();
                    info!("task {task_id} migrated to {assignee}");
                    if assignee != self.state.local_node_id() {
                        self.send_remote_assignment(task_id, assignee, MessageType::TaskMigrate);
                    }
                }
                None => {
                    warn!("no replacement for task {task_id}, leaving on {failed}");
                }
            }
        }

        Ok(())
    }

    /// Re-run selection for a migrating task, excluding its failed assignee
    fn select_replacement(&self, task_id: TaskId, failed: NodeId) -> Option<NodeId> {
        let record = self.state.get_task(task_id)?;
        let snapshot = self.state.snapshot_peers();
        select_best_node(
            &snapshot,
            record.descriptor.priority,
            Some(failed),
            get_current_time_millis(),
        )
    }

    /// Retry Pending tasks and tasks stranded on failed peers after the
    /// registry gained an eligible candidate
    fn handle_membership_changed(&mut self) -> Result<(), TaskSchedulerError> {
        let snapshot = self.state.snapshot_peers();
        let failed_assignees: Vec<NodeId> = snapshot
            .iter()
            .filter(|record| record.status == common::types::PeerStatus::Failed)
            .map(|record| record.node_id)
            .collect();

        for task in self.state.snapshot_tasks() {
            match task.status {
                TaskStatus::Pending => {
                    self.try_assign(task.task_id, None);
                }
                TaskStatus::Assigned if failed_assignees.contains(&task.assigned_node) => {
                    // A stranded task's late re-assignment completes its
                    // deferred migration
                    if let Some(assignee) = self.try_assign(task.task_id, Some(task.assigned_node))
                    {
                        self.state.incr_migrated();
                        info!("stranded task {} re-assigned to {assignee}", task.task_id);
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }

    // -----------------------
    // | Inbound Assignments |
    // -----------------------

    /// Surface a remote owner's assignment to the executor collaborator
    fn handle_inbound_assignment(
        &mut self,
        assignment: TaskAssignment,
    ) -> Result<(), TaskSchedulerError> {
        info!(
            "received task {} from owner {}",
            assignment.task_id, assignment.owner_node,
        );

        match &self.assignment_sender {
            Some(sink) => sink
                .send(assignment)
                .map_err(err_str!(TaskSchedulerError::SendMessage)),
            None => {
                warn!("no executor attached, dropping inbound assignment");
                Ok(())
            }
        }
    }

    /// Build and enqueue a `TaskResult` envelope for a remotely owned task;
    /// the executor collaborator's report path for work it ran on behalf of
    /// a peer
    fn report_outcome(
        &mut self,
        owner: NodeId,
        outcome: TaskOutcome,
    ) -> Result<(), TaskSchedulerError> {
        let Some(peer) = self.state.get_peer(owner) else {
            warn!("owner {owner} unknown, dropping outcome for task {}", outcome.task_id);
            return Ok(());
        };

        let body = bincode::serialize(&outcome)
            .map_err(err_str!(TaskSchedulerError::Serialize))?;
        let envelope = Envelope::new(MessageType::TaskResult, self.state.local_node_id(), body)
            .map_err(err_str!(TaskSchedulerError::Serialize))?;

        self.network_sender
            .send(NetworkManagerJob::SendDirect { addr: peer.address, envelope })
            .map_err(err_str!(TaskSchedulerError::SendMessage))
    }
}

#[cfg(test)]
mod test {
    use common::types::{
        new_cancel_channel, NodeId, PeerRecord, PeerStatus, TaskDescriptor, TaskStatus,
    };
    use job_types::{
        network_manager::{new_network_manager_queue, NetworkManagerJob, NetworkManagerReceiver},
        task_scheduler::{new_assignment_channel, new_task_scheduler_queue, TaskSchedulerJob},
    };
    use gossip_api::tasks::TaskAssignment;
    use state::State;
    use util::get_current_time_millis;

    use super::TaskSchedulerExecutor;

    /// The local node id used in the executor tests
    const LOCAL_ID: NodeId = NodeId(1);

    /// Build an executor around a fresh state
    fn mock_executor() -> (TaskSchedulerExecutor, NetworkManagerReceiver) {
        let state = State::new_with_defaults(
            LOCAL_ID,
            "local".to_string(),
            "127.0.0.1:8889".parse().unwrap(),
        );
        let (_job_sender, job_receiver) = new_task_scheduler_queue();
        let (network_sender, network_receiver) = new_network_manager_queue();
        let (_cancel_sender, cancel_receiver) = new_cancel_channel();

        let executor = TaskSchedulerExecutor::new(
            state,
            network_sender,
            None,
            job_receiver,
            cancel_receiver,
        );
        (executor, network_receiver)
    }

    /// A fresh Active peer with the given counters
    fn peer(id: u64, cpu: f32, mem: f32, rep: f32) -> PeerRecord {
        PeerRecord {
            node_id: NodeId(id),
            host_name: format!("peer-{id}"),
            address: format!("192.168.1.{id}:8889").parse().unwrap(),
            cpu_load: cpu,
            memory_usage: mem,
            reputation: rep,
            tasks_completed: 0,
            tasks_failed: 0,
            status: PeerStatus::Active,
            last_seen: get_current_time_millis(),
            is_local: false,
        }
    }

    /// A plain descriptor at the given priority
    fn descriptor(priority: i32) -> TaskDescriptor {
        TaskDescriptor::new("test-task", priority, Vec::new())
    }

    /// Tests single-node submission: the local node wins by default and the
    /// completion updates its reputation
    #[test]
    fn test_single_node_assignment() {
        let (mut executor, _network) = mock_executor();

        let task_id = executor.submit_task(descriptor(5)).unwrap();
        assert_eq!(task_id, 1);

        let record = executor.state.get_task(task_id).unwrap();
        assert_eq!(record.status, TaskStatus::Assigned);
        assert_eq!(record.assigned_node, LOCAL_ID);
        assert_eq!(executor.state.total_assigned(), 1);

        executor
            .handle_job(TaskSchedulerJob::Complete {
                task_id,
                exit_code: 0,
                result: b"ok".to_vec(),
            })
            .unwrap();

        let record = executor.state.get_task(task_id).unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert!(record.completed_at > 0);

        let local = executor.state.local_peer();
        assert!(local.reputation > 0.5 && local.reputation <= 1.0);
        assert_eq!(executor.state.total_completed(), 1);
    }

    /// Tests that the better-scored of two peers wins the assignment
    #[test]
    fn test_two_node_scoring() {
        let (mut executor, _network) = mock_executor();
        // Sideline the local node so the two seeded peers compete
        executor.state.set_peer_status(LOCAL_ID, PeerStatus::Busy);
        executor.state.insert_peer_record(peer(2, 0.1, 0.1, 0.9)).unwrap();
        executor.state.insert_peer_record(peer(3, 0.9, 0.9, 0.5)).unwrap();

        let task_id = executor.submit_task(descriptor(5)).unwrap();
        assert_eq!(executor.state.get_task(task_id).unwrap().assigned_node, NodeId(2));
    }

    /// Tests that a remote assignment ships an envelope to the assignee
    #[test]
    fn test_remote_assignment_sends_envelope() {
        let (mut executor, mut network) = mock_executor();
        executor.state.set_peer_status(LOCAL_ID, PeerStatus::Busy);
        executor.state.insert_peer_record(peer(2, 0.1, 0.1, 0.9)).unwrap();

        let task_id = executor.submit_task(descriptor(5)).unwrap();

        let job = network.try_recv().unwrap();
        let NetworkManagerJob::SendDirect { addr, envelope } = job else {
            panic!("expected a direct send");
        };
        assert_eq!(addr.to_string(), "192.168.1.2:8889");

        let assignment: TaskAssignment = bincode::deserialize(&envelope.payload).unwrap();
        assert_eq!(assignment.task_id, task_id);
        assert_eq!(assignment.owner_node, LOCAL_ID);
    }

    /// Tests that a submission with no eligible candidate parks as Pending,
    /// then assigns on the next membership change
    #[test]
    fn test_pending_until_membership_change() {
        let (mut executor, _network) = mock_executor();
        executor.state.set_peer_status(LOCAL_ID, PeerStatus::Busy);

        let task_id = executor.submit_task(descriptor(5)).unwrap();
        assert_eq!(executor.state.get_task(task_id).unwrap().status, TaskStatus::Pending);
        assert_eq!(executor.state.total_assigned(), 0);

        executor.state.insert_peer_record(peer(2, 0.1, 0.1, 0.9)).unwrap();
        executor.handle_job(TaskSchedulerJob::MembershipChanged).unwrap();

        let record = executor.state.get_task(task_id).unwrap();
        assert_eq!(record.status, TaskStatus::Assigned);
        assert_eq!(record.assigned_node, NodeId(2));
    }

    /// Tests migration of every in-flight task off a failed peer
    #[test]
    fn test_failure_migration() {
        let (mut executor, _network) = mock_executor();
        executor.state.set_peer_status(LOCAL_ID, PeerStatus::Busy);
        // The doomed peer far outscores the alternative, taking all tasks
        executor.state.insert_peer_record(peer(2, 0.05, 0.05, 0.95)).unwrap();
        executor.state.insert_peer_record(peer(3, 0.6, 0.6, 0.4)).unwrap();

        let mut task_ids = Vec::new();
        for _ in 0..3 {
            task_ids.push(executor.submit_task(descriptor(5)).unwrap());
        }
        for &task_id in &task_ids {
            assert_eq!(executor.state.get_task(task_id).unwrap().assigned_node, NodeId(2));
        }

        executor.state.set_peer_status(NodeId(2), PeerStatus::Failed);
        executor.handle_job(TaskSchedulerJob::PeerFailed { node_id: NodeId(2) }).unwrap();

        for &task_id in &task_ids {
            let record = executor.state.get_task(task_id).unwrap();
            assert_eq!(record.status, TaskStatus::Assigned);
            assert_eq!(record.assigned_node, NodeId(3));
        }
        assert_eq!(executor.state.total_migrated(), 3);
    }

    /// Tests migration with no alternative: tasks stay Assigned on the
    /// failed peer and the counter is untouched
    #[test]
    fn test_migration_without_replacement() {
        let (mut executor, _network) = mock_executor();
        executor.state.set_peer_status(LOCAL_ID, PeerStatus::Busy);
        executor.state.insert_peer_record(peer(2, 0.1, 0.1, 0.9)).unwrap();

        let task_id = executor.submit_task(descriptor(5)).unwrap();
        executor.state.mark_task_running(task_id).unwrap();

        executor.state.set_peer_status(NodeId(2), PeerStatus::Failed);
        executor.handle_job(TaskSchedulerJob::PeerFailed { node_id: NodeId(2) }).unwrap();

        let record = executor.state.get_task(task_id).unwrap();
        assert_eq!(record.status, TaskStatus::Assigned);
        assert_eq!(record.assigned_node, NodeId(2));
        assert_eq!(executor.state.total_migrated(), 0);

        // A recovered candidate picks the stranded task up
        executor.state.insert_peer_record(peer(3, 0.2, 0.2, 0.8)).unwrap();
        executor.handle_job(TaskSchedulerJob::MembershipChanged).unwrap();

        let record = executor.state.get_task(task_id).unwrap();
        assert_eq!(record.assigned_node, NodeId(3));
        assert_eq!(executor.state.total_migrated(), 1);
    }

    /// Tests that a failed outcome penalizes reputation even after the
    /// executing peer was itself marked Failed
    #[test]
    fn test_outcome_lands_on_failed_peer() {
        let (mut executor, _network) = mock_executor();
        executor.state.set_peer_status(LOCAL_ID, PeerStatus::Busy);
        executor.state.insert_peer_record(peer(2, 0.1, 0.1, 0.5)).unwrap();

        let task_id = executor.submit_task(descriptor(5)).unwrap();
        executor.state.set_peer_status(NodeId(2), PeerStatus::Failed);

        executor
            .handle_job(TaskSchedulerJob::Complete { task_id, exit_code: 2, result: Vec::new() })
            .unwrap();

        let record = executor.state.get_peer(NodeId(2)).unwrap();
        assert!(record.reputation < 0.5);
        assert_eq!(record.tasks_failed, 1);
        assert_eq!(executor.state.total_failed(), 1);
    }

    /// Tests that a remote owner's outcome report ships a result envelope
    /// to the owner's data port
    #[test]
    fn test_report_remote_outcome() {
        let (mut executor, mut network) = mock_executor();
        executor.state.insert_peer_record(peer(9, 0.1, 0.1, 0.9)).unwrap();

        executor
            .handle_job(TaskSchedulerJob::ReportOutcome {
                owner: NodeId(9),
                outcome: gossip_api::tasks::TaskOutcome {
                    task_id: 12,
                    exit_code: 0,
                    result: b"done".to_vec(),
                },
            })
            .unwrap();

        let job = network.try_recv().unwrap();
        let NetworkManagerJob::SendDirect { addr, envelope } = job else {
            panic!("expected a direct send");
        };
        assert_eq!(addr.to_string(), "192.168.1.9:8889");
        assert_eq!(envelope.msg_type, gossip_api::message::MessageType::TaskResult);
    }

    /// Tests that inbound assignments surface on the collaborator channel
    #[test]
    fn test_inbound_assignment_surfaces() {
        let (mut executor, _network) = mock_executor();
        let (sink, receiver) = new_assignment_channel();
        executor.assignment_sender = Some(sink);

        let assignment = TaskAssignment {
            owner_node: NodeId(9),
            task_id: 4,
            descriptor: descriptor(5),
        };
        executor
            .handle_job(TaskSchedulerJob::InboundAssignment(assignment))
            .unwrap();

        let received = receiver.try_recv().unwrap();
        assert_eq!(received.task_id, 4);
        assert_eq!(received.owner_node, NodeId(9));
    }
}
