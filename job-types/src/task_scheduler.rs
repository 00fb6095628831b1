//! Job types for the task scheduler

use common::types::{NodeId, TaskDescriptor, TaskId};
use crossbeam::channel::{
    unbounded as crossbeam_unbounded, Receiver as CrossbeamReceiver, Sender as CrossbeamSender,
};
use gossip_api::tasks::{TaskAssignment, TaskOutcome};
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver as TokioReceiver, UnboundedSender as TokioSender},
    oneshot::{channel as oneshot_channel, Receiver as OneshotReceiver, Sender as OneshotSender},
};

/// The queue sender type to send jobs to the task scheduler
pub type TaskSchedulerQueue = TokioSender<TaskSchedulerJob>;
/// The queue receiver type to receive jobs for the task scheduler
pub type TaskSchedulerReceiver = TokioReceiver<TaskSchedulerJob>;
/// The sender type of a submission response channel
pub type SubmitResponseSender = OneshotSender<Result<TaskId, String>>;
/// The receiver type of a submission response channel
pub type SubmitResponseReceiver = OneshotReceiver<Result<TaskId, String>>;
/// The sender side of the inbound-assignment channel consumed by the
/// executor collaborator
pub type AssignmentSender = CrossbeamSender<TaskAssignment>;
/// The receiver side of the inbound-assignment channel
pub type AssignmentReceiver = CrossbeamReceiver<TaskAssignment>;

/// Create a new task scheduler queue
pub fn new_task_scheduler_queue() -> (TaskSchedulerQueue, TaskSchedulerReceiver) {
    unbounded_channel()
}

/// Create a new inbound-assignment channel
pub fn new_assignment_channel() -> (AssignmentSender, AssignmentReceiver) {
    crossbeam_unbounded()
}

/// Create a submission job paired with the channel its task id resolves on
pub fn new_submission(descriptor: TaskDescriptor) -> (TaskSchedulerJob, SubmitResponseReceiver) {
    let (sender, receiver) = oneshot_channel();
    (TaskSchedulerJob::Submit { descriptor, resp: Some(sender) }, receiver)
}

/// The job type for the task scheduler
#[derive(Debug)]
pub enum TaskSchedulerJob {
    /// Submit a task from the local node
    Submit {
        /// The task body
        descriptor: TaskDescriptor,
        /// The channel on which to resolve the minted task id
        resp: Option<SubmitResponseSender>,
    },
    /// The executor's ack advancing a task from Assigned to Running
    MarkRunning {
        /// The task acknowledged by its executor
        task_id: TaskId,
    },
    /// A terminal outcome for a locally owned task, reported by the executor
    /// collaborator or decoded from an inbound `TaskResult` envelope
    Complete {
        /// The finished task
        task_id: TaskId,
        /// The executor's exit code; zero means success
        exit_code: i32,
        /// The bounded result payload
        result: Vec<u8>,
    },
    /// The failure detector declared a peer dead; migrate its tasks
    PeerFailed {
        /// The failed peer
        node_id: NodeId,
    },
    /// The registry gained a peer or saw one return to Active; retry
    /// Pending and stranded tasks
    MembershipChanged,
    /// A remote owner assigned a task to this node
    InboundAssignment(TaskAssignment),
    /// Report a remotely owned task's outcome back to its owner over the
    /// data channel
    ReportOutcome {
        /// The node owning the canonical task record
        owner: NodeId,
        /// The terminal outcome to deliver
        outcome: TaskOutcome,
    },
}
