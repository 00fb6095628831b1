//! The handle through which local collaborators (the shell, the executor,
//! task bodies) drive the node

use common::types::{
    BlockId, BlockMetadata, LockId, LockInfo, NodeId, PeerRecord, TaskDescriptor, TaskId,
    TaskRecord,
};
use gossip_api::tasks::TaskOutcome;
use job_types::task_scheduler::{new_submission, TaskSchedulerJob, TaskSchedulerQueue};
use state::{error::StateError, State};

/// A cloneable facade over the node's collaborator interfaces
///
/// Submission and completion flow through the scheduler's queue so that all
/// scheduling decisions are serialized in its executor; memory and lock
/// operations go straight to their tables
#[derive(Clone)]
pub struct NodeHandle {
    /// The node-global state
    state: State,
    /// The scheduler's job queue
    scheduler_queue: TaskSchedulerQueue,
}

impl NodeHandle {
    /// Constructor
    pub fn new(state: State, scheduler_queue: TaskSchedulerQueue) -> Self {
        Self { state, scheduler_queue }
    }

    /// The local node's id
    pub fn node_id(&self) -> NodeId {
        self.state.local_node_id()
    }

    // ---------------
    // | Submit Path |
    // ---------------

    /// Submit a task for scheduling, returning its minted id
    ///
    /// The call waits for the scheduler to admit the task but never for a
    /// peer to become available; an unplaceable task parks as Pending
    pub fn submit(
        &self,
        description: impl Into<String>,
        priority: i32,
        payload: Vec<u8>,
    ) -> Result<TaskId, String> {
        let descriptor = TaskDescriptor::new(description, priority, payload);
        let (job, response) = new_submission(descriptor);

        self.scheduler_queue.send(job).map_err(|err| err.to_string())?;
        response.blocking_recv().map_err(|err| err.to_string())?
    }

    // ---------------
    // | Report Path |
    // ---------------

    /// The executor's ack that a task has begun running
    pub fn mark_running(&self, task_id: TaskId) -> Result<(), String> {
        self.scheduler_queue
            .send(TaskSchedulerJob::MarkRunning { task_id })
            .map_err(|err| err.to_string())
    }

    /// Report a terminal outcome for a locally owned task
    pub fn complete(&self, task_id: TaskId, exit_code: i32, result: Vec<u8>) -> Result<(), String> {
        self.scheduler_queue
            .send(TaskSchedulerJob::Complete { task_id, exit_code, result })
            .map_err(|err| err.to_string())
    }

    /// Report the outcome of a task this node executed on behalf of a remote
    /// owner; the result travels back over the data channel
    pub fn report_remote(
        &self,
        owner: NodeId,
        task_id: TaskId,
        exit_code: i32,
        result: Vec<u8>,
    ) -> Result<(), String> {
        let outcome = TaskOutcome { task_id, exit_code, result };
        self.scheduler_queue
            .send(TaskSchedulerJob::ReportOutcome { owner, outcome })
            .map_err(|err| err.to_string())
    }

    /// Look up a task's record
    pub fn task(&self, task_id: TaskId) -> Option<TaskRecord> {
        self.state.get_task(task_id)
    }

    // ----------------------
    // | Shared Memory Path |
    // ----------------------

    /// Allocate a zero-initialized block of the given size
    pub fn allocate(&self, size: usize) -> Result<BlockId, StateError> {
        self.state.allocate_block(size)
    }

    /// Write into a block at the given offset
    pub fn write(&self, block_id: BlockId, data: &[u8], offset: usize) -> Result<(), StateError> {
        self.state.write_block(block_id, data, offset)
    }

    /// Read from a block at the given offset
    pub fn read(&self, block_id: BlockId, buf: &mut [u8], offset: usize) -> Result<(), StateError> {
        self.state.read_block(block_id, buf, offset)
    }

    /// Record replica placement intent for a block
    pub fn record_replica(&self, block_id: BlockId, target: NodeId) -> Result<(), StateError> {
        self.state.record_replica(block_id, target)
    }

    /// Take an additional reference on a block
    pub fn retain(&self, block_id: BlockId) -> Result<(), StateError> {
        self.state.retain_block(block_id)
    }

    /// Drop a reference on a block, freeing it at zero
    pub fn release(&self, block_id: BlockId) -> Result<u32, StateError> {
        self.state.release_block(block_id)
    }

    /// A metadata snapshot for a block
    pub fn block_meta(&self, block_id: BlockId) -> Result<BlockMetadata, StateError> {
        self.state.block_meta(block_id)
    }

    // -------------
    // | Lock Path |
    // -------------

    /// Admit a named lock, idempotently
    pub fn create_or_get(&self, name: &str) -> Result<LockId, StateError> {
        self.state.create_or_get_lock(name)
    }

    /// Acquire a lock for a task, waiting at most `timeout_ms`; negative
    /// waits indefinitely
    pub fn acquire(&self, lock_id: LockId, task_id: TaskId, timeout_ms: i64) -> Result<(), StateError> {
        self.state.acquire_lock(lock_id, task_id, timeout_ms)
    }

    /// Release a lock held by the local node; a no-op otherwise
    pub fn release_lock(&self, lock_id: LockId) -> Result<(), StateError> {
        self.state.release_lock(lock_id)
    }

    /// An ownership snapshot for a lock
    pub fn lock_info(&self, lock_id: LockId) -> Result<LockInfo, StateError> {
        self.state.lock_info(lock_id)
    }

    // --------------
    // | Inspection |
    // --------------

    /// A point-in-time snapshot of the peer registry
    pub fn peers(&self) -> Vec<PeerRecord> {
        self.state.snapshot_peers()
    }

    /// The node's informational counters: (assigned, completed, failed,
    /// migrated)
    pub fn counters(&self) -> (u64, u64, u64, u64) {
        (
            self.state.total_assigned(),
            self.state.total_completed(),
            self.state.total_failed(),
            self.state.total_migrated(),
        )
    }
}
