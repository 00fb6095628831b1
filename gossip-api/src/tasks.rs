//! Payload bodies carried by task-related envelopes on the data channel

use common::types::{NodeId, TaskDescriptor, TaskId};
use serde::{Deserialize, Serialize};

/// The body of a `TaskAssign` envelope: a task handed to a remote assignee
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskAssignment {
    /// The node that owns the canonical task record
    pub owner_node: NodeId,
    /// The task id within the owner's table
    pub task_id: TaskId,
    /// The task body
    pub descriptor: TaskDescriptor,
}

/// The body of a `TaskResult` envelope: a terminal outcome reported to the
/// task's owner
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// The task id within the owner's table
    pub task_id: TaskId,
    /// The executor's exit code; zero means success
    pub exit_code: i32,
    /// The bounded result payload
    pub result: Vec<u8>,
}

