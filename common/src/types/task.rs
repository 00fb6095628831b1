//! Task identifiers, descriptors, and scheduler table records

use constants::{TASK_PRIORITY_MAX, TASK_PRIORITY_MIN};
use serde::{Deserialize, Serialize};

use super::NodeId;

/// A task identifier; a local-monotonic counter unique within the minting
/// node's lifetime, globally disambiguated by the pair (owner node, task id)
pub type TaskId = u64;

/// The lifecycle state of a task in the scheduler table
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Submitted, no eligible assignee yet
    Pending,
    /// An assignee has been selected
    Assigned,
    /// The assignee acknowledged and is executing
    Running,
    /// Terminal, the task finished successfully
    Completed,
    /// Terminal, the task finished unsuccessfully
    Failed,
    /// Transient state while the scheduler re-selects after an assignee
    /// failure; must advance within one migration sweep
    Migrating,
}

impl TaskStatus {
    /// Whether the status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// The submitter-provided description of a task, carried on the wire when a
/// task is assigned to a remote peer
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// A short human-readable description of the task
    pub description: String,
    /// The task's priority, clamped into [1, 10] at submission
    pub priority: i32,
    /// The bounded input payload; execution of the payload is the executor
    /// collaborator's responsibility
    pub payload: Vec<u8>,
}

impl TaskDescriptor {
    /// Constructor; clamps the priority into the admissible band
    pub fn new(description: impl Into<String>, priority: i32, payload: Vec<u8>) -> Self {
        Self {
            description: description.into(),
            priority: priority.clamp(TASK_PRIORITY_MIN, TASK_PRIORITY_MAX),
            payload,
        }
    }
}

/// A scheduler table entry for a single task
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskRecord {
    /// The task's id, minted by the owner node
    pub task_id: TaskId,
    /// The node the task was submitted on; holds the canonical record
    pub owner_node: NodeId,
    /// The node currently selected to execute the task
    pub assigned_node: NodeId,
    /// The submitter's description of the task
    pub descriptor: TaskDescriptor,
    /// The task's lifecycle state
    pub status: TaskStatus,
    /// Wall timestamp of submission, unix millis
    pub created_at: u64,
    /// Wall timestamp of the executor's ack, unix millis; zero until set
    pub started_at: u64,
    /// Wall timestamp of the terminal transition, unix millis; zero until set
    pub completed_at: u64,
    /// The bounded result payload reported at completion
    pub result: Vec<u8>,
    /// The exit code reported at completion
    pub exit_code: i32,
}

impl TaskRecord {
    /// Create a freshly submitted record in the Pending state
    pub fn new(task_id: TaskId, owner_node: NodeId, descriptor: TaskDescriptor) -> Self {
        Self {
            task_id,
            owner_node,
            assigned_node: NodeId::ZERO,
            descriptor,
            status: TaskStatus::Pending,
            created_at: util::get_current_time_millis(),
            started_at: 0,
            completed_at: 0,
            result: Vec::new(),
            exit_code: 0,
        }
    }
}

#[cfg(test)]
mod test {
    use super::TaskDescriptor;

    /// Tests that out-of-band priorities are clamped at construction
    #[test]
    fn test_priority_clamp() {
        assert_eq!(TaskDescriptor::new("low", -3, Vec::new()).priority, 1);
        assert_eq!(TaskDescriptor::new("high", 99, Vec::new()).priority, 10);
        assert_eq!(TaskDescriptor::new("mid", 5, Vec::new()).priority, 5);
    }
}
