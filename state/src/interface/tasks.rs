//! The interface for interacting with the scheduler's task table

use common::types::{NodeId, TaskDescriptor, TaskId, TaskRecord, TaskStatus};
use indexmap::IndexMap;
use tracing::warn;
use util::get_current_time_millis;

use crate::{error::StateError, StateInner};

/// The scheduler's table of tasks owned by or assigned to this node
pub struct TaskTable {
    /// The next task id to mint
    next_id: TaskId,
    /// The records, keyed by task id in submission order
    records: IndexMap<TaskId, TaskRecord>,
}

impl TaskTable {
    /// Constructor
    pub fn new() -> Self {
        Self { next_id: 1, records: IndexMap::new() }
    }
}

impl Default for TaskTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StateInner {
    // -----------
    // | Getters |
    // -----------

    /// Get a copy of a task's record
    pub fn get_task(&self, task_id: TaskId) -> Option<TaskRecord> {
        self.tasks.read().expect("task table poisoned").records.get(&task_id).cloned()
    }

    /// The number of tasks in the table
    pub fn n_tasks(&self) -> usize {
        self.tasks.read().expect("task table poisoned").records.len()
    }

    /// Produce a point-in-time snapshot of every task record
    pub fn snapshot_tasks(&self) -> Vec<TaskRecord> {
        self.tasks.read().expect("task table poisoned").records.values().cloned().collect()
    }

    // -----------
    // | Setters |
    // -----------

    /// Mint a new Pending task owned by the local node
    pub fn new_task(&self, descriptor: TaskDescriptor) -> Result<TaskId, StateError> {
        let mut table = self.tasks.write().expect("task table poisoned");
        if table.records.len() >= self.capacities().max_tasks {
            warn!("task table full, refusing submission");
            return Err(StateError::Capacity {
                table: "task",
                capacity: self.capacities().max_tasks,
            });
        }

        let task_id = table.next_id;
        table.next_id += 1;
        table.records.insert(task_id, TaskRecord::new(task_id, self.local_node_id(), descriptor));

        Ok(task_id)
    }

    /// Record a selected assignee, advancing the task to Assigned
    pub fn assign_task(&self, task_id: TaskId, assignee: NodeId) -> Result<(), StateError> {
        let mut table = self.tasks.write().expect("task table poisoned");
        let record = table.records.get_mut(&task_id).ok_or(StateError::NotFound(task_id))?;

        record.assigned_node = assignee;
        record.status = TaskStatus::Assigned;
        Ok(())
    }

    /// The executor's ack: advance Assigned to Running and stamp started_at
    pub fn mark_task_running(&self, task_id: TaskId) -> Result<(), StateError> {
        let mut table = self.tasks.write().expect("task table poisoned");
        let record = table.records.get_mut(&task_id).ok_or(StateError::NotFound(task_id))?;

        if record.status == TaskStatus::Assigned {
            record.status = TaskStatus::Running;
            record.started_at = get_current_time_millis();
        }
        Ok(())
    }

    /// Record a terminal outcome for a task
    ///
    /// Returns the updated record for the caller's reputation bookkeeping, or
    /// `None` when the task was already terminal so that a duplicate report
    /// updates nothing
    pub fn complete_task(
        &self,
        task_id: TaskId,
        exit_code: i32,
        result: Vec<u8>,
    ) -> Result<Option<TaskRecord>, StateError> {
        let mut table = self.tasks.write().expect("task table poisoned");
        let record = table.records.get_mut(&task_id).ok_or(StateError::NotFound(task_id))?;

        if record.status.is_terminal() {
            return Ok(None);
        }

        record.status =
            if exit_code == 0 { TaskStatus::Completed } else { TaskStatus::Failed };
        record.exit_code = exit_code;
        record.result = result;
        record.completed_at = get_current_time_millis();

        Ok(Some(record.clone()))
    }

    /// Begin a migration sweep for a failed assignee: every task assigned to
    /// the peer and not yet terminal enters the transient Migrating state
    ///
    /// Returns the affected ids; the caller re-selects for each and must
    /// advance every returned task out of Migrating within the same sweep
    pub fn begin_migration(&self, failed: NodeId) -> Vec<TaskId> {
        let mut table = self.tasks.write().expect("task table poisoned");
        let mut affected = Vec::new();

        for record in table.records.values_mut() {
            let in_flight =
                matches!(record.status, TaskStatus::Assigned | TaskStatus::Running);
            if record.assigned_node == failed && in_flight {
                record.status = TaskStatus::Migrating;
                affected.push(record.task_id);
            }
        }

        affected
    }

    /// Finish one task's migration
    ///
    /// With a replacement assignee the task moves to it; with none the task
    /// returns to Assigned on its original assignee, eligible for retry when
    /// the membership changes. Neither path resets started_at.
    pub fn finish_migration(
        &self,
        task_id: TaskId,
        replacement: Option<NodeId>,
    ) -> Result<(), StateError> {
        let mut table = self.tasks.write().expect("task table poisoned");
        let record = table.records.get_mut(&task_id).ok_or(StateError::NotFound(task_id))?;

        if let Some(assignee) = replacement {
            record.assigned_node = assignee;
        }
        record.status = TaskStatus::Assigned;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use common::types::{NodeId, TaskDescriptor, TaskStatus};

    use crate::{error::StateError, test_helpers::*, TableCapacities};

    /// A descriptor for test submissions
    fn descriptor() -> TaskDescriptor {
        TaskDescriptor::new("test-task", 5, Vec::new())
    }

    /// Tests minting and the initial Pending state
    #[test]
    fn test_new_task() {
        let state = mock_state();
        let task_id = state.new_task(descriptor()).unwrap();
        assert_eq!(task_id, 1);

        let record = state.get_task(task_id).unwrap();
        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(record.owner_node, LOCAL_ID);
        assert_eq!(record.assigned_node, NodeId::ZERO);
        assert!(record.created_at > 0);
        assert_eq!(record.completed_at, 0);
    }

    /// Tests that ids are monotonic across submissions
    #[test]
    fn test_task_ids_monotonic() {
        let state = mock_state();
        let a = state.new_task(descriptor()).unwrap();
        let b = state.new_task(descriptor()).unwrap();
        let c = state.new_task(descriptor()).unwrap();
        assert_eq!((a, b, c), (1, 2, 3));
    }

    /// Tests the table capacity refusal
    #[test]
    fn test_task_capacity() {
        let capacities = TableCapacities { max_tasks: 2, ..Default::default() };
        let state = mock_state_with_capacities(capacities);

        state.new_task(descriptor()).unwrap();
        state.new_task(descriptor()).unwrap();
        assert!(matches!(state.new_task(descriptor()), Err(StateError::Capacity { .. })));
    }

    /// Tests the full lifecycle to Completed, including completed_at
    #[test]
    fn test_lifecycle_to_completed() {
        let state = mock_state();
        let task_id = state.new_task(descriptor()).unwrap();

        state.assign_task(task_id, NodeId(2)).unwrap();
        assert_eq!(state.get_task(task_id).unwrap().status, TaskStatus::Assigned);

        state.mark_task_running(task_id).unwrap();
        let record = state.get_task(task_id).unwrap();
        assert_eq!(record.status, TaskStatus::Running);
        assert!(record.started_at > 0);

        let record = state.complete_task(task_id, 0, b"ok".to_vec()).unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert!(record.completed_at > 0);
        assert_eq!(record.result, b"ok");
    }

    /// Tests that a nonzero exit code lands in Failed
    #[test]
    fn test_nonzero_exit_fails() {
        let state = mock_state();
        let task_id = state.new_task(descriptor()).unwrap();
        state.assign_task(task_id, NodeId(2)).unwrap();

        let record = state.complete_task(task_id, 3, Vec::new()).unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.exit_code, 3);
    }

    /// Tests that a duplicate completion report updates nothing
    #[test]
    fn test_duplicate_completion_ignored() {
        let state = mock_state();
        let task_id = state.new_task(descriptor()).unwrap();
        state.assign_task(task_id, NodeId(2)).unwrap();
        state.complete_task(task_id, 0, b"first".to_vec()).unwrap().unwrap();

        assert!(state.complete_task(task_id, 1, b"second".to_vec()).unwrap().is_none());

        let record = state.get_task(task_id).unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.result, b"first");
    }

    /// Tests unknown-id handling across the setters
    #[test]
    fn test_unknown_task() {
        let state = mock_state();
        assert!(matches!(state.assign_task(99, NodeId(2)), Err(StateError::NotFound(99))));
        assert!(matches!(state.mark_task_running(99), Err(StateError::NotFound(99))));
        assert!(matches!(
            state.complete_task(99, 0, Vec::new()),
            Err(StateError::NotFound(99))
        ));
    }

    /// Tests the migration sweep's selection of in-flight tasks only
    #[test]
    fn test_begin_migration_scope() {
        let state = mock_state();
        let assigned = state.new_task(descriptor()).unwrap();
        let running = state.new_task(descriptor()).unwrap();
        let done = state.new_task(descriptor()).unwrap();
        let elsewhere = state.new_task(descriptor()).unwrap();

        state.assign_task(assigned, NodeId(2)).unwrap();
        state.assign_task(running, NodeId(2)).unwrap();
        state.mark_task_running(running).unwrap();
        state.assign_task(done, NodeId(2)).unwrap();
        state.complete_task(done, 0, Vec::new()).unwrap();
        state.assign_task(elsewhere, NodeId(3)).unwrap();

        let affected = state.begin_migration(NodeId(2));
        assert_eq!(affected, vec![assigned, running]);

        for task_id in affected {
            assert_eq!(state.get_task(task_id).unwrap().status, TaskStatus::Migrating);
        }
        assert_eq!(state.get_task(done).unwrap().status, TaskStatus::Completed);
        assert_eq!(state.get_task(elsewhere).unwrap().status, TaskStatus::Assigned);
    }

    /// Tests both arms of finish_migration
    #[test]
    fn test_finish_migration() {
        let state = mock_state();
        let moved = state.new_task(descriptor()).unwrap();
        let stranded = state.new_task(descriptor()).unwrap();
        state.assign_task(moved, NodeId(2)).unwrap();
        state.assign_task(stranded, NodeId(2)).unwrap();
        state.begin_migration(NodeId(2));

        state.finish_migration(moved, Some(NodeId(3))).unwrap();
        let record = state.get_task(moved).unwrap();
        assert_eq!(record.assigned_node, NodeId(3));
        assert_eq!(record.status, TaskStatus::Assigned);

        // No replacement: back to Assigned on the failed peer
        state.finish_migration(stranded, None).unwrap();
        let record = state.get_task(stranded).unwrap();
        assert_eq!(record.assigned_node, NodeId(2));
        assert_eq!(record.status, TaskStatus::Assigned);
    }
}
