//! Implements the `Worker` trait for the task scheduler

use std::thread::{Builder, JoinHandle};

use common::{types::CancelChannel, worker::Worker};
use job_types::{
    network_manager::NetworkManagerQueue,
    task_scheduler::{AssignmentSender, TaskSchedulerReceiver},
};
use state::State;
use tokio::runtime::Builder as RuntimeBuilder;

use crate::{errors::TaskSchedulerError, manager::TaskSchedulerExecutor};

/// The configuration passed from the coordinator to the task scheduler
pub struct TaskSchedulerConfig {
    /// The node-global state
    pub state: State,
    /// The queue on which to receive jobs
    pub job_receiver: Option<TaskSchedulerReceiver>,
    /// The network manager's queue, for remote assignment envelopes
    pub network_sender: NetworkManagerQueue,
    /// Where inbound remote assignments are surfaced for the executor
    /// collaborator
    pub assignment_sender: Option<AssignmentSender>,
    /// The channel on which the coordinator may mandate that the scheduler
    /// cancel its execution
    pub cancel_channel: CancelChannel,
}

/// The task scheduler worker
pub struct TaskScheduler {
    /// The executor, present between construction and start
    executor: Option<TaskSchedulerExecutor>,
    /// The join handle of the executor thread
    executor_handle: Option<JoinHandle<TaskSchedulerError>>,
}

impl Worker for TaskScheduler {
    type WorkerConfig = TaskSchedulerConfig;
    type Error = TaskSchedulerError;

    fn new(mut config: Self::WorkerConfig) -> Result<Self, Self::Error> {
        let executor = TaskSchedulerExecutor::new(
            config.state.clone(),
            config.network_sender.clone(),
            config.assignment_sender.take(),
            config.job_receiver.take().expect("job receiver missing"),
            config.cancel_channel.clone(),
        );

        Ok(Self { executor: Some(executor), executor_handle: None })
    }

    fn name(&self) -> String {
        "task-scheduler".to_string()
    }

    fn is_recoverable(&self) -> bool {
        false
    }

    fn start(&mut self) -> Result<(), Self::Error> {
        let executor = self.executor.take().expect("executor started twice");
        let executor_handle = Builder::new()
            .name("task-scheduler-executor".to_string())
            .spawn(move || {
                let runtime = RuntimeBuilder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("building scheduler runtime");
                runtime.block_on(executor.execution_loop())
            })
            .map_err(|err| TaskSchedulerError::SetupError(err.to_string()))?;

        self.executor_handle = Some(executor_handle);
        Ok(())
    }

    fn join(&mut self) -> Vec<JoinHandle<Self::Error>> {
        vec![self.executor_handle.take().expect("joined twice")]
    }

    fn cleanup(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
