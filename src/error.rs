use crate::lifecycle::ExecutorState;
use crate::task::{Task, TaskId};

use thiserror::Error;

/// Why a submission was turned away.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
  #[error("executor has not been started")]
  NotStarted,

  #[error("executor is shutting down")]
  ShuttingDown,

  #[error("executor is terminated")]
  Terminated,

  #[error("task queue is full (capacity {capacity})")]
  QueueFull { capacity: usize },
}

impl RejectionReason {
  pub(crate) fn for_state(state: ExecutorState) -> Self {
    match state {
      ExecutorState::New => RejectionReason::NotStarted,
      ExecutorState::Running | ExecutorState::Stopping => RejectionReason::ShuttingDown,
      ExecutorState::Terminated => RejectionReason::Terminated,
    }
  }
}

/// Returned by `submit` when a task is not accepted.
///
/// The rejected task is handed back untouched, so the caller decides whether
/// to retry, run it elsewhere or drop it.
#[derive(Error, Debug)]
#[error("Task {} ({}) rejected: {reason}", task.id(), task.name())]
pub struct RejectedSubmission {
  reason: RejectionReason,
  task: Task,
}

impl RejectedSubmission {
  pub(crate) fn new(reason: RejectionReason, task: Task) -> Self {
    Self { reason, task }
  }

  pub fn reason(&self) -> RejectionReason {
    self.reason
  }

  pub fn task_id(&self) -> TaskId {
    self.task.id()
  }

  pub fn task(&self) -> &Task {
    &self.task
  }

  pub fn into_task(self) -> Task {
    self.task
  }
}

/// Errors raised by lifecycle transitions.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
  #[error("Executor cannot be started from state {from}")]
  InvalidTransition { from: ExecutorState },
}
