use crate::error::LifecycleError;

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering as AtomicOrdering};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Start/stop contract shared by long-lived components.
pub trait Lifecycle {
  /// Moves the component to running. A second call is a no-op.
  fn start(&self) -> Result<(), LifecycleError>;

  /// Stops gracefully, resolving once the component is fully stopped.
  fn stop(&self) -> impl Future<Output = ()> + Send;

  fn is_running(&self) -> bool;
}

/// Executor lifecycle: `New -> Running -> Stopping -> Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExecutorState {
  New = 0,
  Running = 1,
  Stopping = 2,
  Terminated = 3,
}

impl ExecutorState {
  fn from_u8(value: u8) -> Self {
    match value {
      0 => ExecutorState::New,
      1 => ExecutorState::Running,
      2 => ExecutorState::Stopping,
      _ => ExecutorState::Terminated,
    }
  }
}

impl fmt::Display for ExecutorState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      ExecutorState::New => "NEW",
      ExecutorState::Running => "RUNNING",
      ExecutorState::Stopping => "STOPPING",
      ExecutorState::Terminated => "TERMINATED",
    };
    f.write_str(label)
  }
}

/// Outcome of asking the controller to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopRole {
  /// This caller performed the transition out of `from` and must finish it.
  Driver { from: ExecutorState },
  /// Another caller is driving, or already drove, the shutdown.
  Follower,
}

/// Atomic state machine gating submission and shutdown.
#[derive(Debug)]
pub(crate) struct LifecycleController {
  state: AtomicU8,
  terminated: CancellationToken,
}

impl LifecycleController {
  pub(crate) fn new() -> Self {
    Self {
      state: AtomicU8::new(ExecutorState::New as u8),
      terminated: CancellationToken::new(),
    }
  }

  pub(crate) fn state(&self) -> ExecutorState {
    ExecutorState::from_u8(self.state.load(AtomicOrdering::Acquire))
  }

  pub(crate) fn is_running(&self) -> bool {
    self.state() == ExecutorState::Running
  }

  /// `New -> Running`. Returns `Ok(true)` if this call made the transition,
  /// `Ok(false)` if the executor was already running.
  pub(crate) fn try_start(&self) -> Result<bool, LifecycleError> {
    match self.transition(ExecutorState::New, ExecutorState::Running) {
      Ok(()) => Ok(true),
      Err(ExecutorState::Running) => Ok(false),
      Err(from) => Err(LifecycleError::InvalidTransition { from }),
    }
  }

  /// `New | Running -> Stopping`. Exactly one caller becomes the driver.
  pub(crate) fn begin_stop(&self) -> StopRole {
    let mut current = self.state();
    loop {
      match current {
        ExecutorState::New | ExecutorState::Running => match self.transition(current, ExecutorState::Stopping) {
          Ok(()) => return StopRole::Driver { from: current },
          Err(observed) => current = observed,
        },
        ExecutorState::Stopping | ExecutorState::Terminated => return StopRole::Follower,
      }
    }
  }

  /// `Stopping -> Terminated`, releasing everyone waiting on termination.
  pub(crate) fn mark_terminated(&self) {
    self.state.store(ExecutorState::Terminated as u8, AtomicOrdering::Release);
    self.terminated.cancel();
  }

  pub(crate) async fn wait_terminated(&self) {
    self.terminated.cancelled().await;
  }

  fn transition(&self, from: ExecutorState, to: ExecutorState) -> Result<(), ExecutorState> {
    match self
      .state
      .compare_exchange(from as u8, to as u8, AtomicOrdering::AcqRel, AtomicOrdering::Acquire)
    {
      Ok(_) => {
        debug!(%from, %to, "Lifecycle transition.");
        Ok(())
      }
      Err(observed) => Err(ExecutorState::from_u8(observed)),
    }
  }
}
