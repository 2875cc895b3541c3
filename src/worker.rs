use crate::action::{scoped_execute, ActionResult};
use crate::error::LifecycleError;
use crate::notifier::{CompletionNotifier, InternalCompletionMessage, TaskCompletionStatus};
use crate::stats::StatsRecorder;
use crate::task::{Priority, Task, TaskId};
use crate::task_queue::PriorityTaskQueue;

use dashmap::DashMap;
use fibre::mpsc::AsyncSender;
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::runtime::Handle as TokioHandle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

/// A task currently being executed by a worker.
#[derive(Debug, Clone)]
pub struct RunningTaskInfo {
  pub task_id: TaskId,
  pub task_name: Arc<str>,
  pub priority: Priority,
  pub worker_id: usize,
}

#[derive(Debug)]
pub(crate) struct RunningTask {
  pub(crate) info: RunningTaskInfo,
  pub(crate) token: CancellationToken,
}

/// Everything the workers of one pool share.
#[derive(Debug)]
pub(crate) struct PoolShared {
  pub(crate) pool_name: Arc<String>,
  pub(crate) queue: Arc<PriorityTaskQueue>,
  pub(crate) stats: Arc<StatsRecorder>,
  pub(crate) running: Arc<DashMap<TaskId, RunningTask>>,
  /// Cancelled by `shutdown_now`. Every running task holds a child token.
  pub(crate) interrupt: CancellationToken,
  pub(crate) notifier: Arc<CompletionNotifier>,
}

/// One worker loop: take, execute, record, repeat.
struct Worker {
  id: usize,
  shared: Arc<PoolShared>,
  completion_tx: AsyncSender<InternalCompletionMessage>,
}

impl Worker {
  async fn run(self) {
    info!(pool_name = %*self.shared.pool_name, worker_id = self.id, "Worker started.");

    while let Some(task) = self.shared.queue.take().await {
      self.execute(task).await;
    }

    info!(pool_name = %*self.shared.pool_name, worker_id = self.id, "Task queue closed and empty. Worker stopped.");
  }

  async fn execute(&self, task: Task) {
    let task_id = task.id();
    let token = self.shared.interrupt.child_token();
    self.shared.running.insert(
      task_id,
      RunningTask {
        info: RunningTaskInfo {
          task_id,
          task_name: task.shared_name(),
          priority: task.priority(),
          worker_id: self.id,
        },
        token: token.clone(),
      },
    );
    self.shared.stats.record_started();
    debug!(
      pool_name = %*self.shared.pool_name,
      worker_id = self.id,
      %task_id,
      task_name = task.name(),
      priority = %task.priority(),
      "Executing task."
    );

    let (status, error_message) = Self::run_action(&task, token)
      .instrument(info_span!("task", %task_id, task_name = task.name()))
      .await;

    match status {
      TaskCompletionStatus::Success => {
        trace!(pool_name = %*self.shared.pool_name, %task_id, "Task executed successfully.");
      }
      TaskCompletionStatus::Failed => {
        warn!(
          pool_name = %*self.shared.pool_name,
          %task_id,
          task_name = task.name(),
          error = error_message.as_deref().unwrap_or_default(),
          "Task action failed."
        );
      }
      TaskCompletionStatus::Panicked => {
        error!(
          pool_name = %*self.shared.pool_name,
          %task_id,
          task_name = task.name(),
          panic = error_message.as_deref().unwrap_or_default(),
          "Task panicked during execution."
        );
      }
      TaskCompletionStatus::Interrupted => {
        debug!(pool_name = %*self.shared.pool_name, %task_id, "Task execution interrupted.");
      }
      TaskCompletionStatus::Discarded => {}
    }

    self.shared.running.remove(&task_id);
    self.shared.stats.record_finished(&status);
    self.publish(&task, status, error_message).await;
  }

  /// Runs the action to an outcome. Errors and panics stop here.
  async fn run_action(task: &Task, token: CancellationToken) -> (TaskCompletionStatus, Option<Arc<str>>) {
    // Taken just before an immediate shutdown drained the queue.
    if token.is_cancelled() {
      return (TaskCompletionStatus::Interrupted, None);
    }

    let future = match scoped_execute(task.action(), token.clone()) {
      Ok(future) => future,
      Err(panic_payload) => return (TaskCompletionStatus::Panicked, Some(panic_message(&*panic_payload))),
    };
    let outcome = AssertUnwindSafe(future).catch_unwind();

    if !task.action().abandon_on_interrupt() {
      let outcome = outcome.await;
      return Self::classify(outcome, token.is_cancelled());
    }

    tokio::select! {
      biased;
      _ = token.cancelled() => (TaskCompletionStatus::Interrupted, None),
      outcome = outcome => Self::classify(outcome, false),
    }
  }

  /// A clean return after an interrupt counts as interrupted.
  fn classify(
    outcome: std::thread::Result<ActionResult>,
    interrupted: bool,
  ) -> (TaskCompletionStatus, Option<Arc<str>>) {
    match outcome {
      Ok(Ok(())) if interrupted => (TaskCompletionStatus::Interrupted, None),
      Ok(Ok(())) => (TaskCompletionStatus::Success, None),
      Ok(Err(action_error)) => (TaskCompletionStatus::Failed, Some(Arc::from(action_error.to_string()))),
      Err(panic_payload) => (TaskCompletionStatus::Panicked, Some(panic_message(&*panic_payload))),
    }
  }

  async fn publish(&self, task: &Task, status: TaskCompletionStatus, error: Option<Arc<str>>) {
    let message = InternalCompletionMessage {
      task_id: task.id(),
      task_name: task.shared_name(),
      priority: task.priority(),
      status,
      error,
    };
    self.shared.notifier.publish(&self.completion_tx, message).await;
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> Arc<str> {
  if let Some(message) = payload.downcast_ref::<&'static str>() {
    Arc::from(*message)
  } else if let Some(message) = payload.downcast_ref::<String>() {
    Arc::from(message.as_str())
  } else {
    Arc::from("non-string panic payload")
  }
}

/// A fixed set of workers draining one queue. Never resized once started.
#[derive(Debug)]
pub(crate) struct WorkerPool {
  size: usize,
  shared: Arc<PoolShared>,
  tokio_handle: TokioHandle,
  join_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
  pub(crate) fn new(size: usize, shared: Arc<PoolShared>, tokio_handle: TokioHandle) -> Self {
    Self {
      size: size.max(1),
      shared,
      tokio_handle,
      join_handles: Mutex::new(Vec::new()),
    }
  }

  pub(crate) fn size(&self) -> usize {
    self.size
  }

  pub(crate) fn shared(&self) -> &Arc<PoolShared> {
    &self.shared
  }

  /// Spawns the workers if `gate` reports that this call started the pool.
  ///
  /// The gate runs under the lock `take_join_handles` takes, so a concurrent shutdown
  /// either sees no workers and no transition, or every spawned worker.
  pub(crate) fn start(
    &self,
    gate: impl FnOnce() -> Result<bool, LifecycleError>,
    completion_tx: &AsyncSender<InternalCompletionMessage>,
  ) -> Result<(), LifecycleError> {
    let mut join_handles = self.join_handles.lock();
    if !gate()? {
      trace!(pool_name = %*self.shared.pool_name, "Worker pool already started.");
      return Ok(());
    }

    for worker_id in 0..self.size {
      let worker = Worker {
        id: worker_id,
        shared: self.shared.clone(),
        completion_tx: completion_tx.clone(),
      };
      let span = info_span!("executor_worker", pool_name = %*self.shared.pool_name, worker_id);
      join_handles.push(self.tokio_handle.spawn(worker.run().instrument(span)));
    }
    info!(pool_name = %*self.shared.pool_name, workers = self.size, "Worker pool started.");
    Ok(())
  }

  /// Requests every running task to stop.
  pub(crate) fn interrupt_all(&self) {
    self.shared.interrupt.cancel();
    let running = self.shared.running.len();
    if running > 0 {
      info!(pool_name = %*self.shared.pool_name, running, "Interrupting running tasks.");
    }
  }

  pub(crate) fn tokio_handle(&self) -> &TokioHandle {
    &self.tokio_handle
  }

  /// Hands out the worker handles. Only the first caller gets them.
  pub(crate) fn take_join_handles(&self) -> Vec<JoinHandle<()>> {
    std::mem::take(&mut *self.join_handles.lock())
  }

  /// Waits for every worker in `handles` to exit.
  pub(crate) async fn join(pool_name: &str, handles: Vec<JoinHandle<()>>) {
    if handles.is_empty() {
      trace!(pool_name, "No worker handles to join.");
      return;
    }

    info!(pool_name, workers = handles.len(), "Waiting for workers to join.");
    for handle in handles {
      if let Err(join_error) = handle.await {
        error!(pool_name, "Error joining worker: {:?}. Worker task might have panicked.", join_error);
      }
    }
    debug!(pool_name, "All workers joined.");
  }
}
