use crate::config::ExecutorConfig;
use crate::error::{LifecycleError, RejectedSubmission, RejectionReason};
use crate::lifecycle::{ExecutorState, Lifecycle, LifecycleController, StopRole};
use crate::notifier::{CompletionNotifier, InternalCompletionMessage, TaskCompletionInfo, TaskCompletionStatus};
use crate::stats::{ExecutorStats, StatsRecorder};
use crate::task::{Task, TaskId};
use crate::task_queue::{OfferError, PriorityTaskQueue};
use crate::worker::{PoolShared, RunningTaskInfo, WorkerPool};

use dashmap::DashMap;
use fibre::mpsc::AsyncSender;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle as TokioHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, trace, warn, Instrument};

/// The task-submission contract.
pub trait TaskExecutor {
  /// Enqueues `task` or rejects it immediately. Never waits.
  fn submit(&self, task: Task) -> Result<TaskId, RejectedSubmission>;

  /// Stops accepting work, runs everything already accepted, then resolves.
  fn shutdown(&self) -> impl Future<Output = ()> + Send;

  /// Stops accepting work, drops everything still queued, interrupts running
  /// tasks, then resolves with the tasks that never started.
  fn shutdown_now(&self) -> impl Future<Output = Vec<Task>> + Send;

  fn stats(&self) -> ExecutorStats;
}

/// Defines how the executor should behave upon shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
  /// Queued and running tasks all complete before termination.
  Graceful,
  /// Queued tasks are discarded and running tasks are interrupted.
  /// Actions that never yield, and blocking actions, still run to completion.
  Immediate,
}

/// A fixed-size worker pool executing tasks in priority order.
///
/// Created in the `New` state; call [`Lifecycle::start`] before submitting.
pub struct PriorityExecutor {
  pool_name: Arc<String>,
  lifecycle: Arc<LifecycleController>,
  pool: WorkerPool,
  /// Taken by the terminator once every worker has exited.
  completion_tx: Arc<Mutex<Option<AsyncSender<InternalCompletionMessage>>>>,
}

impl std::fmt::Debug for PriorityExecutor {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PriorityExecutor")
      .field("pool_name", &self.pool_name)
      .field("state", &self.lifecycle.state())
      .field("stats", &self.stats())
      .finish_non_exhaustive()
  }
}

impl PriorityExecutor {
  pub fn new(config: ExecutorConfig, tokio_handle: TokioHandle) -> Arc<Self> {
    let pool_name = Arc::new(config.name().to_string());
    let (completion_tx, completion_rx) = CompletionNotifier::channel();
    let notifier = CompletionNotifier::new(completion_rx, tokio_handle.clone(), pool_name.clone());

    let shared = Arc::new(PoolShared {
      pool_name: pool_name.clone(),
      queue: Arc::new(PriorityTaskQueue::new(config.queue_capacity())),
      stats: Arc::new(StatsRecorder::new()),
      running: Arc::new(DashMap::new()),
      interrupt: CancellationToken::new(),
      notifier,
    });

    info!(
      pool_name = %*pool_name,
      pool_size = config.pool_size(),
      queue_capacity = config.queue_capacity(),
      "Executor created."
    );

    Arc::new(Self {
      pool_name,
      lifecycle: Arc::new(LifecycleController::new()),
      pool: WorkerPool::new(config.pool_size(), shared, tokio_handle),
      completion_tx: Arc::new(Mutex::new(Some(completion_tx))),
    })
  }

  pub fn name(&self) -> &str {
    &self.pool_name
  }

  pub fn state(&self) -> ExecutorState {
    self.lifecycle.state()
  }

  /// Registers a handler called for every task that leaves the executor.
  pub fn add_completion_handler(&self, handler: impl Fn(TaskCompletionInfo) + Send + Sync + 'static) {
    self.shared().notifier.add_handler(handler);
  }

  /// Tasks currently executing on a worker.
  pub fn running_tasks(&self) -> Vec<RunningTaskInfo> {
    self.shared().running.iter().map(|entry| entry.value().info.clone()).collect()
  }

  /// Interrupts one running task. Returns `false` if it is not running.
  ///
  /// Queued tasks are unaffected; interruption is cooperative in the same way
  /// as for `shutdown_now`.
  pub fn interrupt(&self, task_id: TaskId) -> bool {
    match self.shared().running.get(&task_id) {
      Some(entry) => {
        debug!(pool_name = %*self.pool_name, %task_id, "Interrupt requested for running task.");
        entry.value().token.cancel();
        true
      }
      None => false,
    }
  }

  /// Waits until the executor is terminated, without initiating shutdown.
  pub async fn await_termination(&self) {
    self.lifecycle.wait_terminated().await;
  }

  /// Shuts down in the given mode and waits for termination.
  ///
  /// Only the first caller drives the shutdown; later or concurrent callers
  /// wait for the same outcome. An `Immediate` call made while a graceful
  /// shutdown is draining escalates it. Returns the discarded queued tasks.
  pub async fn shutdown_with(&self, mode: ShutdownMode) -> Vec<Task> {
    // Held until the discards are published. `None` means the workers have
    // already exited, so the queue is closed and empty.
    let completion_tx = self.completion_tx.lock().clone();
    let role = self.lifecycle.begin_stop();
    let shared = self.shared();

    let mut discarded = Vec::new();
    if mode == ShutdownMode::Immediate {
      // Drain before interrupting, so woken workers find the queue empty.
      discarded = shared.queue.close_and_drain();
      self.pool.interrupt_all();
      if !discarded.is_empty() {
        info!(pool_name = %*self.pool_name, discarded = discarded.len(), "Immediate shutdown: discarded queued tasks.");
        shared.stats.record_discarded(discarded.len());
        if let Some(completion_tx) = &completion_tx {
          self.publish_discarded(completion_tx, &discarded).await;
        }
      }
    }
    drop(completion_tx);

    match role {
      StopRole::Driver { from } => {
        info!(pool_name = %*self.pool_name, ?mode, %from, "Initiating executor shutdown.");
        shared.queue.close();
        self.spawn_terminator();
      }
      StopRole::Follower => {
        trace!(pool_name = %*self.pool_name, ?mode, "Shutdown already in progress; waiting for termination.");
      }
    }

    self.lifecycle.wait_terminated().await;
    discarded
  }

  fn shared(&self) -> &Arc<PoolShared> {
    self.pool.shared()
  }

  fn reject(&self, reason: RejectionReason, task: Task) -> Result<TaskId, RejectedSubmission> {
    self.shared().stats.record_rejected();
    match reason {
      RejectionReason::QueueFull { .. } => {
        debug!(pool_name = %*self.pool_name, task_id = %task.id(), %reason, "Submit: task rejected.");
      }
      _ => {
        warn!(pool_name = %*self.pool_name, task_id = %task.id(), %reason, "Submit: task rejected.");
      }
    }
    Err(RejectedSubmission::new(reason, task))
  }

  async fn publish_discarded(&self, completion_tx: &AsyncSender<InternalCompletionMessage>, tasks: &[Task]) {
    let shared = self.shared();
    for task in tasks {
      let message = InternalCompletionMessage {
        task_id: task.id(),
        task_name: task.shared_name(),
        priority: task.priority(),
        status: TaskCompletionStatus::Discarded,
        error: None,
      };
      shared.notifier.publish(completion_tx, message).await;
    }
  }

  /// Finishes the shutdown on the runtime, so it completes even if the
  /// caller stops waiting.
  fn spawn_terminator(&self) {
    let handles = self.pool.take_join_handles();
    let completion_tx = self.completion_tx.clone();
    let notifier = self.shared().notifier.clone();
    let lifecycle = self.lifecycle.clone();
    let pool_name = self.pool_name.clone();
    let span = info_span!("executor_shutdown", pool_name = %*self.pool_name);

    self.pool.tokio_handle().spawn(
      async move {
        WorkerPool::join(&pool_name, handles).await;
        // Workers dropped their senders on exit. Once ours and any held by
        // an escalating caller are gone, the completion dispatcher drains
        // and stops.
        drop(completion_tx.lock().take());
        notifier.await_shutdown().await;
        lifecycle.mark_terminated();
        info!(pool_name = %*pool_name, "Executor terminated.");
      }
      .instrument(span),
    );
  }
}

impl TaskExecutor for PriorityExecutor {
  fn submit(&self, task: Task) -> Result<TaskId, RejectedSubmission> {
    let state = self.lifecycle.state();
    if state != ExecutorState::Running {
      return self.reject(RejectionReason::for_state(state), task);
    }

    let shared = self.shared();
    let task_id = task.id();
    let priority = task.priority();
    match shared.queue.offer(task) {
      Ok(()) => {
        shared.stats.record_submitted();
        trace!(pool_name = %*self.pool_name, %task_id, %priority, "Submit: task queued.");
        Ok(task_id)
      }
      Err(OfferError::Full(task)) => self.reject(
        RejectionReason::QueueFull {
          capacity: shared.queue.capacity(),
        },
        task,
      ),
      // The queue is only closed after leaving `Running`.
      Err(OfferError::Closed(task)) => self.reject(RejectionReason::for_state(self.lifecycle.state()), task),
    }
  }

  fn shutdown(&self) -> impl Future<Output = ()> + Send {
    async move {
      self.shutdown_with(ShutdownMode::Graceful).await;
    }
  }

  fn shutdown_now(&self) -> impl Future<Output = Vec<Task>> + Send {
    self.shutdown_with(ShutdownMode::Immediate)
  }

  fn stats(&self) -> ExecutorStats {
    let shared = self.shared();
    shared.stats.snapshot(self.pool.size(), shared.queue.len())
  }
}

impl Lifecycle for PriorityExecutor {
  fn start(&self) -> Result<(), LifecycleError> {
    let completion_tx = self.completion_tx.lock().clone();
    let Some(completion_tx) = completion_tx else {
      return Err(LifecycleError::InvalidTransition {
        from: self.lifecycle.state(),
      });
    };
    self.pool.start(|| self.lifecycle.try_start(), &completion_tx)
  }

  fn stop(&self) -> impl Future<Output = ()> + Send {
    TaskExecutor::shutdown(self)
  }

  fn is_running(&self) -> bool {
    self.lifecycle.is_running()
  }
}

impl Drop for PriorityExecutor {
  fn drop(&mut self) {
    if let StopRole::Driver { from } = self.lifecycle.begin_stop() {
      // Workers drain what is already queued and exit on their own; nobody
      // is left to await termination.
      info!(
        pool_name = %*self.pool_name,
        %from,
        "PriorityExecutor dropped without shutdown. Closing queue; workers will drain and stop."
      );
      self.shared().queue.close();
    } else {
      trace!(pool_name = %*self.pool_name, "Drop: Shutdown already in progress or completed.");
    }
  }
}
