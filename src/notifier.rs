use crate::task::{Priority, TaskId};

use fibre::mpsc::{AsyncReceiver, AsyncSender, RecvError};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Once};
use std::time::SystemTime;
use tokio::runtime::Handle as TokioHandle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

/// How a task left the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskCompletionStatus {
  Success,
  /// The action returned an error.
  Failed,
  Panicked,
  /// The action was cut short by `shutdown_now` or an explicit interrupt.
  Interrupted,
  /// The task was accepted but dropped unexecuted by `shutdown_now`.
  Discarded,
}

#[derive(Debug, Clone)]
pub struct TaskCompletionInfo {
  pub task_id: TaskId,
  pub task_name: Arc<str>,
  pub priority: Priority,
  pub pool_name: Arc<String>,
  pub status: TaskCompletionStatus,
  /// Error or panic message for `Failed` and `Panicked` outcomes.
  pub error: Option<Arc<str>>,
  pub completion_time: SystemTime,
}

/// What a worker reports when a task leaves it.
#[derive(Debug)]
pub(crate) struct InternalCompletionMessage {
  pub(crate) task_id: TaskId,
  pub(crate) task_name: Arc<str>,
  pub(crate) priority: Priority,
  pub(crate) status: TaskCompletionStatus,
  pub(crate) error: Option<Arc<str>>,
}

type CompletionHandler = Arc<dyn Fn(TaskCompletionInfo) + Send + Sync + 'static>;

struct NotifierInit {
  pending_rx: Option<AsyncReceiver<InternalCompletionMessage>>,
  worker: Option<JoinHandle<()>>,
}

/// Fans completion events out to user handlers on a dedicated Tokio task.
///
/// The dispatcher is only spawned when the first handler is added,
/// and workers only emit events while at least one handler is registered.
pub(crate) struct CompletionNotifier {
  handlers: Arc<RwLock<Vec<CompletionHandler>>>,
  has_handlers: AtomicBool,
  init_once: Once,
  init_state: Mutex<NotifierInit>,
  tokio_handle: TokioHandle,
  pool_name: Arc<String>,
}

impl fmt::Debug for CompletionNotifier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let handler_count = self.handlers.try_read().map_or(0, |guard| guard.len());
    f.debug_struct("CompletionNotifier")
      .field("pool_name", &self.pool_name)
      .field("handler_count", &handler_count)
      .field("initialized", &self.init_once.is_completed())
      .finish_non_exhaustive()
  }
}

impl CompletionNotifier {
  pub(crate) fn new(
    internal_rx: AsyncReceiver<InternalCompletionMessage>,
    tokio_handle: TokioHandle,
    pool_name: Arc<String>,
  ) -> Arc<Self> {
    Arc::new(Self {
      handlers: Arc::new(RwLock::new(Vec::new())),
      has_handlers: AtomicBool::new(false),
      init_once: Once::new(),
      init_state: Mutex::new(NotifierInit {
        pending_rx: Some(internal_rx),
        worker: None,
      }),
      tokio_handle,
      pool_name,
    })
  }

  /// Creates the channel pair a notifier and its producers share.
  pub(crate) fn channel() -> (AsyncSender<InternalCompletionMessage>, AsyncReceiver<InternalCompletionMessage>) {
    fibre::mpsc::unbounded_async()
  }

  /// `true` once at least one handler is registered.
  pub(crate) fn is_listening(&self) -> bool {
    self.has_handlers.load(AtomicOrdering::Acquire)
  }

  fn ensure_worker_initialized(&self) {
    self.init_once.call_once(|| {
      let mut init = self.init_state.lock();
      if let Some(rx) = init.pending_rx.take() {
        info!(pool_name = %*self.pool_name, "Starting completion dispatcher.");
        let worker = self.tokio_handle.spawn(
          Self::dispatch_loop(
            rx,
            self.handlers.clone(),
            self.tokio_handle.clone(),
            self.pool_name.clone(),
          )
            .instrument(info_span!("completion_dispatcher", pool_name = %*self.pool_name)),
        );
        init.worker = Some(worker);
      } else {
        warn!(pool_name = %*self.pool_name, "Completion dispatcher already started elsewhere.");
      }
    });
  }

  pub(crate) fn add_handler(&self, handler: impl Fn(TaskCompletionInfo) + Send + Sync + 'static) {
    self.ensure_worker_initialized();

    let mut handlers = self.handlers.write();
    handlers.push(Arc::new(handler));
    self.has_handlers.store(true, AtomicOrdering::Release);
    info!(pool_name = %*self.pool_name, handlers = handlers.len(), "Completion handler registered.");
  }

  /// Sends one completion event, if anyone is listening.
  pub(crate) async fn publish(
    &self,
    tx: &AsyncSender<InternalCompletionMessage>,
    message: InternalCompletionMessage,
  ) {
    if !self.is_listening() {
      return;
    }
    let task_id = message.task_id;
    if tx.send(message).await.is_err() {
      warn!(pool_name = %*self.pool_name, %task_id, "Completion channel closed; event dropped.");
    }
  }

  async fn dispatch_loop(
    queue_rx: AsyncReceiver<InternalCompletionMessage>,
    handlers: Arc<RwLock<Vec<CompletionHandler>>>,
    handler_runtime: TokioHandle,
    pool_name: Arc<String>,
  ) {
    debug!(pool_name = %*pool_name, "Completion dispatcher running.");

    loop {
      let message = match queue_rx.recv().await {
        Ok(message) => message,
        Err(RecvError::Disconnected) => {
          debug!(pool_name = %*pool_name, "All completion senders dropped.");
          break;
        }
      };
      trace!(task_id = %message.task_id, "Dispatching completion.");

      // Snapshot the handlers so none of them runs under the lock.
      let snapshot: Vec<CompletionHandler> = handlers.read().clone();
      if snapshot.is_empty() {
        trace!(task_id = %message.task_id, "No handlers; completion dropped.");
        continue;
      }

      let info = TaskCompletionInfo {
        task_id: message.task_id,
        task_name: message.task_name,
        priority: message.priority,
        pool_name: pool_name.clone(),
        status: message.status,
        error: message.error,
        completion_time: SystemTime::now(),
      };

      trace!(task_id = %info.task_id, status = ?info.status, handlers = snapshot.len(), "Fanning out completion.");

      for handler in snapshot {
        let event = info.clone();
        handler_runtime.spawn(async move {
          let task_id = event.task_id;
          let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(event)));
          if result.is_err() {
            error!(%task_id, "Completion handler panicked.");
          }
        });
      }
    }

    info!(pool_name = %*pool_name, "Completion dispatcher stopped.");
  }

  pub(crate) async fn await_shutdown(&self) {
    let worker = self.init_state.lock().worker.take();

    if let Some(handle) = worker {
      info!(pool_name = %*self.pool_name, "Waiting for completion dispatcher.");
      if let Err(e) = handle.await {
        error!(pool_name = %*self.pool_name, error = ?e, "Completion dispatcher did not exit cleanly.");
      } else {
        trace!(pool_name = %*self.pool_name, "Completion dispatcher joined.");
      }
    } else {
      trace!(pool_name = %*self.pool_name, "No completion dispatcher to join.");
    }
  }
}
