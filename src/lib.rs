//! A Tokio-based executor that runs priority-tagged tasks on a fixed pool of
//! workers, with bounded fail-fast queuing, live statistics and graceful or
//! immediate shutdown.

pub mod action;
mod config;
mod error;
mod executor;
mod lifecycle;
mod notifier;
mod stats;
mod task;
mod task_queue;
mod worker;

pub use action::{blocking, ActionError, ActionFuture, ActionResult, IntoActionResult, TaskAction};
pub use config::ExecutorConfig;
pub use error::{LifecycleError, RejectedSubmission, RejectionReason};
pub use executor::{PriorityExecutor, ShutdownMode, TaskExecutor};
pub use lifecycle::{ExecutorState, Lifecycle};
pub use notifier::{TaskCompletionInfo, TaskCompletionStatus};
pub use stats::ExecutorStats;
pub use task::{Priority, Task, TaskId};
pub use worker::RunningTaskInfo;
