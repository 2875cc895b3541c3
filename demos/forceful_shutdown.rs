use priority_executor::{
  action, blocking, ExecutorConfig, Lifecycle, Priority, PriorityExecutor, Task, TaskCompletionStatus, TaskExecutor,
};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

async fn long_running_interruptible_task(id: usize, duration_s: u64) {
  info!("Task {} starting (potentially long: {}s)", id, duration_s);
  tokio::time::sleep(Duration::from_secs(duration_s)).await;
  info!("Task {} completed NORMALLY (should be rare in forceful shutdown)", id);
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Forceful Shutdown Example ---");

  let executor = PriorityExecutor::new(
    ExecutorConfig::new(3, 10).with_name("forceful_shutdown_pool"),
    Handle::current(),
  );
  executor.start().expect("executor starts once");
  executor.add_completion_handler(|info| {
    if info.status == TaskCompletionStatus::Interrupted {
      info!("{} ({}) was interrupted", info.task_id, info.task_name);
    }
  });

  // A blocking action polls the interruption flag between units of work.
  executor
    .submit(Task::new(
      "blocking-scan",
      Priority::High,
      blocking(|| {
        for chunk in 0..100 {
          if action::is_interrupted() {
            info!("blocking-scan stopping early at chunk {}", chunk);
            return;
          }
          std::thread::sleep(Duration::from_millis(50));
        }
      }),
    ))
    .expect("queue has room");

  for i in 0..5 {
    let task = Task::new(format!("sleeper-{i}"), Priority::Normal, move || {
      long_running_interruptible_task(i, 5)
    });
    if let Err(e) = executor.submit(task) {
      tracing::error!("Failed to submit sleeper-{}: {}", i, e);
    }
  }

  let stats = executor.stats();
  info!("Queue size: {}, Active: {}", stats.queued_tasks(), stats.active_threads());
  info!("Initiating FORCEFUL shutdown shortly...");
  tokio::time::sleep(Duration::from_millis(200)).await;

  let discarded = executor.shutdown_now().await;
  info!(
    "Forceful shutdown complete. {} queued tasks never ran: {:?}",
    discarded.len(),
    discarded.iter().map(|task| task.name()).collect::<Vec<_>>()
  );

  let stats = executor.stats();
  info!(
    "Completed: {}, Interrupted: {}, Discarded: {}",
    stats.completed_tasks(),
    stats.interrupted_tasks(),
    stats.discarded_tasks()
  );
  info!("--- Forceful Shutdown Example End ---");
}
