use priority_executor::{ExecutorConfig, Lifecycle, Priority, PriorityExecutor, Task, TaskExecutor};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Graceful Shutdown Example ---");

  let executor = PriorityExecutor::new(
    ExecutorConfig::new(2, 16).with_name("graceful_shutdown_pool"),
    Handle::current(),
  );
  executor.start().expect("executor starts once");
  executor.add_completion_handler(|info| {
    info!("Completion: {} ({}) -> {:?}", info.task_id, info.task_name, info.status);
  });

  for i in 0..6u64 {
    let priority = if i % 2 == 0 { Priority::Normal } else { Priority::High };
    let task = Task::new(format!("batch-{i}"), priority, move || async move {
      tokio::time::sleep(Duration::from_millis(200 + i * 50)).await;
      info!("batch-{} done", i);
    });
    if let Err(e) = executor.submit(task) {
      tracing::error!("Failed to submit batch-{}: {}", i, e);
    }
  }

  tokio::time::sleep(Duration::from_millis(100)).await;
  info!("Initiating GRACEFUL shutdown; queued work will still run...");

  let shutdown = {
    let executor = executor.clone();
    tokio::spawn(async move { executor.shutdown().await })
  };
  tokio::time::sleep(Duration::from_millis(10)).await;
  match executor.submit(Task::new("too-late", Priority::Critical, || async {})) {
    Ok(task_id) => info!("Unexpectedly accepted {}", task_id),
    Err(e) => info!("Rejected as expected: {}", e.reason()),
  }
  shutdown.await.expect("shutdown task completes");

  let stats = executor.stats();
  info!(
    "State: {}. Completed: {}, Rejected: {}",
    executor.state(),
    stats.completed_tasks(),
    stats.rejected_tasks()
  );
  info!("--- Graceful Shutdown Example End ---");
}
