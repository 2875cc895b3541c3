use priority_executor::{ExecutorConfig, Lifecycle, Priority, PriorityExecutor, Task, TaskExecutor};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

async fn render_report(name: &'static str, delay_ms: u64) {
  info!("Report {} starting, will take {}ms", name, delay_ms);
  tokio::time::sleep(Duration::from_millis(delay_ms)).await;
  info!("Report {} finished", name);
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false) // Disable module paths for cleaner example output
    .init();

  info!("--- Basic Usage Example ---");

  let executor = PriorityExecutor::new(ExecutorConfig::new(2, 10).with_name("basic_pool"), Handle::current());
  executor.start().expect("executor starts once");

  let jobs = [
    ("audit-log", Priority::Low, 300),
    ("invoice", Priority::Normal, 200),
    ("fraud-check", Priority::Critical, 100),
    ("thumbnail", Priority::Low, 150),
    ("payment", Priority::High, 250),
  ];

  for (name, priority, delay_ms) in jobs {
    match executor.submit(Task::new(name, priority, move || render_report(name, delay_ms))) {
      Ok(task_id) => info!("Submitted {} as {} ({})", name, task_id, priority),
      Err(e) => tracing::error!("Failed to submit {}: {}", name, e),
    }
  }

  let stats = executor.stats();
  info!(
    "Queued: {}, Active: {}, Pool size: {}",
    stats.queued_tasks(),
    stats.active_threads(),
    stats.pool_size()
  );

  executor.shutdown().await;

  let stats = executor.stats();
  info!(
    "Executor {} terminated. Submitted: {}, Completed: {}, Peak active: {}",
    executor.state(),
    stats.submitted_tasks(),
    stats.completed_tasks(),
    stats.largest_active_threads()
  );
  info!("--- Basic Usage Example End ---");
}
