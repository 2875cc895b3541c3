use priority_executor::{ExecutorConfig, Lifecycle, Priority, PriorityExecutor, Task, TaskExecutor};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{error, info};

#[derive(Debug)]
struct UpstreamUnavailable;

impl std::fmt::Display for UpstreamUnavailable {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("upstream unavailable")
  }
}

impl std::error::Error for UpstreamUnavailable {}

#[allow(dependency_on_unit_never_type_fallback)]
#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::INFO)
    .with_target(false)
    .init();
  info!("--- Task Panic Example ---");

  let executor = PriorityExecutor::new(ExecutorConfig::new(1, 8).with_name("panic_pool"), Handle::current());
  executor.start().expect("executor starts once");
  executor.add_completion_handler(|info| match &info.error {
    Some(message) => error!("{} ({}) -> {:?}: {}", info.task_id, info.task_name, info.status, message),
    None => info!("{} ({}) -> {:?}", info.task_id, info.task_name, info.status),
  });

  executor
    .submit(Task::new("will-panic", Priority::Critical, || async {
      tokio::time::sleep(Duration::from_millis(50)).await;
      panic!("This task is designed to panic!");
    }))
    .expect("queue has room");
  executor
    .submit(Task::new("will-fail", Priority::High, || async {
      Err::<(), _>(UpstreamUnavailable)
    }))
    .expect("queue has room");
  executor
    .submit(Task::new("still-runs", Priority::Low, || async {
      info!("The single worker survived and keeps going.");
    }))
    .expect("queue has room");

  executor.shutdown().await;

  let stats = executor.stats();
  info!(
    "Completed: {}, Failed: {}, Panicked: {}",
    stats.completed_tasks(),
    stats.failed_tasks(),
    stats.panicked_tasks()
  );
  info!("--- Task Panic Example End ---");
}
