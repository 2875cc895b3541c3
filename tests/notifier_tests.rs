use priority_executor::{
  ExecutorConfig, ExecutorState, Lifecycle, Priority, PriorityExecutor, Task, TaskCompletionInfo, TaskCompletionStatus, TaskId,
  TaskExecutor,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle as TokioHandle;
use tokio::sync::Notify;
use tokio::time::sleep;

// Helper to initialize tracing for tests
fn setup_tracing_for_test() {
  use std::sync::Once;
  use tracing_subscriber::{fmt, util::SubscriberInitExt, EnvFilter};
  static TRACING_INIT: Once = Once::new();

  TRACING_INIT.call_once(|| {
    let filter =
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,priority_executor=trace"));
    fmt::Subscriber::builder()
      .with_env_filter(filter)
      .with_test_writer()
      .finish()
      .try_init()
      .ok();
  });
}

// Helper for collecting notifications in tests
fn create_collecting_handler() -> (
  Arc<Mutex<Vec<TaskCompletionInfo>>>,
  impl Fn(TaskCompletionInfo) + Send + Sync + 'static,
) {
  let collected_notifications = Arc::new(Mutex::new(Vec::new()));
  let collected_notifications_clone = collected_notifications.clone();
  let handler = move |info: TaskCompletionInfo| {
    tracing::debug!(
      "Test Collecting Handler: Received notification for task_id: {}, status: {:?}",
      info.task_id,
      info.status
    );
    collected_notifications_clone.lock().unwrap().push(info);
  };
  (collected_notifications, handler)
}

// Handlers run on spawned tasks, so give them a moment after shutdown.
async fn wait_for_notifications(notifications: &Arc<Mutex<Vec<TaskCompletionInfo>>>, expected: usize) {
  for _ in 0..200 {
    if notifications.lock().unwrap().len() >= expected {
      return;
    }
    sleep(Duration::from_millis(5)).await;
  }
  panic!(
    "Expected {} notifications, got {}",
    expected,
    notifications.lock().unwrap().len()
  );
}

fn started_executor(pool_size: usize, queue_capacity: usize, pool_name: &str) -> Arc<PriorityExecutor> {
  let executor = PriorityExecutor::new(
    ExecutorConfig::new(pool_size, queue_capacity).with_name(pool_name),
    TokioHandle::current(),
  );
  executor.start().unwrap();
  executor
}

#[derive(Debug)]
struct QuotaExceeded;

impl std::fmt::Display for QuotaExceeded {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("quota exceeded")
  }
}

impl std::error::Error for QuotaExceeded {}

#[tokio::test]
async fn test_completion_notifier_success() {
  setup_tracing_for_test();
  let pool_name = "test_notifier_success";
  let executor = started_executor(1, 4, pool_name);
  let (notifications, handler) = create_collecting_handler();
  executor.add_completion_handler(handler);

  let task_id = executor
    .submit(Task::new("nightly-report", Priority::High, || async {
      sleep(Duration::from_millis(10)).await;
    }))
    .unwrap();

  executor.shutdown().await;
  wait_for_notifications(&notifications, 1).await;

  let notifs = notifications.lock().unwrap();
  assert_eq!(notifs.len(), 1);
  let info = &notifs[0];
  assert_eq!(info.task_id, task_id);
  assert_eq!(&*info.task_name, "nightly-report");
  assert_eq!(info.priority, Priority::High);
  assert_eq!(*info.pool_name, pool_name);
  assert_eq!(info.status, TaskCompletionStatus::Success);
  assert!(info.error.is_none());
  assert!(info.completion_time <= std::time::SystemTime::now());
}

#[allow(dependency_on_unit_never_type_fallback)]
#[tokio::test]
async fn test_completion_notifier_failure_and_panic_carry_messages() {
  setup_tracing_for_test();
  let executor = started_executor(1, 4, "test_notifier_failures");
  let (notifications, handler) = create_collecting_handler();
  executor.add_completion_handler(handler);

  let failing_id = executor
    .submit(Task::new("failing", Priority::Critical, || async { Err::<(), _>(QuotaExceeded) }))
    .unwrap();
  let panicking_id = executor
    .submit(Task::new("panicking", Priority::Low, || async {
      panic!("intentional panic in action");
    }))
    .unwrap();

  executor.shutdown().await;
  wait_for_notifications(&notifications, 2).await;

  let notifs = notifications.lock().unwrap();
  let failed = notifs.iter().find(|n| n.task_id == failing_id).expect("failure notification");
  assert_eq!(failed.status, TaskCompletionStatus::Failed);
  assert_eq!(failed.error.as_deref(), Some("quota exceeded"));

  let panicked = notifs.iter().find(|n| n.task_id == panicking_id).expect("panic notification");
  assert_eq!(panicked.status, TaskCompletionStatus::Panicked);
  assert_eq!(panicked.error.as_deref(), Some("intentional panic in action"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_completion_notifier_during_immediate_shutdown() {
  setup_tracing_for_test();
  let executor = started_executor(1, 8, "test_notifier_immediate");
  let (notifications, handler) = create_collecting_handler();
  executor.add_completion_handler(handler);

  let started = Arc::new(Notify::new());
  let running_id = {
    let started = started.clone();
    executor
      .submit(Task::new("long", Priority::Normal, move || {
        let started = started.clone();
        async move {
          started.notify_one();
          sleep(Duration::from_secs(10)).await;
        }
      }))
      .unwrap()
  };
  tokio::time::timeout(Duration::from_secs(5), started.notified()).await.unwrap();

  let queued_a = executor.submit(Task::new("queued-a", Priority::Low, || async {})).unwrap();
  let queued_b = executor.submit(Task::new("queued-b", Priority::High, || async {})).unwrap();

  let discarded = executor.shutdown_now().await;
  assert_eq!(discarded.len(), 2);
  wait_for_notifications(&notifications, 3).await;

  let notifs = notifications.lock().unwrap();
  let status_of = |id: TaskId| notifs.iter().find(|n| n.task_id == id).map(|n| n.status);
  assert_eq!(status_of(running_id), Some(TaskCompletionStatus::Interrupted));
  assert_eq!(status_of(queued_a), Some(TaskCompletionStatus::Discarded));
  assert_eq!(status_of(queued_b), Some(TaskCompletionStatus::Discarded));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_completion_notifier_discards_during_escalation() {
  setup_tracing_for_test();
  let executor = started_executor(1, 8, "test_notifier_escalation");
  let (notifications, handler) = create_collecting_handler();
  executor.add_completion_handler(handler);

  let started = Arc::new(Notify::new());
  let release = Arc::new(Notify::new());
  let blocker_id = {
    let started = started.clone();
    let release = release.clone();
    executor
      .submit(Task::new("blocker", Priority::Normal, move || {
        let started = started.clone();
        let release = release.clone();
        async move {
          started.notify_one();
          release.notified().await;
        }
      }))
      .unwrap()
  };
  tokio::time::timeout(Duration::from_secs(5), started.notified()).await.unwrap();

  let mut queued_ids = Vec::new();
  for i in 0..3 {
    queued_ids.push(executor.submit(Task::new(format!("queued-{i}"), Priority::Low, || async {})).unwrap());
  }

  let graceful = {
    let executor = executor.clone();
    tokio::spawn(async move { executor.shutdown().await })
  };
  for _ in 0..200 {
    if executor.state() == ExecutorState::Stopping {
      break;
    }
    sleep(Duration::from_millis(5)).await;
  }
  assert_eq!(executor.state(), ExecutorState::Stopping);

  let discarded = executor.shutdown_now().await;
  assert_eq!(discarded.len(), 3);
  graceful.await.unwrap();
  wait_for_notifications(&notifications, 4).await;

  let notifs = notifications.lock().unwrap();
  let status_of = |id: TaskId| notifs.iter().find(|n| n.task_id == id).map(|n| n.status);
  assert_eq!(status_of(blocker_id), Some(TaskCompletionStatus::Interrupted));
  for id in queued_ids {
    assert_eq!(status_of(id), Some(TaskCompletionStatus::Discarded));
  }
}

#[tokio::test]
async fn test_completion_notifier_multiple_handlers() {
  setup_tracing_for_test();
  let executor = started_executor(2, 8, "test_notifier_multiple_handlers");
  let (notifications1, handler1) = create_collecting_handler();
  let (notifications2, handler2) = create_collecting_handler();
  executor.add_completion_handler(handler1);
  executor.add_completion_handler(handler2);

  for i in 0..3 {
    executor.submit(Task::new(format!("multi-{i}"), Priority::Normal, || async {})).unwrap();
  }
  executor.shutdown().await;

  wait_for_notifications(&notifications1, 3).await;
  wait_for_notifications(&notifications2, 3).await;
  assert!(notifications1
    .lock()
    .unwrap()
    .iter()
    .all(|n| n.status == TaskCompletionStatus::Success));
}

#[tokio::test]
async fn test_completion_notifier_handler_panics() {
  setup_tracing_for_test();
  let executor = started_executor(1, 4, "test_notifier_handler_panics");
  let panicking_calls = Arc::new(AtomicUsize::new(0));
  let panicking_calls_clone = panicking_calls.clone();
  executor.add_completion_handler(move |_info| {
    panicking_calls_clone.fetch_add(1, Ordering::SeqCst);
    panic!("Handler intentionally panicked!");
  });
  let (notifications, handler) = create_collecting_handler();
  executor.add_completion_handler(handler);

  executor.submit(Task::new("one", Priority::Normal, || async {})).unwrap();
  executor.submit(Task::new("two", Priority::Normal, || async {})).unwrap();
  executor.shutdown().await;

  wait_for_notifications(&notifications, 2).await;
  assert_eq!(panicking_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_completion_notifier_no_handlers_added() {
  setup_tracing_for_test();
  let executor = started_executor(1, 4, "test_notifier_no_handlers");
  executor.submit(Task::new("quiet", Priority::Normal, || async {})).unwrap();
  executor.shutdown().await;
  assert_eq!(executor.stats().completed_tasks(), 1);
}
