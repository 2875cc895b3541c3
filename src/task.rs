use crate::action::TaskAction;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

lazy_static::lazy_static! {
  static ref NEXT_TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);
}

/// Opaque task identity, unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
  /// Draws the next identity from the process-wide counter.
  pub fn next() -> Self {
    TaskId(NEXT_TASK_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed))
  }

  pub fn as_u64(&self) -> u64 {
    self.0
  }
}

impl From<u64> for TaskId {
  fn from(value: u64) -> Self {
    TaskId(value)
  }
}

impl fmt::Display for TaskId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "task-{}", self.0)
  }
}

/// Scheduling priority. Higher variants are always dequeued first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Priority {
  Low,
  #[default]
  Normal,
  High,
  Critical,
}

impl Priority {
  pub const ALL: [Priority; 4] = [Priority::Low, Priority::Normal, Priority::High, Priority::Critical];
}

impl fmt::Display for Priority {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      Priority::Low => "LOW",
      Priority::Normal => "NORMAL",
      Priority::High => "HIGH",
      Priority::Critical => "CRITICAL",
    };
    f.write_str(label)
  }
}

/// A named, prioritized unit of work.
///
/// Immutable once built. Cloning is cheap: the name and the action are
/// reference counted, so a clone shares the same action instance.
#[derive(Clone)]
pub struct Task {
  id: TaskId,
  name: Arc<str>,
  priority: Priority,
  action: Arc<dyn TaskAction>,
}

impl Task {
  /// Creates a task with a freshly generated id.
  pub fn new(name: impl Into<String>, priority: Priority, action: impl TaskAction) -> Self {
    Self::with_id(TaskId::next(), name, priority, action)
  }

  /// Creates a task with a caller-supplied id.
  ///
  /// The executor does not check ids for uniqueness; callers mixing their own
  /// ids with generated ones are responsible for keeping them distinct.
  pub fn with_id(id: TaskId, name: impl Into<String>, priority: Priority, action: impl TaskAction) -> Self {
    Self {
      id,
      name: Arc::from(name.into()),
      priority,
      action: Arc::new(action),
    }
  }

  pub fn id(&self) -> TaskId {
    self.id
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn priority(&self) -> Priority {
    self.priority
  }

  pub fn action(&self) -> &Arc<dyn TaskAction> {
    &self.action
  }

  pub(crate) fn shared_name(&self) -> Arc<str> {
    self.name.clone()
  }
}

impl fmt::Debug for Task {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Task")
      .field("id", &self.id)
      .field("name", &self.name)
      .field("priority", &self.priority)
      .finish_non_exhaustive()
  }
}
