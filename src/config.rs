use std::num::NonZeroUsize;

const DEFAULT_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_POOL_NAME: &str = "priority_executor";

/// Settings for a [`PriorityExecutor`](crate::PriorityExecutor).
///
/// Rejection is always fail-fast: a submission that finds the queue full is
/// returned to the caller immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
  name: String,
  pool_size: usize,
  queue_capacity: usize,
}

impl Default for ExecutorConfig {
  fn default() -> Self {
    let pool_size = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
    Self {
      name: DEFAULT_POOL_NAME.to_string(),
      pool_size,
      queue_capacity: DEFAULT_QUEUE_CAPACITY,
    }
  }
}

impl ExecutorConfig {
  /// A config with `pool_size` workers and a queue of `queue_capacity`.
  /// Zero values are raised to one.
  pub fn new(pool_size: usize, queue_capacity: usize) -> Self {
    Self::default().with_pool_size(pool_size).with_queue_capacity(queue_capacity)
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  pub fn with_pool_size(mut self, pool_size: usize) -> Self {
    self.pool_size = pool_size.max(1);
    self
  }

  pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
    self.queue_capacity = queue_capacity.max(1);
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn pool_size(&self) -> usize {
    self.pool_size
  }

  pub fn queue_capacity(&self) -> usize {
    self.queue_capacity
  }
}
