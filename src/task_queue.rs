use crate::task::{Priority, Task};

use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use tokio::sync::Notify;
use tracing::trace;

/// A queued task paired with its submission sequence number.
///
/// Ordering is by priority first, then by the lower sequence number, so the
/// max-heap pops the highest priority and, within a priority, the oldest entry.
pub(crate) struct QueueEntry {
  priority: Priority,
  seq: u64,
  task: Task,
}

impl Ord for QueueEntry {
  fn cmp(&self, other: &Self) -> Ordering {
    self
      .priority
      .cmp(&other.priority)
      .then_with(|| other.seq.cmp(&self.seq))
  }
}

impl PartialOrd for QueueEntry {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl PartialEq for QueueEntry {
  fn eq(&self, other: &Self) -> bool {
    self.priority == other.priority && self.seq == other.seq
  }
}

impl Eq for QueueEntry {}

/// Reason an `offer` failed. The task is handed back in both cases.
#[derive(Debug)]
pub(crate) enum OfferError {
  Full(Task),
  Closed(Task),
}

struct QueueState {
  heap: BinaryHeap<QueueEntry>,
  next_seq: u64,
  closed: bool,
}

/// A bounded, priority-ordered, multi-producer multi-consumer task queue.
///
/// Producers never wait: `offer` fails fast when the queue is full or closed.
/// Consumers suspend in `take` until an entry arrives or the queue is closed
/// and empty. There is no aging, so a steady stream of high priority work can
/// starve lower priorities indefinitely.
pub(crate) struct PriorityTaskQueue {
  state: Mutex<QueueState>,
  available: Notify,
  // Mirrors `heap.len()`, written under the lock and read without it.
  len: AtomicUsize,
  capacity: usize,
}

impl fmt::Debug for PriorityTaskQueue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PriorityTaskQueue")
      .field("len", &self.len())
      .field("capacity", &self.capacity)
      .finish_non_exhaustive()
  }
}

impl PriorityTaskQueue {
  /// Creates an empty queue. A zero capacity is raised to one.
  pub(crate) fn new(capacity: usize) -> Self {
    let capacity = capacity.max(1);
    Self {
      state: Mutex::new(QueueState {
        heap: BinaryHeap::with_capacity(capacity.min(4096)),
        next_seq: 0,
        closed: false,
      }),
      available: Notify::new(),
      len: AtomicUsize::new(0),
      capacity,
    }
  }

  /// Enqueues `task` unless the queue is closed or at capacity.
  pub(crate) fn offer(&self, task: Task) -> Result<(), OfferError> {
    {
      let mut state = self.state.lock();
      if state.closed {
        return Err(OfferError::Closed(task));
      }
      if state.heap.len() >= self.capacity {
        return Err(OfferError::Full(task));
      }

      let seq = state.next_seq;
      state.next_seq += 1;
      trace!(task_id = %task.id(), priority = %task.priority(), seq, "Queue: entry offered.");
      state.heap.push(QueueEntry {
        priority: task.priority(),
        seq,
        task,
      });
      self.len.store(state.heap.len(), AtomicOrdering::Release);
    }

    self.available.notify_one();
    Ok(())
  }

  /// Waits for the highest priority entry.
  ///
  /// Returns `None` once the queue is closed and no entries remain; entries
  /// offered before `close` are still handed out.
  pub(crate) async fn take(&self) -> Option<Task> {
    loop {
      let notified = self.available.notified();
      tokio::pin!(notified);
      // Register interest before inspecting the heap so an offer racing with
      // this check cannot be missed.
      notified.as_mut().enable();

      {
        let mut state = self.state.lock();
        if let Some(entry) = state.heap.pop() {
          self.len.store(state.heap.len(), AtomicOrdering::Release);
          trace!(task_id = %entry.task.id(), seq = entry.seq, "Queue: entry taken.");
          return Some(entry.task);
        }
        if state.closed {
          return None;
        }
      }

      notified.await;
    }
  }

  /// Stops accepting entries and wakes every waiting consumer.
  pub(crate) fn close(&self) {
    {
      let mut state = self.state.lock();
      if state.closed {
        return;
      }
      state.closed = true;
    }
    trace!("Queue: closed.");
    self.available.notify_waiters();
  }

  /// Closes the queue and removes every entry, highest priority first.
  ///
  /// Both happen under one lock, so no consumer can take an entry between
  /// the close and the drain.
  pub(crate) fn close_and_drain(&self) -> Vec<Task> {
    let drained = {
      let mut state = self.state.lock();
      state.closed = true;
      let mut drained = Vec::with_capacity(state.heap.len());
      while let Some(entry) = state.heap.pop() {
        drained.push(entry.task);
      }
      self.len.store(0, AtomicOrdering::Release);
      drained
    };
    trace!(drained = drained.len(), "Queue: closed and drained.");
    self.available.notify_waiters();
    drained
  }

  pub(crate) fn len(&self) -> usize {
    self.len.load(AtomicOrdering::Acquire)
  }

  pub(crate) fn capacity(&self) -> usize {
    self.capacity
  }

  #[cfg(test)]
  pub(crate) fn is_closed(&self) -> bool {
    self.state.lock().closed
  }
}
