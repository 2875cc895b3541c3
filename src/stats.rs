use crate::notifier::TaskCompletionStatus;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};

/// Point-in-time view of an executor's counters.
///
/// Each field is read independently; there is no cross-field consistency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutorStats {
  active_threads: usize,
  largest_active_threads: usize,
  pool_size: usize,
  queued_tasks: usize,
  submitted_tasks: u64,
  completed_tasks: u64,
  failed_tasks: u64,
  panicked_tasks: u64,
  interrupted_tasks: u64,
  rejected_tasks: u64,
  discarded_tasks: u64,
}

impl ExecutorStats {
  /// Workers currently executing an action.
  pub fn active_threads(&self) -> usize {
    self.active_threads
  }

  /// Highest number of simultaneously executing actions seen so far.
  pub fn largest_active_threads(&self) -> usize {
    self.largest_active_threads
  }

  /// Configured number of workers, busy or idle.
  pub fn pool_size(&self) -> usize {
    self.pool_size
  }

  /// Tasks waiting in the queue.
  pub fn queued_tasks(&self) -> usize {
    self.queued_tasks
  }

  /// Tasks accepted by `submit`.
  pub fn submitted_tasks(&self) -> u64 {
    self.submitted_tasks
  }

  /// Executions that ended, whatever their outcome.
  pub fn completed_tasks(&self) -> u64 {
    self.completed_tasks
  }

  /// Completed executions that returned an error or panicked.
  pub fn failed_tasks(&self) -> u64 {
    self.failed_tasks
  }

  pub fn panicked_tasks(&self) -> u64 {
    self.panicked_tasks
  }

  /// Completed executions cut short by an interrupt.
  pub fn interrupted_tasks(&self) -> u64 {
    self.interrupted_tasks
  }

  /// Submissions turned away.
  pub fn rejected_tasks(&self) -> u64 {
    self.rejected_tasks
  }

  /// Accepted tasks dropped unexecuted by an immediate shutdown.
  pub fn discarded_tasks(&self) -> u64 {
    self.discarded_tasks
  }
}

/// Lock-free counters shared by the workers and the submitting side.
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
  active: AtomicUsize,
  largest_active: AtomicUsize,
  submitted: AtomicU64,
  completed: AtomicU64,
  failed: AtomicU64,
  panicked: AtomicU64,
  interrupted: AtomicU64,
  rejected: AtomicU64,
  discarded: AtomicU64,
}

impl StatsRecorder {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  pub(crate) fn record_submitted(&self) {
    self.submitted.fetch_add(1, AtomicOrdering::Relaxed);
  }

  pub(crate) fn record_rejected(&self) {
    self.rejected.fetch_add(1, AtomicOrdering::Relaxed);
  }

  pub(crate) fn record_discarded(&self, count: usize) {
    self.discarded.fetch_add(count as u64, AtomicOrdering::Relaxed);
  }

  /// Marks one worker as busy.
  pub(crate) fn record_started(&self) {
    let now_active = self.active.fetch_add(1, AtomicOrdering::AcqRel) + 1;
    self.largest_active.fetch_max(now_active, AtomicOrdering::Relaxed);
  }

  /// Marks one worker as idle again and counts the finished execution.
  pub(crate) fn record_finished(&self, status: &TaskCompletionStatus) {
    match status {
      TaskCompletionStatus::Success | TaskCompletionStatus::Discarded => {}
      TaskCompletionStatus::Failed => {
        self.failed.fetch_add(1, AtomicOrdering::Relaxed);
      }
      TaskCompletionStatus::Panicked => {
        self.failed.fetch_add(1, AtomicOrdering::Relaxed);
        self.panicked.fetch_add(1, AtomicOrdering::Relaxed);
      }
      TaskCompletionStatus::Interrupted => {
        self.interrupted.fetch_add(1, AtomicOrdering::Relaxed);
      }
    }
    self.completed.fetch_add(1, AtomicOrdering::AcqRel);
    self.active.fetch_sub(1, AtomicOrdering::AcqRel);
  }

  pub(crate) fn snapshot(&self, pool_size: usize, queued_tasks: usize) -> ExecutorStats {
    ExecutorStats {
      active_threads: self.active.load(AtomicOrdering::Acquire),
      largest_active_threads: self.largest_active.load(AtomicOrdering::Relaxed),
      pool_size,
      queued_tasks,
      submitted_tasks: self.submitted.load(AtomicOrdering::Relaxed),
      completed_tasks: self.completed.load(AtomicOrdering::Acquire),
      failed_tasks: self.failed.load(AtomicOrdering::Relaxed),
      panicked_tasks: self.panicked.load(AtomicOrdering::Relaxed),
      interrupted_tasks: self.interrupted.load(AtomicOrdering::Relaxed),
      rejected_tasks: self.rejected.load(AtomicOrdering::Relaxed),
      discarded_tasks: self.discarded.load(AtomicOrdering::Relaxed),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  #[test]
  fn test_breakdown_counters_refine_completed() {
    let stats = StatsRecorder::new();
    for status in [
      TaskCompletionStatus::Success,
      TaskCompletionStatus::Failed,
      TaskCompletionStatus::Panicked,
      TaskCompletionStatus::Interrupted,
    ] {
      stats.record_started();
      stats.record_finished(&status);
    }
    stats.record_rejected();
    stats.record_discarded(3);

    let snapshot = stats.snapshot(4, 0);
    assert_eq!(snapshot.completed_tasks(), 4);
    assert_eq!(snapshot.failed_tasks(), 2);
    assert_eq!(snapshot.panicked_tasks(), 1);
    assert_eq!(snapshot.interrupted_tasks(), 1);
    assert_eq!(snapshot.rejected_tasks(), 1);
    assert_eq!(snapshot.discarded_tasks(), 3);
    assert_eq!(snapshot.active_threads(), 0);
    assert_eq!(snapshot.largest_active_threads(), 1);
    assert_eq!(snapshot.pool_size(), 4);
  }

  #[test]
  fn test_largest_active_tracks_peak() {
    let stats = StatsRecorder::new();
    stats.record_started();
    stats.record_started();
    stats.record_started();
    stats.record_finished(&TaskCompletionStatus::Success);
    stats.record_started();

    let snapshot = stats.snapshot(8, 2);
    assert_eq!(snapshot.active_threads(), 3);
    assert_eq!(snapshot.largest_active_threads(), 3);
    assert_eq!(snapshot.queued_tasks(), 2);
  }

  #[test]
  fn test_concurrent_updates_are_not_lost() {
    let stats = Arc::new(StatsRecorder::new());
    let threads: Vec<_> = (0..8)
      .map(|_| {
        let stats = stats.clone();
        std::thread::spawn(move || {
          for _ in 0..1_000 {
            stats.record_submitted();
            stats.record_started();
            stats.record_finished(&TaskCompletionStatus::Success);
          }
        })
      })
      .collect();
    for thread in threads {
      thread.join().unwrap();
    }

    let snapshot = stats.snapshot(8, 0);
    assert_eq!(snapshot.submitted_tasks(), 8_000);
    assert_eq!(snapshot.completed_tasks(), 8_000);
    assert_eq!(snapshot.active_threads(), 0);
    assert!(snapshot.largest_active_threads() <= 8);
  }
}
