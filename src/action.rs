//! The unit of business logic a task carries, and the cooperative
//! interruption signal actions may consult while they run.

use std::future::Future;
use std::panic;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Error type an action may fail with.
pub type ActionError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Outcome of a single action execution.
pub type ActionResult = Result<(), ActionError>;

/// The boxed future an action produces for the worker to drive.
pub type ActionFuture = Pin<Box<dyn Future<Output = ActionResult> + Send + 'static>>;

/// Executable business logic of a task.
///
/// Implementations only describe the work. Threads, queuing and scheduling
/// belong to the executor. Any `Fn() -> impl Future` closure whose output is
/// `()` or `Result<(), E>` is a `TaskAction`.
pub trait TaskAction: Send + Sync + 'static {
  fn execute(&self) -> ActionFuture;

  /// Whether the worker may drop the action's future once it is interrupted.
  ///
  /// Work running off the async runtime cannot be dropped mid-way. Such
  /// actions return `false`; the worker keeps waiting for them and they see
  /// the interrupt through [`is_interrupted`].
  fn abandon_on_interrupt(&self) -> bool {
    true
  }
}

/// Conversion of an action's output into an [`ActionResult`].
pub trait IntoActionResult {
  fn into_action_result(self) -> ActionResult;
}

impl IntoActionResult for () {
  fn into_action_result(self) -> ActionResult {
    Ok(())
  }
}

impl<E> IntoActionResult for Result<(), E>
where
  E: Into<ActionError>,
{
  fn into_action_result(self) -> ActionResult {
    self.map_err(Into::into)
  }
}

impl<F, Fut> TaskAction for F
where
  F: Fn() -> Fut + Send + Sync + 'static,
  Fut: Future + Send + 'static,
  Fut::Output: IntoActionResult,
{
  fn execute(&self) -> ActionFuture {
    let future = self();
    Box::pin(async move { future.await.into_action_result() })
  }
}

tokio::task_local! {
  static INTERRUPT: CancellationToken;
}

/// Returns the interruption token of the task currently executing on this
/// worker, or `None` when called outside of an executor task.
pub fn interruption_token() -> Option<CancellationToken> {
  INTERRUPT.try_with(|token| token.clone()).ok()
}

/// `true` once the executing task has been asked to stop, either by
/// `shutdown_now` or by an explicit interrupt.
pub fn is_interrupted() -> bool {
  INTERRUPT.try_with(|token| token.is_cancelled()).unwrap_or(false)
}

/// Builds the action's future with `token` installed as the interruption
/// signal, both for the synchronous `execute` call and for every poll.
pub(crate) fn scoped_execute(
  action: &Arc<dyn TaskAction>,
  token: CancellationToken,
) -> std::thread::Result<impl Future<Output = ActionResult> + Send + 'static> {
  let future = INTERRUPT.sync_scope(token.clone(), || {
    panic::catch_unwind(panic::AssertUnwindSafe(|| action.execute()))
  })?;
  Ok(INTERRUPT.scope(token, future))
}

/// A synchronous closure run on Tokio's blocking thread pool.
///
/// Created with [`blocking`]. Inside the closure, [`is_interrupted`] reflects
/// the interruption state of the owning task.
pub struct Blocking<F> {
  f: Arc<F>,
}

/// Wraps a synchronous closure so it can be submitted as a task action
/// without stalling the runtime's worker threads.
///
/// An interrupted blocking action cannot be preempted. Its worker stays busy
/// until the closure returns, so it should check [`is_interrupted`] between
/// units of work.
pub fn blocking<F, R>(f: F) -> Blocking<F>
where
  F: Fn() -> R + Send + Sync + 'static,
  R: IntoActionResult + Send + 'static,
{
  Blocking { f: Arc::new(f) }
}

impl<F, R> TaskAction for Blocking<F>
where
  F: Fn() -> R + Send + Sync + 'static,
  R: IntoActionResult + Send + 'static,
{
  fn execute(&self) -> ActionFuture {
    let f = self.f.clone();
    Box::pin(async move {
      let token = interruption_token().unwrap_or_else(CancellationToken::new);
      let joined = tokio::task::spawn_blocking(move || INTERRUPT.sync_scope(token, || f().into_action_result())).await;
      match joined {
        Ok(result) => result,
        // Re-raise so the worker records the panic against this task.
        Err(join_error) if join_error.is_panic() => panic::resume_unwind(join_error.into_panic()),
        Err(join_error) => Err(join_error.into()),
      }
    })
  }

  fn abandon_on_interrupt(&self) -> bool {
    false
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  #[derive(Debug)]
  struct Boom;

  impl std::fmt::Display for Boom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.write_str("boom")
    }
  }

  impl std::error::Error for Boom {}

  #[tokio::test]
  async fn test_closure_actions_map_outputs() {
    let unit = || async {};
    assert!(unit.execute().await.is_ok());

    let failing = || async { Err::<(), _>(Boom) };
    let err = failing.execute().await.unwrap_err();
    assert_eq!(err.to_string(), "boom");
  }

  #[tokio::test]
  async fn test_closure_action_runs_each_time() {
    let counter = Arc::new(AtomicUsize::new(0));
    let c = counter.clone();
    let action = move || {
      let c = c.clone();
      async move {
        c.fetch_add(1, Ordering::SeqCst);
      }
    };
    action.execute().await.unwrap();
    action.execute().await.unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_interruption_visible_inside_scope() {
    assert!(interruption_token().is_none());
    assert!(!is_interrupted());

    let action: Arc<dyn TaskAction> = Arc::new(|| async {
      if is_interrupted() {
        Err::<(), ActionError>("interrupted".into())
      } else {
        Ok(())
      }
    });

    let token = CancellationToken::new();
    let future = scoped_execute(&action, token.clone()).ok().unwrap();
    assert!(future.await.is_ok());

    token.cancel();
    let future = scoped_execute(&action, token).ok().unwrap();
    assert!(future.await.is_err());
  }

  #[tokio::test]
  async fn test_blocking_action_sees_interrupt() {
    let action: Arc<dyn TaskAction> = Arc::new(blocking(|| {
      if is_interrupted() {
        Err::<(), ActionError>("stopped".into())
      } else {
        Ok(())
      }
    }));

    let token = CancellationToken::new();
    token.cancel();
    let result = scoped_execute(&action, token).ok().unwrap().await;
    assert_eq!(result.unwrap_err().to_string(), "stopped");
  }

  #[test]
  fn test_only_async_actions_are_abandoned_on_interrupt() {
    let async_action = || async {};
    assert!(async_action.abandon_on_interrupt());
    assert!(!blocking(|| {}).abandon_on_interrupt());
  }

  #[test]
  fn test_panic_while_building_future_is_caught() {
    struct Explodes;
    impl TaskAction for Explodes {
      fn execute(&self) -> ActionFuture {
        panic!("refusing to build a future");
      }
    }
    let action: Arc<dyn TaskAction> = Arc::new(Explodes);
    assert!(scoped_execute(&action, CancellationToken::new()).is_err());
  }
}
