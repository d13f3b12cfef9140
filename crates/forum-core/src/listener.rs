//! Ownership of a spawned subscription task.

use tokio::task::JoinHandle;

/// Aborts the wrapped task when dropped, which in turn drops the task's
/// [`Subscription`](crate::gateway::Subscription) and deregisters it.
#[derive(Debug)]
pub(crate) struct Listener(JoinHandle<()>);

impl Listener {
  pub(crate) fn spawn<F>(task: F) -> Self
  where
    F: Future<Output = ()> + Send + 'static,
  {
    Self(tokio::spawn(task))
  }
}

impl Drop for Listener {
  fn drop(&mut self) { self.0.abort(); }
}
