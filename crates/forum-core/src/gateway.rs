//! Ports to the remote data gateway: a hierarchical document store with
//! change subscriptions, and an email/password authentication service.
//!
//! Backends (`forum-store-sqlite`, [`crate::memory::MemoryGateway`])
//! implement these traits; the repositories and the session manager depend
//! only on the abstraction.

use std::future::Future;

use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::{tree, user::User};

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// A point-in-time read of the node at a path.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
  path:  String,
  value: Option<Value>,
}

impl Snapshot {
  /// `null` and empty objects are reported as absent.
  pub fn new(path: impl Into<String>, value: Option<Value>) -> Self {
    Self {
      path:  path.into(),
      value: value.filter(|v| !tree::is_vacant(v)),
    }
  }

  pub fn path(&self) -> &str { &self.path }

  /// The last segment of the path (the record key).
  pub fn key(&self) -> &str {
    self.path.rsplit('/').find(|s| !s.is_empty()).unwrap_or_default()
  }

  pub fn exists(&self) -> bool { self.value.is_some() }

  pub fn val(&self) -> Option<&Value> { self.value.as_ref() }

  pub fn into_val(self) -> Option<Value> { self.value }

  /// Immediate children of an object value, in key order.
  pub fn children(&self) -> impl Iterator<Item = (&str, &Value)> {
    self
      .value
      .as_ref()
      .and_then(Value::as_object)
      .into_iter()
      .flat_map(|map| map.iter().map(|(k, v)| (k.as_str(), v)))
  }
}

// ─── Subscription ────────────────────────────────────────────────────────────

/// A standing subscription. Items arrive in order; the subscription is torn
/// down when the handle is cancelled or dropped.
pub struct Subscription<T> {
  rx:     mpsc::UnboundedReceiver<T>,
  cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> Subscription<T> {
  /// Wrap a receiver together with the backend's teardown routine.
  pub fn new(
    rx: mpsc::UnboundedReceiver<T>,
    cancel: impl FnOnce() + Send + 'static,
  ) -> Self {
    Self { rx, cancel: Some(Box::new(cancel)) }
  }

  /// Wait for the next pushed value. `None` once the backend hangs up.
  pub async fn next(&mut self) -> Option<T> { self.rx.recv().await }

  pub fn cancel(mut self) { self.teardown(); }

  fn teardown(&mut self) {
    if let Some(cancel) = self.cancel.take() {
      cancel();
    }
  }
}

impl<T> Drop for Subscription<T> {
  fn drop(&mut self) { self.teardown(); }
}

impl<T> std::fmt::Debug for Subscription<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription")
      .field("active", &self.cancel.is_some())
      .finish()
  }
}

// ─── Document store ──────────────────────────────────────────────────────────

/// Keyed, hierarchical document storage.
///
/// All methods return `Send` futures so implementations can be driven from
/// spawned tokio tasks.
pub trait DocumentStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// One-shot read of the node at `path`.
  fn read<'a>(
    &'a self,
    path: &'a str,
  ) -> impl Future<Output = Result<Snapshot, Self::Error>> + Send + 'a;

  /// Overwrite the node at `path`. Writing `null` removes it.
  fn write<'a>(
    &'a self,
    path: &'a str,
    value: Value,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Merge only the named fields into the node at `path`.
  fn partial_update<'a>(
    &'a self,
    path: &'a str,
    fields: Map<String, Value>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Atomically write `value` at `path` only if nothing is stored there.
  /// Returns `false` without writing when the node already exists.
  fn create_if_absent<'a>(
    &'a self,
    path: &'a str,
    value: Value,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Watch the subtree rooted at `path`. The current snapshot is delivered
  /// immediately, then a fresh one after every change to the subtree.
  fn subscribe<'a>(
    &'a self,
    path: &'a str,
  ) -> impl Future<Output = Result<Subscription<Snapshot>, Self::Error>> + Send + 'a;
}

// ─── Authentication ──────────────────────────────────────────────────────────

/// Email/password identity management with a single current session.
pub trait AuthService: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Register a new identity and sign it in.
  fn create_identity<'a>(
    &'a self,
    email: &'a str,
    password: &'a str,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + 'a;

  /// Sign in an existing identity.
  fn authenticate<'a>(
    &'a self,
    email: &'a str,
    password: &'a str,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + 'a;

  /// Clear the current session.
  fn end_session(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Watch the current session. The first item is the initial resolution
  /// (possibly `None`); every sign-in or sign-out pushes another.
  fn on_session_change(
    &self,
  ) -> impl Future<Output = Result<Subscription<Option<User>>, Self::Error>> + Send + '_;
}
