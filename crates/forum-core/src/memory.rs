//! [`MemoryGateway`] — an in-process implementation of both gateway ports.
//!
//! Everything lives in one JSON tree behind a mutex and disappears with the
//! process. Passwords are kept in plain text: this gateway exists for tests
//! and throwaway sessions, never for real identities.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::{
  gateway::{AuthService, DocumentStore, Snapshot, Subscription},
  tree::{self, Mutation},
  user::{MIN_PASSWORD_LEN, User, normalize_email},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
  #[error("gateway unavailable for {0:?}")]
  Unavailable(String),

  #[error("the email address is badly formatted")]
  InvalidEmail,

  #[error("password should be at least {min} characters", min = MIN_PASSWORD_LEN)]
  WeakPassword,

  #[error("the email address is already in use by another account")]
  EmailInUse,

  #[error("invalid email or password")]
  InvalidCredentials,
}

// ─── State ───────────────────────────────────────────────────────────────────

struct Watcher<T> {
  id: u64,
  tx: mpsc::UnboundedSender<T>,
}

struct DocWatcher {
  path:    Vec<String>,
  watcher: Watcher<Snapshot>,
}

struct Identity {
  email:    String,
  password: String,
  user:     User,
}

#[derive(Default)]
struct State {
  root:          Value,
  doc_watchers:  Vec<DocWatcher>,
  identities:    Vec<Identity>,
  session:       Option<User>,
  auth_watchers: Vec<Watcher<Option<User>>>,
  next_id:       u64,
  failing:       Vec<Vec<String>>,
  auth_failing:  bool,
}

impl State {
  fn next_id(&mut self) -> u64 {
    self.next_id += 1;
    self.next_id
  }

  fn check(&self, segments: &[&str]) -> Result<(), MemoryError> {
    if self.failing.iter().any(|f| tree::related(f.as_slice(), segments)) {
      return Err(MemoryError::Unavailable(tree::join(segments)));
    }
    Ok(())
  }

  fn snapshot(&self, segments: &[&str]) -> Snapshot {
    Snapshot::new(tree::join(segments), tree::get(&self.root, segments).cloned())
  }

  /// Push fresh snapshots to every watcher that can see `changed`, dropping
  /// watchers whose receiver is gone.
  fn notify(&mut self, changed: &[&str]) {
    let root = &self.root;
    self.doc_watchers.retain(|w| {
      if !tree::related(w.path.as_slice(), changed) {
        return true;
      }
      let segments: Vec<&str> = w.path.iter().map(String::as_str).collect();
      let snapshot = Snapshot::new(w.path.join("/"), tree::get(root, &segments).cloned());
      w.watcher.tx.send(snapshot).is_ok()
    });
  }

  fn set_session(&mut self, user: Option<User>) {
    self.session = user;
    let current = self.session.clone();
    self
      .auth_watchers
      .retain(|w| w.tx.send(current.clone()).is_ok());
  }

  fn check_auth(&self) -> Result<(), MemoryError> {
    if self.auth_failing {
      return Err(MemoryError::Unavailable("auth".into()));
    }
    Ok(())
  }
}

// ─── Gateway ─────────────────────────────────────────────────────────────────

/// An in-memory document store and auth service.
///
/// Cloning is cheap and every clone shares the same data.
#[derive(Clone, Default)]
pub struct MemoryGateway {
  state: Arc<Mutex<State>>,
}

impl MemoryGateway {
  pub fn new() -> Self { Self::default() }

  /// Seed the tree with `value` at `path` without notifying anyone.
  pub fn with_value(self, path: &str, value: Value) -> Self {
    tree::set(&mut self.state.lock().root, &tree::segments(path), value);
    self
  }

  /// Make every document operation touching `path` (or anything above or
  /// below it) fail until [`heal`](Self::heal) is called.
  pub fn fail_under(&self, path: &str) {
    let segments = tree::segments(path).into_iter().map(str::to_owned).collect();
    self.state.lock().failing.push(segments);
  }

  /// Make every auth operation fail until [`heal`](Self::heal) is called.
  pub fn fail_auth(&self) { self.state.lock().auth_failing = true; }

  pub fn heal(&self) {
    let mut state = self.state.lock();
    state.failing.clear();
    state.auth_failing = false;
  }

  /// Number of live document subscriptions.
  pub fn subscriber_count(&self) -> usize { self.state.lock().doc_watchers.len() }

  fn mutate(&self, path: &str, mutation: Mutation) -> Result<(), MemoryError> {
    let segments = tree::segments(path);
    let mut state = self.state.lock();
    state.check(&segments)?;
    mutation.apply(&mut state.root, &segments);
    state.notify(&segments);
    Ok(())
  }

  fn unwatch_docs(state: &Weak<Mutex<State>>, id: u64) {
    if let Some(state) = state.upgrade() {
      state.lock().doc_watchers.retain(|w| w.watcher.id != id);
    }
  }

  fn unwatch_auth(state: &Weak<Mutex<State>>, id: u64) {
    if let Some(state) = state.upgrade() {
      state.lock().auth_watchers.retain(|w| w.id != id);
    }
  }
}

impl DocumentStore for MemoryGateway {
  type Error = MemoryError;

  async fn read(&self, path: &str) -> Result<Snapshot, MemoryError> {
    let segments = tree::segments(path);
    let state = self.state.lock();
    state.check(&segments)?;
    Ok(state.snapshot(&segments))
  }

  async fn write(&self, path: &str, value: Value) -> Result<(), MemoryError> {
    self.mutate(path, Mutation::Set(value))
  }

  async fn partial_update(
    &self,
    path: &str,
    fields: Map<String, Value>,
  ) -> Result<(), MemoryError> {
    self.mutate(path, Mutation::Merge(fields))
  }

  async fn create_if_absent(&self, path: &str, value: Value) -> Result<bool, MemoryError> {
    let segments = tree::segments(path);
    let mut state = self.state.lock();
    state.check(&segments)?;
    if state.snapshot(&segments).exists() {
      return Ok(false);
    }
    tree::set(&mut state.root, &segments, value);
    state.notify(&segments);
    Ok(true)
  }

  async fn subscribe(&self, path: &str) -> Result<Subscription<Snapshot>, MemoryError> {
    let segments = tree::segments(path);
    let (tx, rx) = mpsc::unbounded_channel();

    let id = {
      let mut state = self.state.lock();
      state.check(&segments)?;
      // The receiver is alive, so this cannot fail.
      tx.send(state.snapshot(&segments)).ok();
      let id = state.next_id();
      state.doc_watchers.push(DocWatcher {
        path:    segments.iter().map(|s| (*s).to_owned()).collect(),
        watcher: Watcher { id, tx },
      });
      id
    };
    debug!(path, id, "document subscription registered");

    let weak = Arc::downgrade(&self.state);
    Ok(Subscription::new(rx, move || Self::unwatch_docs(&weak, id)))
  }
}

impl AuthService for MemoryGateway {
  type Error = MemoryError;

  async fn create_identity(&self, email: &str, password: &str) -> Result<User, MemoryError> {
    let email = normalize_email(email);
    if !email.contains('@') {
      return Err(MemoryError::InvalidEmail);
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
      return Err(MemoryError::WeakPassword);
    }

    let mut state = self.state.lock();
    state.check_auth()?;
    if state.identities.iter().any(|i| i.email == email) {
      return Err(MemoryError::EmailInUse);
    }

    let user = User {
      uid:   Uuid::new_v4().simple().to_string(),
      email: Some(email.clone()),
    };
    state.identities.push(Identity {
      email,
      password: password.to_owned(),
      user: user.clone(),
    });
    state.set_session(Some(user.clone()));
    Ok(user)
  }

  async fn authenticate(&self, email: &str, password: &str) -> Result<User, MemoryError> {
    let email = normalize_email(email);
    let mut state = self.state.lock();
    state.check_auth()?;
    let user = state
      .identities
      .iter()
      .find(|i| i.email == email && i.password == password)
      .map(|i| i.user.clone())
      .ok_or(MemoryError::InvalidCredentials)?;
    state.set_session(Some(user.clone()));
    Ok(user)
  }

  async fn end_session(&self) -> Result<(), MemoryError> {
    let mut state = self.state.lock();
    state.check_auth()?;
    state.set_session(None);
    Ok(())
  }

  async fn on_session_change(&self) -> Result<Subscription<Option<User>>, MemoryError> {
    let (tx, rx) = mpsc::unbounded_channel();
    let id = {
      let mut state = self.state.lock();
      state.check_auth()?;
      tx.send(state.session.clone()).ok();
      let id = state.next_id();
      state.auth_watchers.push(Watcher { id, tx });
      id
    };

    let weak = Arc::downgrade(&self.state);
    Ok(Subscription::new(rx, move || Self::unwatch_auth(&weak, id)))
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use serde_json::json;

  use super::*;

  #[tokio::test]
  async fn read_missing_path_is_absent() {
    let gw = MemoryGateway::new();
    let snap = gw.read("events/nope").await.unwrap();
    assert!(!snap.exists());
    assert_eq!(snap.key(), "nope");
  }

  #[tokio::test]
  async fn create_if_absent_refuses_second_write() {
    let gw = MemoryGateway::new();
    assert!(gw.create_if_absent("votes/e1_u1", json!({ "vote": "yes" })).await.unwrap());
    assert!(!gw.create_if_absent("votes/e1_u1", json!({ "vote": "no" })).await.unwrap());

    let snap = gw.read("votes/e1_u1").await.unwrap();
    assert_eq!(snap.val(), Some(&json!({ "vote": "yes" })));
  }

  #[tokio::test]
  async fn subscription_sees_initial_value_and_descendant_writes() {
    let gw = MemoryGateway::new().with_value("events/e1", json!({ "title": "A" }));
    let mut sub = gw.subscribe("events").await.unwrap();

    let first = sub.next().await.unwrap();
    assert_eq!(first.val(), Some(&json!({ "e1": { "title": "A" } })));

    gw.write("events/e2", json!({ "title": "B" })).await.unwrap();
    let second = sub.next().await.unwrap();
    assert_eq!(second.children().count(), 2);

    // Unrelated subtree: no push.
    gw.write("votes/x", json!(1)).await.unwrap();
    let pending = tokio::time::timeout(Duration::from_millis(20), sub.next()).await;
    assert!(pending.is_err());
  }

  #[tokio::test]
  async fn dropping_subscription_deregisters_watcher() {
    let gw = MemoryGateway::new();
    let sub = gw.subscribe("events").await.unwrap();
    assert_eq!(gw.subscriber_count(), 1);
    drop(sub);
    assert_eq!(gw.subscriber_count(), 0);
  }

  #[tokio::test]
  async fn injected_failures_cover_the_subtree() {
    let gw = MemoryGateway::new();
    gw.fail_under("events");
    assert!(matches!(gw.read("events/e1").await, Err(MemoryError::Unavailable(_))));
    assert!(gw.read("votes").await.is_ok());
    gw.heal();
    assert!(gw.read("events/e1").await.is_ok());
  }

  #[tokio::test]
  async fn sign_up_sign_in_and_session_pushes() {
    let gw = MemoryGateway::new();
    let mut session = gw.on_session_change().await.unwrap();
    assert_eq!(session.next().await, Some(None));

    let created = gw.create_identity("Alice@Example.com", "secret1").await.unwrap();
    assert_eq!(created.email.as_deref(), Some("alice@example.com"));
    assert_eq!(session.next().await, Some(Some(created.clone())));

    gw.end_session().await.unwrap();
    assert_eq!(session.next().await, Some(None));

    let again = gw.authenticate("alice@example.com", "secret1").await.unwrap();
    assert_eq!(again, created);
    assert_eq!(
      gw.authenticate("alice@example.com", "wrong!!").await,
      Err(MemoryError::InvalidCredentials)
    );
  }

  #[tokio::test]
  async fn identity_validation() {
    let gw = MemoryGateway::new();
    assert_eq!(gw.create_identity("nobody", "secret1").await, Err(MemoryError::InvalidEmail));
    assert_eq!(gw.create_identity("a@b.c", "123").await, Err(MemoryError::WeakPassword));
    gw.create_identity("a@b.c", "123456").await.unwrap();
    assert_eq!(gw.create_identity("A@B.C", "654321").await, Err(MemoryError::EmailInUse));
  }
}
