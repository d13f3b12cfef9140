//! [`SessionManager`] — the client's current-user state.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::{
  AuthFailure,
  gateway::AuthService,
  listener::Listener,
  user::User,
};

/// Current user plus the "not resolved yet" flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
  pub user:    Option<User>,
  pub loading: bool,
}

impl Default for SessionState {
  fn default() -> Self { Self { user: None, loading: true } }
}

pub struct SessionManager<A> {
  auth:         Arc<A>,
  admin_domain: String,
  state:        Arc<watch::Sender<SessionState>>,
  listener:     Mutex<Option<Listener>>,
}

impl<A> SessionManager<A>
where
  A: AuthService + 'static,
{
  /// `admin_domain` is the email suffix that marks administrators.
  pub fn new(auth: Arc<A>, admin_domain: impl Into<String>) -> Self {
    Self {
      auth,
      admin_domain: admin_domain.into(),
      state: Arc::new(watch::Sender::new(SessionState::default())),
      listener: Mutex::new(None),
    }
  }

  pub fn state(&self) -> watch::Receiver<SessionState> { self.state.subscribe() }

  pub fn current_user(&self) -> Option<User> { self.state.borrow().user.clone() }

  pub fn is_loading(&self) -> bool { self.state.borrow().loading }

  pub fn is_authenticated(&self) -> bool { self.state.borrow().user.is_some() }

  pub fn user_email(&self) -> Option<String> {
    self.state.borrow().user.as_ref().and_then(|u| u.email.clone())
  }

  pub fn is_admin(&self) -> bool {
    self
      .state
      .borrow()
      .user
      .as_ref()
      .is_some_and(|u| u.is_admin(&self.admin_domain))
  }

  // ── Actions ───────────────────────────────────────────────────────────────

  /// Register a new identity; on success it becomes the current user.
  pub async fn sign_up(&self, email: &str, password: &str) -> Result<User, AuthFailure> {
    let user = self
      .auth
      .create_identity(email, password)
      .await
      .map_err(|e| AuthFailure::from_error(&e))?;
    info!(uid = %user.uid, "signed up");
    self.set_user(Some(user.clone()));
    Ok(user)
  }

  /// Sign in an existing identity; on success it becomes the current user.
  pub async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthFailure> {
    let user = self
      .auth
      .authenticate(email, password)
      .await
      .map_err(|e| AuthFailure::from_error(&e))?;
    info!(uid = %user.uid, "signed in");
    self.set_user(Some(user.clone()));
    Ok(user)
  }

  /// End the gateway session and forget the current user.
  pub async fn logout(&self) -> Result<(), AuthFailure> {
    self
      .auth
      .end_session()
      .await
      .map_err(|e| AuthFailure::from_error(&e))?;
    info!("signed out");
    self.set_user(None);
    Ok(())
  }

  /// Follow the gateway's session: every change (including the initial
  /// resolution, applied before this returns) sets the current user and
  /// clears the loading flag.
  ///
  /// A second call while a listener is running does nothing. If the
  /// gateway refuses the subscription the loading flag is cleared anyway,
  /// leaving the visitor signed out.
  pub async fn init(&self) {
    if self.listener.lock().is_some() {
      debug!("session listener already running");
      return;
    }

    let mut subscription = match self.auth.on_session_change().await {
      Ok(sub) => sub,
      Err(e) => {
        error!(error = %e, "failed to watch auth session");
        self.state.send_modify(|s| s.loading = false);
        return;
      }
    };

    if let Some(user) = subscription.next().await {
      resolve(&self.state, user);
    }

    let state = self.state.clone();
    let listener = Listener::spawn(async move {
      while let Some(user) = subscription.next().await {
        resolve(&state, user);
      }
    });
    *self.listener.lock() = Some(listener);
  }

  /// Resolves once the loading flag has been cleared.
  pub async fn ready(&self) {
    let mut rx = self.state.subscribe();
    if rx.wait_for(|s| !s.loading).await.is_err() {
      debug!("session state closed before resolving");
    }
  }

  fn set_user(&self, user: Option<User>) { self.state.send_modify(|s| s.user = user); }
}

fn resolve(state: &watch::Sender<SessionState>, user: Option<User>) {
  debug!(signed_in = user.is_some(), "auth session resolved");
  state.send_modify(|s| {
    s.user = user;
    s.loading = false;
  });
}
