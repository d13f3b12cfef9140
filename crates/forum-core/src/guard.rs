//! Route table and the navigation guard consulted before every transition.

use std::sync::Arc;

use tracing::debug;

use crate::{gateway::AuthService, session::SessionManager};

/// Access tags attached to a route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteMeta {
  /// Only signed-in visitors may enter.
  pub requires_auth:  bool,
  /// Only signed-out visitors may enter.
  pub requires_guest: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
  pub name: &'static str,
  pub path: &'static str,
  pub meta: RouteMeta,
}

pub const HOME: Route = Route {
  name: "home",
  path: "/",
  meta: RouteMeta { requires_auth: false, requires_guest: false },
};

pub const LOGIN: Route = Route {
  name: "login",
  path: "/login",
  meta: RouteMeta { requires_auth: false, requires_guest: true },
};

pub const EVENTS: Route = Route {
  name: "events",
  path: "/events",
  meta: RouteMeta { requires_auth: true, requires_guest: false },
};

pub const ROUTES: [Route; 3] = [HOME, LOGIN, EVENTS];

/// Outcome of a guard check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
  Proceed,
  Redirect(Route),
}

/// The bare decision, given whether the visitor is signed in.
pub fn decide(to: &Route, authenticated: bool) -> Navigation {
  if to.meta.requires_auth && !authenticated {
    Navigation::Redirect(LOGIN)
  } else if to.meta.requires_guest && authenticated {
    Navigation::Redirect(EVENTS)
  } else {
    Navigation::Proceed
  }
}

/// Allows or redirects page transitions based on the session.
pub struct NavigationGuard<A> {
  session: Arc<SessionManager<A>>,
}

impl<A> NavigationGuard<A>
where
  A: AuthService + 'static,
{
  pub fn new(session: Arc<SessionManager<A>>) -> Self { Self { session } }

  /// Check a transition to `to`. While the session is still loading this
  /// starts the session listener and waits for its first resolution.
  pub async fn before_each(&self, to: &Route) -> Navigation {
    if self.session.is_loading() {
      self.session.init().await;
      self.session.ready().await;
    }

    let decision = decide(to, self.session.is_authenticated());
    debug!(route = to.name, ?decision, "navigation");
    decision
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{memory::MemoryGateway, user::DEFAULT_ADMIN_DOMAIN};

  #[test]
  fn decisions() {
    assert_eq!(decide(&EVENTS, false), Navigation::Redirect(LOGIN));
    assert_eq!(decide(&EVENTS, true), Navigation::Proceed);
    assert_eq!(decide(&LOGIN, true), Navigation::Redirect(EVENTS));
    assert_eq!(decide(&LOGIN, false), Navigation::Proceed);
    assert_eq!(decide(&HOME, false), Navigation::Proceed);
    assert_eq!(decide(&HOME, true), Navigation::Proceed);
  }

  #[test]
  fn route_table_paths() {
    let paths: Vec<_> = ROUTES.iter().map(|r| r.path).collect();
    assert_eq!(paths, ["/", "/login", "/events"]);
  }

  #[tokio::test]
  async fn guard_initialises_session_before_deciding() {
    let gw = Arc::new(MemoryGateway::new());
    gw.create_identity("a@example.com", "secret1").await.unwrap();

    let session = Arc::new(SessionManager::new(gw.clone(), DEFAULT_ADMIN_DOMAIN));
    let guard = NavigationGuard::new(session.clone());

    assert!(session.is_loading());
    assert_eq!(guard.before_each(&EVENTS).await, Navigation::Proceed);
    assert!(!session.is_loading());
    assert_eq!(guard.before_each(&LOGIN).await, Navigation::Redirect(EVENTS));

    session.logout().await.unwrap();
    assert_eq!(guard.before_each(&EVENTS).await, Navigation::Redirect(LOGIN));
  }
}
