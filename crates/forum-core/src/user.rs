//! The authenticated identity as observed by the client.

use serde::{Deserialize, Serialize};

/// Organisational email suffix that marks an administrator.
pub const DEFAULT_ADMIN_DOMAIN: &str = "@ensas.uca.ma";

/// Shortest password an auth service accepts for a new identity.
pub const MIN_PASSWORD_LEN: usize = 6;

/// An identity owned by the auth service. The client only observes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub uid:   String,
  pub email: Option<String>,
}

impl User {
  /// Whether this user's email ends with `admin_domain`.
  ///
  /// A UI-level gate only; access control is the gateway's business.
  pub fn is_admin(&self, admin_domain: &str) -> bool {
    self
      .email
      .as_deref()
      .is_some_and(|email| email.ends_with(admin_domain))
  }
}

/// Canonical form under which identities are stored and looked up.
pub fn normalize_email(email: &str) -> String { email.trim().to_lowercase() }

#[cfg(test)]
mod tests {
  use super::*;

  fn user(email: Option<&str>) -> User {
    User { uid: "u1".into(), email: email.map(str::to_owned) }
  }

  #[test]
  fn admin_is_a_suffix_check() {
    assert!(user(Some("dean@ensas.uca.ma")).is_admin(DEFAULT_ADMIN_DOMAIN));
    assert!(!user(Some("dean@ensas.uca.ma.example.com")).is_admin(DEFAULT_ADMIN_DOMAIN));
    assert!(!user(Some("student@gmail.com")).is_admin(DEFAULT_ADMIN_DOMAIN));
    assert!(!user(None).is_admin(DEFAULT_ADMIN_DOMAIN));
  }

  #[test]
  fn emails_are_trimmed_and_lowercased() {
    assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
  }
}
