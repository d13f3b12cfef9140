//! Error type for `forum-store-sqlite`.

use forum_core::user::MIN_PASSWORD_LEN;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("cannot store {0} here: collections and the root must be objects")]
  Shape(String),

  #[error("password hashing failed: {0}")]
  PasswordHash(String),

  #[error("the email address is badly formatted")]
  InvalidEmail,

  #[error("password should be at least {min} characters", min = MIN_PASSWORD_LEN)]
  WeakPassword,

  #[error("the email address is already in use by another account")]
  EmailInUse,

  #[error("invalid email or password")]
  InvalidCredentials,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
