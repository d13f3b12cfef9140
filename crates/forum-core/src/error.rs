//! Error types for `forum-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("gateway error: {0}")]
  Gateway(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("malformed record at {path}: {source}")]
  Malformed {
    path:   String,
    #[source]
    source: serde_json::Error,
  },

  #[error("invalid key: {0:?}")]
  InvalidKey(String),

  #[error("unknown vote choice: {0:?}")]
  UnknownChoice(String),
}

impl Error {
  /// Box any backend error into [`Error::Gateway`].
  pub fn gateway<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Gateway(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure of an authentication action, carrying a message fit for display.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct AuthFailure {
  pub message: String,
}

impl AuthFailure {
  pub fn from_error(err: &dyn std::error::Error) -> Self {
    Self { message: err.to_string() }
  }
}
