//! Conversions between domain values and the plain-text column
//! representations stored in SQLite.
//!
//! Timestamps are RFC 3339 strings; document values are compact JSON.

use chrono::{DateTime, Utc};
use forum_core::user::User;
use serde_json::Value;

use crate::Error;

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

// ─── Document values ─────────────────────────────────────────────────────────

/// Box a JSON failure so it can leave a `tokio_rusqlite` closure.
fn json_failure(e: serde_json::Error) -> tokio_rusqlite::Error {
  tokio_rusqlite::Error::Other(Box::new(Error::Json(e)))
}

pub fn encode_value(v: &Value) -> tokio_rusqlite::Result<String> {
  serde_json::to_string(v).map_err(json_failure)
}

pub fn decode_value(s: &str) -> tokio_rusqlite::Result<Value> {
  serde_json::from_str(s).map_err(json_failure)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read from an `identities` row.
pub struct RawIdentity {
  pub uid:           String,
  pub email:         String,
  pub password_hash: String,
}

impl RawIdentity {
  pub fn into_user(self) -> User { User { uid: self.uid, email: Some(self.email) } }
}
