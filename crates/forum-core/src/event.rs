//! Events: the things users vote on.
//!
//! Events are created outside this application. The client reads them and
//! maintains the denormalised `yesVotes` / `noVotes` counters.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::{Error, Result, gateway::Snapshot};

/// A scheduled event with its vote counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
  /// The storage key; attached on read, never stored in the record.
  #[serde(default, skip_serializing)]
  pub id:         String,
  pub title:      String,
  #[serde(with = "iso_date")]
  pub date:       DateTime<Utc>,
  #[serde(default)]
  pub yes_votes:  u64,
  #[serde(default)]
  pub no_votes:   u64,
  #[serde(default, skip_serializing_if = "Option::is_none", with = "iso_date_opt")]
  pub updated_at: Option<DateTime<Utc>>,
}

impl Event {
  /// Decode the record stored under `key`, attaching the key as `id`.
  pub fn from_record(key: &str, value: &Value) -> Result<Self> {
    let mut event = Self::deserialize(value).map_err(|source| Error::Malformed {
      path: format!("{}/{key}", crate::EVENTS),
      source,
    })?;
    event.id = key.to_owned();
    Ok(event)
  }

  /// Decode every child of a collection snapshot, skipping (and logging)
  /// records that do not match the schema.
  pub fn from_collection(snapshot: &Snapshot) -> Vec<Self> {
    snapshot
      .children()
      .filter_map(|(key, value)| match Self::from_record(key, value) {
        Ok(event) => Some(event),
        Err(e) => {
          warn!(key, error = %e, "skipping malformed event");
          None
        }
      })
      .collect()
  }

  pub fn total_votes(&self) -> u64 { self.yes_votes + self.no_votes }

  /// Whether the event is still ahead of `now`.
  pub fn is_upcoming_at(&self, now: DateTime<Utc>) -> bool { self.date > now }
}

// ─── Partitions ──────────────────────────────────────────────────────────────

/// Events strictly after `now`, soonest first.
pub fn upcoming_at(events: &[Event], now: DateTime<Utc>) -> Vec<Event> {
  let mut upcoming: Vec<Event> = events
    .iter()
    .filter(|e| e.is_upcoming_at(now))
    .cloned()
    .collect();
  upcoming.sort_by_key(|e| e.date);
  upcoming
}

/// Events at or before `now`, most recent first.
pub fn past_at(events: &[Event], now: DateTime<Utc>) -> Vec<Event> {
  let mut past: Vec<Event> = events
    .iter()
    .filter(|e| !e.is_upcoming_at(now))
    .cloned()
    .collect();
  past.sort_by(|a, b| b.date.cmp(&a.date));
  past
}

// ─── Dates ───────────────────────────────────────────────────────────────────

/// Parse an ISO-8601 date as written by humans and browsers: a full RFC 3339
/// timestamp, a timestamp without offset (taken as UTC), or a bare date
/// (midnight UTC).
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Some(dt.with_timezone(&Utc));
  }
  for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
      return Some(naive.and_utc());
    }
  }
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .map(|naive| naive.and_utc())
}

/// Millisecond-precision UTC timestamp, e.g. `2026-10-18T09:30:00.000Z`.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

mod iso_date {
  use chrono::{DateTime, Utc};
  use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

  pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&super::format_timestamp(*dt))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(d)?;
    super::parse_date(&raw)
      .ok_or_else(|| D::Error::custom(format!("unrecognised date {raw:?}")))
  }
}

mod iso_date_opt {
  use chrono::{DateTime, Utc};
  use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

  pub fn serialize<S: Serializer>(dt: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
    match dt {
      Some(dt) => super::iso_date::serialize(dt, s),
      None => s.serialize_none(),
    }
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    let Some(raw) = Option::<String>::deserialize(d)? else {
      return Ok(None);
    };
    super::parse_date(&raw)
      .map(Some)
      .ok_or_else(|| D::Error::custom(format!("unrecognised date {raw:?}")))
  }
}
