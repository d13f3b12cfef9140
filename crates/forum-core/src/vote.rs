//! Votes: one yes/no answer per (event, user) pair.
//!
//! A vote is stored under the composite key `{eventId}_{userId}`, which is
//! what makes the "one vote per user per event" rule enforceable by the
//! store itself. Votes are immutable once written.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

use crate::{Error, Result, event::format_timestamp, gateway::Snapshot};

/// A user's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteChoice {
  Yes,
  No,
}

impl VoteChoice {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Yes => "yes",
      Self::No => "no",
    }
  }

  /// The event counter this choice increments.
  pub fn counter_field(self) -> &'static str {
    match self {
      Self::Yes => "yesVotes",
      Self::No => "noVotes",
    }
  }
}

impl fmt::Display for VoteChoice {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.pad(self.as_str()) }
}

impl FromStr for VoteChoice {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "yes" => Ok(Self::Yes),
      "no" => Ok(Self::No),
      other => Err(Error::UnknownChoice(other.to_owned())),
    }
  }
}

/// Input to [`crate::votes::VoteRepository::add_vote`]. The timestamp is
/// always assigned at write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVote {
  pub event_id: String,
  pub user_id:  String,
  pub vote:     VoteChoice,
}

impl NewVote {
  pub fn new(event_id: impl Into<String>, user_id: impl Into<String>, vote: VoteChoice) -> Self {
    Self { event_id: event_id.into(), user_id: user_id.into(), vote }
  }

  /// The composite storage key for this (event, user) pair.
  pub fn key(&self) -> String { vote_key(&self.event_id, &self.user_id) }
}

/// `{event_id}_{user_id}`.
pub fn vote_key(event_id: &str, user_id: &str) -> String { format!("{event_id}_{user_id}") }

/// A recorded vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
  /// The composite key; attached on read.
  #[serde(default, skip_serializing)]
  pub id:        String,
  pub event_id:  String,
  pub user_id:   String,
  pub vote:      VoteChoice,
  pub timestamp: DateTime<Utc>,
}

impl Vote {
  /// Stamp `input` with `timestamp`.
  pub fn record(input: NewVote, timestamp: DateTime<Utc>) -> Self {
    Self {
      id: input.key(),
      event_id: input.event_id,
      user_id: input.user_id,
      vote: input.vote,
      timestamp,
    }
  }

  /// The JSON stored at `votes/{id}`.
  pub fn to_record(&self) -> Value {
    json!({
      "eventId":   self.event_id,
      "userId":    self.user_id,
      "vote":      self.vote,
      "timestamp": format_timestamp(self.timestamp),
    })
  }

  /// Decode the record stored under `key`, attaching the key as `id`.
  pub fn from_record(key: &str, value: &Value) -> Result<Self> {
    let mut vote = Self::deserialize(value).map_err(|source| Error::Malformed {
      path: format!("{}/{key}", crate::VOTES),
      source,
    })?;
    vote.id = key.to_owned();
    Ok(vote)
  }

  /// Decode every child of a collection snapshot, skipping malformed ones.
  pub fn from_collection(snapshot: &Snapshot) -> Vec<Self> {
    snapshot
      .children()
      .filter_map(|(key, value)| match Self::from_record(key, value) {
        Ok(vote) => Some(vote),
        Err(e) => {
          warn!(key, error = %e, "skipping malformed vote");
          None
        }
      })
      .collect()
  }
}
