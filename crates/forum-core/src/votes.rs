//! [`VoteRepository`] — recording votes and aggregating them.
//!
//! Recording a vote is two independent writes: the vote itself, created
//! atomically under its composite key, then a read-modify-write of the
//! event's counters. There is no rollback between them. If the counter
//! update fails the vote stays recorded without its increment, and two
//! voters racing on the same event can lose an increment.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::{
  EVENTS, Error, Result, VOTES,
  event::format_timestamp,
  gateway::DocumentStore,
  listener::Listener,
  tree,
  vote::{NewVote, Vote, VoteChoice},
};

/// Locally held votes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VotesState {
  /// The watched user's votes, kept current by
  /// [`VoteRepository::listen_to_user_votes`].
  pub user_votes: Vec<Vote>,
  /// Every vote, as of the last [`VoteRepository::fetch_all_votes`].
  pub all_votes:  Vec<Vote>,
}

/// Result of [`VoteRepository::try_add_vote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
  Recorded(Vote),
  /// The user had already voted on this event; nothing was written.
  Duplicate,
}

pub struct VoteRepository<S> {
  store:    Arc<S>,
  state:    Arc<watch::Sender<VotesState>>,
  listener: Mutex<Option<Listener>>,
}

impl<S> VoteRepository<S>
where
  S: DocumentStore + 'static,
{
  pub fn new(store: Arc<S>) -> Self {
    Self {
      store,
      state: Arc::new(watch::Sender::new(VotesState::default())),
      listener: Mutex::new(None),
    }
  }

  pub fn state(&self) -> watch::Receiver<VotesState> { self.state.subscribe() }

  pub fn user_votes(&self) -> Vec<Vote> { self.state.borrow().user_votes.clone() }

  pub fn all_votes(&self) -> Vec<Vote> { self.state.borrow().all_votes.clone() }

  /// The watched user's choice on `event_id`, if they voted.
  pub fn user_vote_for(&self, event_id: &str) -> Option<VoteChoice> {
    self
      .state
      .borrow()
      .user_votes
      .iter()
      .find(|v| v.event_id == event_id)
      .map(|v| v.vote)
  }

  // ── Recording ─────────────────────────────────────────────────────────────

  /// Record a vote and bump the event's counter.
  ///
  /// Returns `true` only when a new vote was written. A duplicate vote and
  /// a gateway failure both return `false`; use
  /// [`try_add_vote`](Self::try_add_vote) to tell them apart.
  pub async fn add_vote(&self, input: NewVote) -> bool {
    match self.try_add_vote(input).await {
      Ok(VoteOutcome::Recorded(_)) => true,
      Ok(VoteOutcome::Duplicate) => false,
      Err(e) => {
        error!(error = %e, "failed to record vote");
        false
      }
    }
  }

  /// Record a vote, reporting duplicates and gateway failures separately.
  pub async fn try_add_vote(&self, input: NewVote) -> Result<VoteOutcome> {
    for id in [&input.event_id, &input.user_id] {
      if !tree::is_valid_key(id) {
        return Err(Error::InvalidKey(id.clone()));
      }
    }

    let vote = Vote::record(input, Utc::now());
    let path = format!("{VOTES}/{}", vote.id);

    let created = self
      .store
      .create_if_absent(&path, vote.to_record())
      .await
      .map_err(Error::gateway)?;
    if !created {
      warn!(key = %vote.id, "user has already voted on this event");
      return Ok(VoteOutcome::Duplicate);
    }

    info!(key = %vote.id, choice = %vote.vote, "vote recorded");
    self.update_event_counters(&vote.event_id, vote.vote).await;
    Ok(VoteOutcome::Recorded(vote))
  }

  /// Increment the event's `yesVotes` or `noVotes` and stamp `updatedAt`.
  /// Missing counters count as 0; a missing event is left alone. Errors are
  /// logged, never returned.
  pub async fn update_event_counters(&self, event_id: &str, choice: VoteChoice) {
    match self.try_update_event_counters(event_id, choice).await {
      Ok(true) => {}
      Ok(false) => debug!(event_id, "no such event; counters untouched"),
      Err(e) => error!(event_id, error = %e, "failed to update event counters"),
    }
  }

  async fn try_update_event_counters(&self, event_id: &str, choice: VoteChoice) -> Result<bool> {
    let path = format!("{EVENTS}/{event_id}");
    let snapshot = self.store.read(&path).await.map_err(Error::gateway)?;
    let Some(record) = snapshot.val() else {
      return Ok(false);
    };

    let field = choice.counter_field();
    let current = record.get(field).and_then(Value::as_u64).unwrap_or(0);

    let mut fields = Map::new();
    fields.insert(field.to_owned(), json!(current + 1));
    fields.insert("updatedAt".to_owned(), json!(format_timestamp(Utc::now())));

    self
      .store
      .partial_update(&path, fields)
      .await
      .map_err(Error::gateway)?;
    Ok(true)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  /// Keep [`VotesState::user_votes`] in sync with the votes of `user_id`.
  ///
  /// Does nothing when `user_id` is `None` or empty. The first snapshot is
  /// applied before this returns; calling it again replaces the previous
  /// subscription.
  pub async fn listen_to_user_votes(&self, user_id: Option<&str>) {
    let Some(user_id) = user_id.filter(|id| !id.is_empty()).map(str::to_owned) else {
      return;
    };

    let mut subscription = match self.store.subscribe(VOTES).await {
      Ok(sub) => sub,
      Err(e) => {
        error!(user_id = %user_id, error = %e, "failed to subscribe to votes");
        return;
      }
    };

    if let Some(snapshot) = subscription.next().await {
      publish_user_votes(&self.state, &user_id, Vote::from_collection(&snapshot));
    }

    let state = self.state.clone();
    let listener = Listener::spawn(async move {
      while let Some(snapshot) = subscription.next().await {
        publish_user_votes(&state, &user_id, Vote::from_collection(&snapshot));
      }
    });
    *self.listener.lock() = Some(listener);
  }

  pub fn stop_listening(&self) { self.listener.lock().take(); }

  /// One-shot read of every vote into [`VotesState::all_votes`].
  ///
  /// Meant for administrators; the gateway's own rules decide whether the
  /// read is allowed. When the collection is absent or the read fails the
  /// held list is left as it was and an empty list is returned.
  pub async fn fetch_all_votes(&self) -> Vec<Vote> {
    match self.store.read(VOTES).await {
      Ok(snapshot) if !snapshot.exists() => {
        debug!("no votes collection; held votes kept");
        Vec::new()
      }
      Ok(snapshot) => {
        let votes = Vote::from_collection(&snapshot);
        self.state.send_modify(|s| s.all_votes = votes.clone());
        votes
      }
      Err(e) => {
        error!(error = %e, "failed to load votes");
        Vec::new()
      }
    }
  }

  // ── Aggregates over `all_votes` ───────────────────────────────────────────

  /// Number of held votes on `event_id`.
  pub fn event_vote_count(&self, event_id: &str) -> usize {
    self
      .state
      .borrow()
      .all_votes
      .iter()
      .filter(|v| v.event_id == event_id)
      .count()
  }

  /// Share of "yes" among the held votes on `event_id`, as a whole
  /// percentage rounded half up. 0 when nobody voted.
  pub fn event_yes_percentage(&self, event_id: &str) -> u32 {
    let state = self.state.borrow();
    let (yes, total) = state
      .all_votes
      .iter()
      .filter(|v| v.event_id == event_id)
      .fold((0u64, 0u64), |(yes, total), v| {
        (yes + u64::from(v.vote == VoteChoice::Yes), total + 1)
      });
    yes_percentage(yes, total)
  }
}

/// `round(100 * yes / total)` in integer arithmetic; 0 for `total == 0`.
pub fn yes_percentage(yes: u64, total: u64) -> u32 {
  if total == 0 {
    return 0;
  }
  let rounded = (200 * yes + total) / (2 * total);
  u32::try_from(rounded).unwrap_or(100)
}

fn publish_user_votes(state: &watch::Sender<VotesState>, user_id: &str, votes: Vec<Vote>) {
  let mine: Vec<Vote> = votes.into_iter().filter(|v| v.user_id == user_id).collect();
  debug!(user_id, count = mine.len(), "user votes pushed");
  state.send_modify(|s| s.user_votes = mine);
}
