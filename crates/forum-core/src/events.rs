//! [`EventRepository`] — the client's view of the `events` collection.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::{
  EVENTS,
  event::{self, Event},
  gateway::DocumentStore,
  listener::Listener,
  tree,
};

/// Locally held events plus the initial-load flag.
#[derive(Debug, Clone, PartialEq)]
pub struct EventsState {
  pub events:  Vec<Event>,
  pub loading: bool,
}

impl Default for EventsState {
  fn default() -> Self { Self { events: Vec::new(), loading: true } }
}

/// Clears the loading flag when dropped, whichever way the load ends.
struct ClearLoading<'a>(&'a watch::Sender<EventsState>);

impl Drop for ClearLoading<'_> {
  fn drop(&mut self) { self.0.send_modify(|s| s.loading = false); }
}

/// Fetches, watches and partitions events.
///
/// State lives in a [`watch`] channel: read it with [`events`](Self::events)
/// or react to changes through [`state`](Self::state).
pub struct EventRepository<S> {
  store:    Arc<S>,
  state:    Arc<watch::Sender<EventsState>>,
  listener: Mutex<Option<Listener>>,
}

impl<S> EventRepository<S>
where
  S: DocumentStore + 'static,
{
  pub fn new(store: Arc<S>) -> Self {
    Self {
      store,
      state: Arc::new(watch::Sender::new(EventsState::default())),
      listener: Mutex::new(None),
    }
  }

  /// A receiver that is woken on every change to the local events.
  pub fn state(&self) -> watch::Receiver<EventsState> { self.state.subscribe() }

  pub fn events(&self) -> Vec<Event> { self.state.borrow().events.clone() }

  pub fn is_loading(&self) -> bool { self.state.borrow().loading }

  // ── Reads ─────────────────────────────────────────────────────────────────

  /// One-shot read of the whole collection. Failures are logged and leave
  /// an empty list; the loading flag is cleared either way.
  pub async fn fetch_events(&self) -> Vec<Event> {
    let _clear = ClearLoading(&self.state);

    let events = match self.store.read(EVENTS).await {
      Ok(snapshot) => Event::from_collection(&snapshot),
      Err(e) => {
        error!(error = %e, "failed to load events");
        Vec::new()
      }
    };
    self.state.send_modify(|s| s.events = events.clone());
    events
  }

  /// Replace the local events on every change to the collection.
  ///
  /// The first snapshot is applied before this returns. Calling it again
  /// replaces the previous subscription. On failure the local state is left
  /// untouched.
  pub async fn listen_to_events(&self) {
    let mut subscription = match self.store.subscribe(EVENTS).await {
      Ok(sub) => sub,
      Err(e) => {
        error!(error = %e, "failed to subscribe to events");
        return;
      }
    };

    if let Some(snapshot) = subscription.next().await {
      publish(&self.state, Event::from_collection(&snapshot));
    }

    let state = self.state.clone();
    let listener = Listener::spawn(async move {
      while let Some(snapshot) = subscription.next().await {
        let events = Event::from_collection(&snapshot);
        debug!(count = events.len(), "events pushed");
        publish(&state, events);
      }
    });
    *self.listener.lock() = Some(listener);
  }

  /// Stop the standing subscription, if any.
  pub fn stop_listening(&self) { self.listener.lock().take(); }

  /// One-shot read of a single event. Absent ids, invalid ids, malformed
  /// records and gateway failures all yield `None`.
  pub async fn get_event_by_id(&self, id: &str) -> Option<Event> {
    if !tree::is_valid_key(id) {
      warn!(id, "rejecting invalid event id");
      return None;
    }

    let path = format!("{EVENTS}/{id}");
    match self.store.read(&path).await {
      Ok(snapshot) => {
        let value = snapshot.val()?;
        Event::from_record(id, value)
          .inspect_err(|e| warn!(id, error = %e, "malformed event"))
          .ok()
      }
      Err(e) => {
        error!(id, error = %e, "failed to load event");
        None
      }
    }
  }

  // ── Derived ───────────────────────────────────────────────────────────────

  /// Events after the current instant, soonest first. "Now" is sampled on
  /// every call.
  pub fn upcoming_events(&self) -> Vec<Event> { self.upcoming_events_at(Utc::now()) }

  /// Events at or before the current instant, most recent first.
  pub fn past_events(&self) -> Vec<Event> { self.past_events_at(Utc::now()) }

  pub fn upcoming_events_at(&self, now: DateTime<Utc>) -> Vec<Event> {
    event::upcoming_at(&self.state.borrow().events, now)
  }

  pub fn past_events_at(&self, now: DateTime<Utc>) -> Vec<Event> {
    event::past_at(&self.state.borrow().events, now)
  }
}

fn publish(state: &watch::Sender<EventsState>, events: Vec<Event>) {
  state.send_modify(|s| {
    s.events = events;
    s.loading = false;
  });
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use chrono::TimeZone;
  use serde_json::json;

  use super::*;
  use crate::memory::MemoryGateway;

  fn seeded() -> Arc<MemoryGateway> {
    Arc::new(MemoryGateway::new().with_value(
      EVENTS,
      json!({
        "e1": { "title": "Kickoff", "date": "2099-01-01", "yesVotes": 0, "noVotes": 0 },
        "e2": { "title": "Retro", "date": "2020-06-01T17:00:00.000Z", "yesVotes": 4 },
      }),
    ))
  }

  #[tokio::test]
  async fn fetch_attaches_ids_and_clears_loading() {
    let repo = EventRepository::new(seeded());
    assert!(repo.is_loading());

    let events = repo.fetch_events().await;
    assert_eq!(events.len(), 2);
    assert_eq!(repo.events(), events);
    assert!(!repo.is_loading());

    let ids: Vec<_> = events.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["e1", "e2"]);
  }

  #[tokio::test]
  async fn fetch_failure_resets_to_empty() {
    let gw = seeded();
    let repo = EventRepository::new(gw.clone());
    repo.fetch_events().await;
    assert_eq!(repo.events().len(), 2);

    gw.fail_under(EVENTS);
    assert!(repo.fetch_events().await.is_empty());
    assert!(repo.events().is_empty());
    assert!(!repo.is_loading());
  }

  #[tokio::test]
  async fn empty_collection_fetches_empty() {
    let repo = EventRepository::new(Arc::new(MemoryGateway::new()));
    assert!(repo.fetch_events().await.is_empty());
    assert!(!repo.is_loading());
  }

  #[tokio::test]
  async fn listener_replaces_events_on_every_push() {
    let gw = seeded();
    let repo = EventRepository::new(gw.clone());
    repo.listen_to_events().await;
    assert_eq!(repo.events().len(), 2);
    assert!(!repo.is_loading());

    let mut rx = repo.state();
    gw.write("events/e3", json!({ "title": "Hack night", "date": "2098-02-02" }))
      .await
      .unwrap();

    tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| s.events.len() == 3))
      .await
      .expect("push within a second")
      .unwrap();

    gw.write(EVENTS, serde_json::Value::Null).await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| s.events.is_empty()))
      .await
      .expect("push within a second")
      .unwrap();
  }

  #[tokio::test]
  async fn relistening_replaces_the_subscription() {
    let gw = seeded();
    let repo = EventRepository::new(gw.clone());
    repo.listen_to_events().await;
    repo.listen_to_events().await;
    // The replaced listener's task is aborted; give the runtime a turn.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(gw.subscriber_count(), 1);

    repo.stop_listening();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(gw.subscriber_count(), 0);
  }

  #[tokio::test]
  async fn get_event_by_id_handles_absent_and_invalid_ids() {
    let gw = seeded();
    let repo = EventRepository::new(gw.clone());

    let e1 = repo.get_event_by_id("e1").await.unwrap();
    assert_eq!(e1.id, "e1");
    assert_eq!(e1.title, "Kickoff");

    assert!(repo.get_event_by_id("missing").await.is_none());
    assert!(repo.get_event_by_id("").await.is_none());
    assert!(repo.get_event_by_id("e1/title").await.is_none());

    gw.fail_under(EVENTS);
    assert!(repo.get_event_by_id("e1").await.is_none());
  }

  #[tokio::test]
  async fn partitions_follow_now() {
    let repo = EventRepository::new(seeded());
    repo.fetch_events().await;

    let now = Utc.with_ymd_and_hms(2026, 10, 18, 0, 0, 0).unwrap();
    let upcoming = repo.upcoming_events_at(now);
    let past = repo.past_events_at(now);
    assert_eq!(upcoming.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), vec!["e1"]);
    assert_eq!(past.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), vec!["e2"]);

    assert_eq!(repo.upcoming_events().len() + repo.past_events().len(), 2);
  }
}
