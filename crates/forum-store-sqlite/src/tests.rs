//! Integration tests for `SqliteGateway` against an in-memory database.

use std::{sync::Arc, time::Duration};

use forum_core::{
  EVENTS,
  events::EventRepository,
  gateway::{AuthService, DocumentStore},
  session::SessionManager,
  user::DEFAULT_ADMIN_DOMAIN,
  vote::{NewVote, VoteChoice},
  votes::{VoteOutcome, VoteRepository},
};
use serde_json::{Map, json};
use uuid::Uuid;

use crate::{Error, SqliteGateway};

async fn gateway() -> SqliteGateway {
  SqliteGateway::open_in_memory()
    .await
    .expect("in-memory gateway")
}

fn temp_db() -> std::path::PathBuf {
  std::env::temp_dir().join(format!("forum-test-{}.db", Uuid::new_v4().simple()))
}

// ─── Documents ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn write_then_read_record() {
  let g = gateway().await;
  g.write("events/e1", json!({ "title": "Kickoff", "date": "2099-01-01" }))
    .await
    .unwrap();

  let snap = g.read("events/e1").await.unwrap();
  assert!(snap.exists());
  assert_eq!(snap.key(), "e1");
  assert_eq!(snap.val().unwrap()["title"], "Kickoff");
}

#[tokio::test]
async fn read_missing_is_absent() {
  let g = gateway().await;
  assert!(!g.read("events").await.unwrap().exists());
  assert!(!g.read("events/nope").await.unwrap().exists());
  assert!(!g.read("events/nope/title").await.unwrap().exists());
}

#[tokio::test]
async fn collection_read_gathers_records() {
  let g = gateway().await;
  g.write("events/e1", json!({ "title": "A" })).await.unwrap();
  g.write("events/e2", json!({ "title": "B" })).await.unwrap();
  g.write("votes/e1_u1", json!({ "vote": "yes" })).await.unwrap();

  let snap = g.read(EVENTS).await.unwrap();
  let keys: Vec<_> = snap.children().map(|(k, _)| k.to_owned()).collect();
  assert_eq!(keys, ["e1", "e2"]);

  let root = g.read("").await.unwrap();
  assert_eq!(root.val().unwrap()["votes"]["e1_u1"]["vote"], "yes");
}

#[tokio::test]
async fn nested_field_write_and_read() {
  let g = gateway().await;
  g.write("events/e1", json!({ "title": "A", "yesVotes": 0 })).await.unwrap();
  g.write("events/e1/yesVotes", json!(4)).await.unwrap();

  assert_eq!(g.read("events/e1/yesVotes").await.unwrap().val(), Some(&json!(4)));
  assert_eq!(g.read("events/e1/title").await.unwrap().val(), Some(&json!("A")));
}

#[tokio::test]
async fn writing_collection_replaces_all_records() {
  let g = gateway().await;
  g.write("events/old", json!({ "title": "Old" })).await.unwrap();
  g.write(EVENTS, json!({ "e1": { "title": "A" }, "e2": { "title": "B" } }))
    .await
    .unwrap();

  assert!(!g.read("events/old").await.unwrap().exists());
  assert_eq!(g.read(EVENTS).await.unwrap().children().count(), 2);
}

#[tokio::test]
async fn writing_null_removes() {
  let g = gateway().await;
  g.write("events/e1", json!({ "title": "A" })).await.unwrap();
  g.write("events/e1", serde_json::Value::Null).await.unwrap();
  assert!(!g.read("events/e1").await.unwrap().exists());
}

#[tokio::test]
async fn scalar_collection_is_rejected() {
  let g = gateway().await;
  let err = g.write(EVENTS, json!(5)).await.unwrap_err();
  assert!(matches!(err, Error::Database(_)));
}

#[tokio::test]
async fn partial_update_keeps_other_fields() {
  let g = gateway().await;
  g.write("events/e1", json!({ "title": "A", "yesVotes": 1, "noVotes": 2 }))
    .await
    .unwrap();

  let mut fields = Map::new();
  fields.insert("yesVotes".into(), json!(2));
  fields.insert("updatedAt".into(), json!("2024-01-01T00:00:00.000Z"));
  g.partial_update("events/e1", fields).await.unwrap();

  let e1 = g.read("events/e1").await.unwrap().into_val().unwrap();
  assert_eq!(e1["title"], "A");
  assert_eq!(e1["yesVotes"], 2);
  assert_eq!(e1["noVotes"], 2);
  assert_eq!(e1["updatedAt"], "2024-01-01T00:00:00.000Z");
}

#[tokio::test]
async fn create_if_absent_only_writes_once() {
  let g = gateway().await;
  assert!(g.create_if_absent("votes/e1_u1", json!({ "vote": "yes" })).await.unwrap());
  assert!(!g.create_if_absent("votes/e1_u1", json!({ "vote": "no" })).await.unwrap());
  assert_eq!(g.read("votes/e1_u1/vote").await.unwrap().val(), Some(&json!("yes")));
}

#[tokio::test]
async fn create_if_absent_nested_path() {
  let g = gateway().await;
  assert!(g.create_if_absent("events/e1/note", json!("hi")).await.unwrap());
  assert!(!g.create_if_absent("events/e1/note", json!("again")).await.unwrap());
}

#[tokio::test]
async fn documents_survive_reopen() {
  let path = temp_db();
  {
    let g = SqliteGateway::open(&path).await.unwrap();
    g.write("events/e1", json!({ "title": "A" })).await.unwrap();
  }
  let g = SqliteGateway::open(&path).await.unwrap();
  assert!(g.read("events/e1").await.unwrap().exists());
  std::fs::remove_file(&path).ok();
}

// ─── Subscriptions ───────────────────────────────────────────────────────────

#[tokio::test]
async fn subscribe_delivers_initial_and_changes() {
  let g = gateway().await;
  g.write("events/e1", json!({ "title": "A" })).await.unwrap();

  let mut sub = g.subscribe(EVENTS).await.unwrap();
  assert_eq!(sub.next().await.unwrap().children().count(), 1);

  g.write("events/e2", json!({ "title": "B" })).await.unwrap();
  assert_eq!(sub.next().await.unwrap().children().count(), 2);
}

#[tokio::test]
async fn subscribe_ignores_unrelated_paths() {
  let g = gateway().await;
  let mut sub = g.subscribe("votes").await.unwrap();
  assert!(!sub.next().await.unwrap().exists());

  g.write("events/e1", json!({ "title": "A" })).await.unwrap();
  let pushed = tokio::time::timeout(Duration::from_millis(50), sub.next()).await;
  assert!(pushed.is_err());
}

#[tokio::test]
async fn dropped_subscription_stops_delivery() {
  let g = gateway().await;
  let sub = g.subscribe(EVENTS).await.unwrap();
  drop(sub);
  // Writes still succeed with no one listening.
  g.write("events/e1", json!({ "title": "A" })).await.unwrap();
}

// ─── Authentication ──────────────────────────────────────────────────────────

#[tokio::test]
async fn create_identity_signs_in() {
  let g = gateway().await;
  let user = g.create_identity(" Student@Example.com ", "secret1").await.unwrap();
  assert_eq!(user.email.as_deref(), Some("student@example.com"));
  assert_eq!(g.load_session().await.unwrap(), Some(user));
}

#[tokio::test]
async fn create_identity_validates_input() {
  let g = gateway().await;
  assert!(matches!(
    g.create_identity("not-an-email", "secret1").await,
    Err(Error::InvalidEmail)
  ));
  assert!(matches!(
    g.create_identity("a@b.c", "12345").await,
    Err(Error::WeakPassword)
  ));
}

#[tokio::test]
async fn duplicate_email_is_rejected() {
  let g = gateway().await;
  g.create_identity("a@b.c", "secret1").await.unwrap();
  assert!(matches!(
    g.create_identity("A@B.C", "other12").await,
    Err(Error::EmailInUse)
  ));
}

#[tokio::test]
async fn authenticate_checks_password() {
  let g = gateway().await;
  let created = g.create_identity("a@b.c", "secret1").await.unwrap();
  g.end_session().await.unwrap();

  assert!(matches!(
    g.authenticate("a@b.c", "wrong-pw").await,
    Err(Error::InvalidCredentials)
  ));
  assert!(matches!(
    g.authenticate("nobody@b.c", "secret1").await,
    Err(Error::InvalidCredentials)
  ));
  assert_eq!(g.authenticate("a@b.c", "secret1").await.unwrap(), created);
}

#[tokio::test]
async fn session_changes_are_pushed() {
  let g = gateway().await;
  let mut sub = g.on_session_change().await.unwrap();
  assert_eq!(sub.next().await.unwrap(), None);

  let user = g.create_identity("a@b.c", "secret1").await.unwrap();
  assert_eq!(sub.next().await.unwrap(), Some(user));

  g.end_session().await.unwrap();
  assert_eq!(sub.next().await.unwrap(), None);
}

#[tokio::test]
async fn session_survives_reopen() {
  let path = temp_db();
  let user = {
    let g = SqliteGateway::open(&path).await.unwrap();
    g.create_identity("a@b.c", "secret1").await.unwrap()
  };

  let g = Arc::new(SqliteGateway::open(&path).await.unwrap());
  let session = SessionManager::new(g.clone(), DEFAULT_ADMIN_DOMAIN);
  session.init().await;
  assert_eq!(session.current_user(), Some(user));

  session.logout().await.unwrap();
  drop(session);
  drop(g);

  let g = SqliteGateway::open(&path).await.unwrap();
  assert_eq!(g.load_session().await.unwrap(), None);
  std::fs::remove_file(&path).ok();
}

// ─── Repositories over SQLite ────────────────────────────────────────────────

#[tokio::test]
async fn votes_are_counted_once() {
  let g = Arc::new(gateway().await);
  g.write(EVENTS, json!({ "e1": { "title": "Kickoff", "date": "2099-01-01", "yesVotes": 0, "noVotes": 0 } }))
    .await
    .unwrap();

  let events = EventRepository::new(g.clone());
  let votes = VoteRepository::new(g.clone());

  let outcome = votes.try_add_vote(NewVote::new("e1", "u1", VoteChoice::Yes)).await.unwrap();
  assert!(matches!(outcome, VoteOutcome::Recorded(_)));
  assert!(!votes.add_vote(NewVote::new("e1", "u1", VoteChoice::No)).await);

  let e1 = events.get_event_by_id("e1").await.unwrap();
  assert_eq!((e1.yes_votes, e1.no_votes), (1, 0));
  assert!(e1.updated_at.is_some());

  assert_eq!(votes.fetch_all_votes().await.len(), 1);
  assert_eq!(votes.event_yes_percentage("e1"), 100);
}

#[tokio::test]
async fn event_listener_follows_writes() {
  let g = Arc::new(gateway().await);
  let events = EventRepository::new(g.clone());
  events.listen_to_events().await;
  assert!(events.events().is_empty());
  assert!(!events.is_loading());

  let mut rx = events.state();
  g.write("events/e1", json!({ "title": "A", "date": "2099-01-01" })).await.unwrap();
  rx.wait_for(|s| s.events.len() == 1).await.unwrap();
  assert_eq!(events.upcoming_events()[0].title, "A");

  events.stop_listening();
}

#[tokio::test]
async fn user_vote_listener_sees_own_votes() {
  let g = Arc::new(gateway().await);
  g.write("events/e1", json!({ "title": "A", "date": "2099-01-01" })).await.unwrap();
  let votes = VoteRepository::new(g.clone());
  votes.listen_to_user_votes(Some("u1")).await;
  assert!(votes.user_votes().is_empty());

  let mut rx = votes.state();
  assert!(votes.add_vote(NewVote::new("e1", "u1", VoteChoice::No)).await);
  assert!(votes.add_vote(NewVote::new("e1", "u2", VoteChoice::Yes)).await);
  rx.wait_for(|s| s.user_votes.len() == 1).await.unwrap();
  assert_eq!(votes.user_vote_for("e1"), Some(VoteChoice::No));
}
