//! [`SqliteGateway`] — the SQLite implementation of [`DocumentStore`].
//!
//! Records live one per row at depth two (`collection/key`). A read or
//! write at any path is resolved against its storage scope: the whole tree
//! for the root, all rows of a collection for a collection path, a single
//! row for anything deeper. Mutations load the scope, apply the change with
//! [`forum_core::tree`] and write the scope back inside one transaction.

use std::{path::Path, sync::Arc};

use forum_core::{
  gateway::{DocumentStore, Snapshot, Subscription},
  tree::{self, Mutation},
  user::User,
};
use rusqlite::OptionalExtension as _;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error};

use crate::{
  Error, Result,
  encode::{decode_value, encode_value},
  schema::SCHEMA,
};

/// How many unconsumed change notifications a slow subscriber may lag
/// behind before it falls back to a full re-read.
const CHANGE_BUFFER: usize = 256;

// ─── Gateway ─────────────────────────────────────────────────────────────────

/// A forum gateway backed by a single SQLite file.
///
/// Cloning is cheap: the connection, the change feed and the session state
/// are all shared. Change notifications only cover writes made through this
/// process.
#[derive(Clone)]
pub struct SqliteGateway {
  pub(crate) conn:    tokio_rusqlite::Connection,
  changes:            broadcast::Sender<String>,
  pub(crate) session: Arc<watch::Sender<Option<User>>>,
}

impl SqliteGateway {
  /// Open (or create) a gateway at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory gateway — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;

    let (changes, _) = broadcast::channel(CHANGE_BUFFER);
    let gateway = Self {
      conn,
      changes,
      session: Arc::new(watch::Sender::new(None)),
    };

    let resumed = gateway.load_session().await?;
    if let Some(user) = &resumed {
      debug!(uid = %user.uid, "resuming persisted session");
    }
    gateway.session.send_replace(resumed);
    Ok(gateway)
  }

  async fn snapshot(&self, path: &str) -> Result<Snapshot> {
    let segments = owned_segments(path);

    let value = self
      .conn
      .call(move |conn| {
        let segments = borrowed(&segments);
        let (head, rest) = split_scope(&segments);
        let base = load_scope(conn, head)?;
        Ok(tree::get(&base, rest).cloned())
      })
      .await?;

    Ok(Snapshot::new(tree::join(&tree::segments(path)), value))
  }

  /// Apply `mutation` at `path` in one transaction. With `only_if_absent`
  /// nothing is written (and `false` returned) when the node exists.
  async fn mutate(&self, path: &str, mutation: Mutation, only_if_absent: bool) -> Result<bool> {
    let segments = owned_segments(path);
    let changed = segments.join("/");

    let applied = self
      .conn
      .call(move |conn| {
        let segments = borrowed(&segments);
        let (head, rest) = split_scope(&segments);

        let tx = conn.transaction()?;
        let mut base = load_scope(&tx, head)?;
        if only_if_absent && tree::get(&base, rest).is_some_and(|v| !tree::is_vacant(v)) {
          return Ok(false);
        }
        mutation.apply(&mut base, rest);
        store_scope(&tx, head, &base)?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if applied {
      // Nobody listening is fine.
      self.changes.send(changed).ok();
    }
    Ok(applied)
  }

  /// Single-statement create for a record path.
  async fn insert_record(&self, collection: String, key: String, value: &Value) -> Result<bool> {
    let value_json = serde_json::to_string(value)?;
    let changed = format!("{collection}/{key}");

    let inserted = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "INSERT INTO documents (collection, key, value_json) VALUES (?1, ?2, ?3)
           ON CONFLICT (collection, key) DO NOTHING",
          rusqlite::params![collection, key, value_json],
        )?;
        Ok(n == 1)
      })
      .await?;

    if inserted {
      self.changes.send(changed).ok();
    }
    Ok(inserted)
  }
}

// ─── DocumentStore impl ──────────────────────────────────────────────────────

impl DocumentStore for SqliteGateway {
  type Error = Error;

  async fn read(&self, path: &str) -> Result<Snapshot> { self.snapshot(path).await }

  async fn write(&self, path: &str, value: Value) -> Result<()> {
    self.mutate(path, Mutation::Set(value), false).await?;
    Ok(())
  }

  async fn partial_update(&self, path: &str, fields: Map<String, Value>) -> Result<()> {
    self.mutate(path, Mutation::Merge(fields), false).await?;
    Ok(())
  }

  async fn create_if_absent(&self, path: &str, value: Value) -> Result<bool> {
    let segments = tree::segments(path);
    if let [collection, key] = segments.as_slice()
      && !tree::is_vacant(&value)
    {
      return self
        .insert_record((*collection).to_owned(), (*key).to_owned(), &value)
        .await;
    }
    self.mutate(path, Mutation::Set(value), true).await
  }

  async fn subscribe(&self, path: &str) -> Result<Subscription<Snapshot>> {
    // Register for changes before the initial read so none slip between.
    let mut changes = self.changes.subscribe();
    let initial = self.snapshot(path).await?;

    let (tx, rx) = mpsc::unbounded_channel();
    tx.send(initial).ok();

    let watched = owned_segments(path);
    let path = watched.join("/");
    let gateway = self.clone();
    let task = tokio::spawn(async move {
      loop {
        match changes.recv().await {
          Ok(changed) => {
            if !tree::related(watched.as_slice(), tree::segments(&changed).as_slice()) {
              continue;
            }
          }
          Err(broadcast::error::RecvError::Lagged(skipped)) => {
            debug!(path = %path, skipped, "subscriber lagged; re-reading");
          }
          Err(broadcast::error::RecvError::Closed) => break,
        }

        match gateway.snapshot(&path).await {
          Ok(snapshot) => {
            if tx.send(snapshot).is_err() {
              break;
            }
          }
          Err(e) => error!(path = %path, error = %e, "failed to refresh subscription"),
        }
      }
    });

    Ok(Subscription::new(rx, move || task.abort()))
  }
}

// ─── Scope helpers ───────────────────────────────────────────────────────────

fn owned_segments(path: &str) -> Vec<String> {
  tree::segments(path).into_iter().map(str::to_owned).collect()
}

fn borrowed(segments: &[String]) -> Vec<&str> { segments.iter().map(String::as_str).collect() }

/// Split a path into its storage scope (at most `collection/key`) and the
/// remainder addressed inside that scope's value.
fn split_scope<'a, 'b>(segments: &'a [&'b str]) -> (&'a [&'b str], &'a [&'b str]) {
  segments.split_at(segments.len().min(2))
}

fn load_scope(conn: &rusqlite::Connection, head: &[&str]) -> tokio_rusqlite::Result<Value> {
  match head {
    [] => load_root(conn),
    [collection] => load_collection(conn, collection),
    [collection, key, ..] => Ok(load_record(conn, collection, key)?.unwrap_or(Value::Null)),
  }
}

fn store_scope(conn: &rusqlite::Connection, head: &[&str], value: &Value) -> tokio_rusqlite::Result<()> {
  match head {
    [] => store_root(conn, value),
    [collection] => store_collection(conn, collection, value),
    [collection, key, ..] => store_record(conn, collection, key, value),
  }
}

fn load_record(
  conn: &rusqlite::Connection,
  collection: &str,
  key: &str,
) -> tokio_rusqlite::Result<Option<Value>> {
  let raw: Option<String> = conn
    .query_row(
      "SELECT value_json FROM documents WHERE collection = ?1 AND key = ?2",
      rusqlite::params![collection, key],
      |row| row.get(0),
    )
    .optional()?;
  raw.as_deref().map(decode_value).transpose()
}

fn load_collection(conn: &rusqlite::Connection, collection: &str) -> tokio_rusqlite::Result<Value> {
  let mut stmt =
    conn.prepare("SELECT key, value_json FROM documents WHERE collection = ?1 ORDER BY key")?;
  let rows = stmt
    .query_map(rusqlite::params![collection], |row| {
      Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut map = Map::new();
  for (key, value_json) in rows {
    map.insert(key, decode_value(&value_json)?);
  }
  Ok(Value::Object(map))
}

fn load_root(conn: &rusqlite::Connection) -> tokio_rusqlite::Result<Value> {
  let mut stmt = conn.prepare("SELECT DISTINCT collection FROM documents ORDER BY collection")?;
  let collections = stmt
    .query_map([], |row| row.get::<_, String>(0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut map = Map::new();
  for collection in collections {
    let value = load_collection(conn, &collection)?;
    map.insert(collection, value);
  }
  Ok(Value::Object(map))
}

fn store_record(
  conn: &rusqlite::Connection,
  collection: &str,
  key: &str,
  value: &Value,
) -> tokio_rusqlite::Result<()> {
  if tree::is_vacant(value) {
    conn.execute(
      "DELETE FROM documents WHERE collection = ?1 AND key = ?2",
      rusqlite::params![collection, key],
    )?;
  } else {
    conn.execute(
      "INSERT INTO documents (collection, key, value_json) VALUES (?1, ?2, ?3)
       ON CONFLICT (collection, key) DO UPDATE SET value_json = excluded.value_json",
      rusqlite::params![collection, key, encode_value(value)?],
    )?;
  }
  Ok(())
}

fn store_collection(
  conn: &rusqlite::Connection,
  collection: &str,
  value: &Value,
) -> tokio_rusqlite::Result<()> {
  let records = object_entries(value, collection)?;
  conn.execute(
    "DELETE FROM documents WHERE collection = ?1",
    rusqlite::params![collection],
  )?;
  for (key, record) in records {
    store_record(conn, collection, key, record)?;
  }
  Ok(())
}

fn store_root(conn: &rusqlite::Connection, value: &Value) -> tokio_rusqlite::Result<()> {
  let collections = object_entries(value, "the root")?;
  conn.execute("DELETE FROM documents", [])?;
  for (collection, records) in collections {
    store_collection(conn, collection, records)?;
  }
  Ok(())
}

/// Entries of an object value; `null` counts as empty.
fn object_entries<'v>(
  value: &'v Value,
  place: &str,
) -> tokio_rusqlite::Result<Vec<(&'v str, &'v Value)>> {
  match value {
    Value::Null => Ok(Vec::new()),
    Value::Object(map) => Ok(map.iter().map(|(k, v)| (k.as_str(), v)).collect()),
    other => Err(tokio_rusqlite::Error::Other(Box::new(Error::Shape(format!(
      "{other} at {place}"
    ))))),
  }
}
