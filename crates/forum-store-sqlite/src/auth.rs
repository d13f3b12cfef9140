//! [`AuthService`] for [`SqliteGateway`]: argon2-hashed identities and a
//! single persisted session row.

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use chrono::Utc;
use forum_core::{
  gateway::{AuthService, Subscription},
  user::{MIN_PASSWORD_LEN, User, normalize_email},
};
use rand_core::OsRng;
use rusqlite::OptionalExtension as _;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{RawIdentity, encode_dt},
  store::SqliteGateway,
};

impl SqliteGateway {
  /// The identity recorded in the session row, if any.
  pub(crate) async fn load_session(&self) -> Result<Option<User>> {
    let raw = self
      .conn
      .call(|conn| {
        let raw = conn
          .query_row(
            "SELECT i.uid, i.email, i.password_hash
             FROM session s JOIN identities i ON i.uid = s.uid
             WHERE s.slot = 1",
            [],
            |row| {
              Ok(RawIdentity {
                uid:           row.get(0)?,
                email:         row.get(1)?,
                password_hash: row.get(2)?,
              })
            },
          )
          .optional()?;
        Ok(raw)
      })
      .await?;
    Ok(raw.map(RawIdentity::into_user))
  }

  async fn start_session(&self, user: User) -> Result<User> {
    let uid = user.uid.clone();
    let started_at = encode_dt(Utc::now());
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO session (slot, uid, started_at) VALUES (1, ?1, ?2)
           ON CONFLICT (slot) DO UPDATE SET uid = excluded.uid, started_at = excluded.started_at",
          rusqlite::params![uid, started_at],
        )?;
        Ok(())
      })
      .await?;

    info!(uid = %user.uid, "session started");
    self.session.send_replace(Some(user.clone()));
    Ok(user)
  }

  async fn find_identity(&self, email: String) -> Result<Option<RawIdentity>> {
    let raw = self
      .conn
      .call(move |conn| {
        let raw = conn
          .query_row(
            "SELECT uid, email, password_hash FROM identities WHERE email = ?1",
            rusqlite::params![email],
            |row| {
              Ok(RawIdentity {
                uid:           row.get(0)?,
                email:         row.get(1)?,
                password_hash: row.get(2)?,
              })
            },
          )
          .optional()?;
        Ok(raw)
      })
      .await?;
    Ok(raw)
  }
}

fn hash_password(password: &str) -> Result<String> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|hash| hash.to_string())
    .map_err(|e| Error::PasswordHash(e.to_string()))
}

fn verify_password(password: &str, phc: &str) -> Result<bool> {
  let parsed = PasswordHash::new(phc).map_err(|e| Error::PasswordHash(e.to_string()))?;
  Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}

impl AuthService for SqliteGateway {
  type Error = Error;

  async fn create_identity(&self, email: &str, password: &str) -> Result<User> {
    let email = normalize_email(email);
    if !email.contains('@') {
      return Err(Error::InvalidEmail);
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
      return Err(Error::WeakPassword);
    }

    let uid = Uuid::new_v4().simple().to_string();
    let password_hash = hash_password(password)?;
    let created_at = encode_dt(Utc::now());

    let user = User { uid: uid.clone(), email: Some(email.clone()) };
    let inserted = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "INSERT INTO identities (uid, email, password_hash, created_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (email) DO NOTHING",
          rusqlite::params![uid, email, password_hash, created_at],
        )?;
        Ok(n == 1)
      })
      .await?;
    if !inserted {
      return Err(Error::EmailInUse);
    }

    debug!(uid = %user.uid, "identity created");
    self.start_session(user).await
  }

  async fn authenticate(&self, email: &str, password: &str) -> Result<User> {
    let Some(raw) = self.find_identity(normalize_email(email)).await? else {
      return Err(Error::InvalidCredentials);
    };
    if !verify_password(password, &raw.password_hash)? {
      return Err(Error::InvalidCredentials);
    }
    self.start_session(raw.into_user()).await
  }

  async fn end_session(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute("DELETE FROM session", [])?;
        Ok(())
      })
      .await?;

    info!("session ended");
    self.session.send_replace(None);
    Ok(())
  }

  async fn on_session_change(&self) -> Result<Subscription<Option<User>>> {
    let mut changes = self.session.subscribe();
    let (tx, rx) = mpsc::unbounded_channel();
    tx.send(changes.borrow_and_update().clone()).ok();

    let task = tokio::spawn(async move {
      while changes.changed().await.is_ok() {
        let user = changes.borrow_and_update().clone();
        if tx.send(user).is_err() {
          break;
        }
      }
    });

    Ok(Subscription::new(rx, move || task.abort()))
  }
}
