//! The client wiring: one session, guard and pair of repositories over a
//! gateway, and a handler per [`Command`].

use std::{
  io::{self, BufRead as _, Write},
  path::Path,
  process::ExitCode,
  sync::Arc,
};

use anyhow::{Context as _, bail};
use forum_core::{
  EVENTS,
  event::Event,
  events::EventRepository,
  gateway::{AuthService, DocumentStore},
  guard::{Navigation, NavigationGuard},
  session::SessionManager,
  tree,
  vote::{NewVote, VoteChoice},
  votes::{VoteOutcome, VoteRepository},
};
use serde_json::Value;
use tracing::{debug, info};

use crate::{
  command::{Command, Credentials},
  render,
};

pub struct App<G> {
  store:   Arc<G>,
  session: Arc<SessionManager<G>>,
  guard:   NavigationGuard<G>,
  events:  EventRepository<G>,
  votes:   VoteRepository<G>,
}

impl<G> App<G>
where
  G: DocumentStore + AuthService + 'static,
{
  pub fn new(store: Arc<G>, admin_domain: &str) -> Self {
    let session = Arc::new(SessionManager::new(store.clone(), admin_domain));
    Self {
      guard: NavigationGuard::new(session.clone()),
      events: EventRepository::new(store.clone()),
      votes: VoteRepository::new(store.clone()),
      session,
      store,
    }
  }

  /// Resolve the session, pass the guard for the command's route, then run
  /// the command. A redirect or a refused action yields a failure exit code.
  pub async fn execute(&self, command: &Command, out: &mut impl Write) -> anyhow::Result<ExitCode> {
    self.session.init().await;

    let route = command.route();
    if let Navigation::Redirect(to) = self.guard.before_each(&route).await {
      info!(from = route.path, to = to.path, "navigation redirected");
      writeln!(out, "redirected to {} ({})", to.name, to.path)?;
      return Ok(ExitCode::FAILURE);
    }

    match command {
      Command::Signup(creds) => self.sign_up(creds, out).await,
      Command::Signin(creds) => self.sign_in(creds, out).await,
      Command::Logout => self.logout(out).await,
      Command::Whoami => self.whoami(out),
      Command::Events { upcoming, past } => self.list_events(*upcoming, *past, out).await,
      Command::Event { id } => self.show_event(id, out).await,
      Command::Vote { event_id, choice } => self.vote(event_id, *choice, out).await,
      Command::MyVotes => self.my_votes(out).await,
      Command::Stats { event_id } => self.stats(event_id, out).await,
      Command::Watch => self.watch(out).await,
      Command::Seed { file } => self.seed(file, out).await,
    }
  }

  // ── Account ───────────────────────────────────────────────────────────────

  async fn sign_up(&self, creds: &Credentials, out: &mut impl Write) -> anyhow::Result<ExitCode> {
    let password = password_or_stdin(creds)?;
    match self.session.sign_up(&creds.email, &password).await {
      Ok(user) => {
        writeln!(out, "signed up as {}", user.email.as_deref().unwrap_or(&user.uid))?;
        Ok(ExitCode::SUCCESS)
      }
      Err(failure) => {
        writeln!(out, "{failure}")?;
        Ok(ExitCode::FAILURE)
      }
    }
  }

  async fn sign_in(&self, creds: &Credentials, out: &mut impl Write) -> anyhow::Result<ExitCode> {
    let password = password_or_stdin(creds)?;
    match self.session.sign_in(&creds.email, &password).await {
      Ok(user) => {
        writeln!(out, "signed in as {}", user.email.as_deref().unwrap_or(&user.uid))?;
        Ok(ExitCode::SUCCESS)
      }
      Err(failure) => {
        writeln!(out, "{failure}")?;
        Ok(ExitCode::FAILURE)
      }
    }
  }

  async fn logout(&self, out: &mut impl Write) -> anyhow::Result<ExitCode> {
    if !self.session.is_authenticated() {
      writeln!(out, "not signed in")?;
      return Ok(ExitCode::SUCCESS);
    }
    match self.session.logout().await {
      Ok(()) => {
        writeln!(out, "signed out")?;
        Ok(ExitCode::SUCCESS)
      }
      Err(failure) => {
        writeln!(out, "{failure}")?;
        Ok(ExitCode::FAILURE)
      }
    }
  }

  fn whoami(&self, out: &mut impl Write) -> anyhow::Result<ExitCode> {
    match self.session.current_user() {
      Some(user) => {
        let name = user.email.as_deref().unwrap_or(&user.uid);
        let role = if self.session.is_admin() { " (admin)" } else { "" };
        writeln!(out, "{name}{role}")?;
      }
      None => writeln!(out, "not signed in")?,
    }
    Ok(ExitCode::SUCCESS)
  }

  fn signed_in_uid(&self) -> anyhow::Result<String> {
    match self.session.current_user() {
      Some(user) => Ok(user.uid),
      None => bail!("no signed-in user"),
    }
  }

  // ── Events ────────────────────────────────────────────────────────────────

  async fn list_events(
    &self,
    upcoming: bool,
    past: bool,
    out: &mut impl Write,
  ) -> anyhow::Result<ExitCode> {
    self.events.fetch_events().await;
    let events = if upcoming {
      self.events.upcoming_events()
    } else if past {
      self.events.past_events()
    } else {
      self.events.events()
    };

    if events.is_empty() {
      writeln!(out, "no events")?;
    }
    for event in &events {
      writeln!(out, "{}", render::event_line(event))?;
    }
    Ok(ExitCode::SUCCESS)
  }

  async fn show_event(&self, id: &str, out: &mut impl Write) -> anyhow::Result<ExitCode> {
    let Some(event) = self.events.get_event_by_id(id).await else {
      writeln!(out, "event {id} not found")?;
      return Ok(ExitCode::FAILURE);
    };

    self.votes.listen_to_user_votes(Some(&self.signed_in_uid()?)).await;
    let own = self.votes.user_vote_for(&event.id);
    self.votes.stop_listening();

    writeln!(out, "{}", render::event_detail(&event, own))?;
    Ok(ExitCode::SUCCESS)
  }

  async fn watch(&self, out: &mut impl Write) -> anyhow::Result<ExitCode> {
    self.watch_until(tokio::signal::ctrl_c(), out).await
  }

  /// Print upcoming events now and after every change until `shutdown`
  /// resolves.
  async fn watch_until<F>(&self, shutdown: F, out: &mut impl Write) -> anyhow::Result<ExitCode>
  where
    F: Future,
  {
    let mut state = self.events.state();
    self.events.listen_to_events().await;
    // The first snapshot is already held; only later pushes should wake us.
    state.mark_unchanged();
    tokio::pin!(shutdown);

    loop {
      let upcoming = self.events.upcoming_events();
      writeln!(out, "── {} upcoming ──", upcoming.len())?;
      for event in &upcoming {
        writeln!(out, "{}", render::event_line(event))?;
      }
      out.flush()?;

      tokio::select! {
        _ = &mut shutdown => break,
        changed = state.changed() => {
          if changed.is_err() {
            break;
          }
        }
      }
    }

    self.events.stop_listening();
    Ok(ExitCode::SUCCESS)
  }

  /// Write every event in a JSON object keyed by event id. Records that do
  /// not parse as events abort the import before anything is written.
  async fn seed(&self, file: &Path, out: &mut impl Write) -> anyhow::Result<ExitCode> {
    let raw = std::fs::read_to_string(file)
      .with_context(|| format!("reading seed file {}", file.display()))?;
    let value: Value = serde_json::from_str(&raw).context("parsing seed file")?;
    let Value::Object(records) = value else {
      bail!("seed file must hold an object keyed by event id");
    };

    for (key, record) in &records {
      if !tree::is_valid_key(key) {
        bail!("invalid event id {key:?}");
      }
      Event::from_record(key, record).with_context(|| format!("event {key}"))?;
    }

    for (key, record) in records {
      self.store.write(&format!("{EVENTS}/{key}"), record).await?;
      debug!(key = %key, "event seeded");
    }
    writeln!(out, "seeded events from {}", file.display())?;
    Ok(ExitCode::SUCCESS)
  }

  // ── Votes ─────────────────────────────────────────────────────────────────

  async fn vote(
    &self,
    event_id: &str,
    choice: VoteChoice,
    out: &mut impl Write,
  ) -> anyhow::Result<ExitCode> {
    let Some(event) = self.events.get_event_by_id(event_id).await else {
      writeln!(out, "event {event_id} not found")?;
      return Ok(ExitCode::FAILURE);
    };

    let uid = self.signed_in_uid()?;
    match self.votes.try_add_vote(NewVote::new(&event.id, uid, choice)).await? {
      VoteOutcome::Recorded(vote) => {
        writeln!(out, "voted {} on {}", vote.vote, event.title)?;
        Ok(ExitCode::SUCCESS)
      }
      VoteOutcome::Duplicate => {
        writeln!(out, "you already voted on {}", event.title)?;
        Ok(ExitCode::FAILURE)
      }
    }
  }

  async fn my_votes(&self, out: &mut impl Write) -> anyhow::Result<ExitCode> {
    self.votes.listen_to_user_votes(Some(&self.signed_in_uid()?)).await;
    let votes = self.votes.user_votes();
    self.votes.stop_listening();

    if votes.is_empty() {
      writeln!(out, "no votes yet")?;
    }
    for vote in &votes {
      writeln!(out, "{}", render::vote_line(vote))?;
    }
    Ok(ExitCode::SUCCESS)
  }

  async fn stats(&self, event_id: &str, out: &mut impl Write) -> anyhow::Result<ExitCode> {
    if !self.session.is_admin() {
      writeln!(out, "stats are for administrators only")?;
      return Ok(ExitCode::FAILURE);
    }

    self.votes.fetch_all_votes().await;
    let count = self.votes.event_vote_count(event_id);
    let yes = self.votes.event_yes_percentage(event_id);
    writeln!(out, "{}", render::stats_line(event_id, count, yes))?;
    Ok(ExitCode::SUCCESS)
  }
}

/// The password from the command line, or one line read from stdin.
fn password_or_stdin(creds: &Credentials) -> anyhow::Result<String> {
  if let Some(password) = &creds.password {
    return Ok(password.clone());
  }

  eprint!("Password: ");
  io::stderr().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(
    line
      .trim_end_matches('\n')
      .trim_end_matches('\r')
      .to_string(),
  )
}
