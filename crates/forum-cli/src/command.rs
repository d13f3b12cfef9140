//! Subcommands of the `forum` binary and the route each one navigates to.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use forum_core::{
  guard::{self, Route},
  vote::VoteChoice,
};

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
  /// Register a new account and sign in.
  Signup(Credentials),
  /// Sign in to an existing account.
  Signin(Credentials),
  /// Sign out.
  Logout,
  /// Show the signed-in account.
  Whoami,
  /// List events, all of them by default.
  Events {
    /// Only events that have not happened yet, soonest first.
    #[arg(long, conflicts_with = "past")]
    upcoming: bool,
    /// Only events that already happened, most recent first.
    #[arg(long)]
    past:     bool,
  },
  /// Show one event.
  Event { id: String },
  /// Vote on an event.
  Vote {
    event_id: String,
    /// `yes` or `no`.
    choice:   VoteChoice,
  },
  /// List your own votes.
  MyVotes,
  /// Vote count and yes share for an event (admins only).
  Stats { event_id: String },
  /// Print upcoming events every time they change, until Ctrl-C.
  Watch,
  /// Import events from a JSON object keyed by event id.
  Seed { file: PathBuf },
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
  pub email: String,

  /// Password; read from stdin when omitted.
  #[arg(long, env = "FORUM_PASSWORD", hide_env_values = true)]
  pub password: Option<String>,
}

impl Command {
  /// The route the guard checks before the command runs.
  pub fn route(&self) -> Route {
    match self {
      Self::Signup(_) | Self::Signin(_) => guard::LOGIN,
      Self::Logout | Self::Whoami | Self::Seed { .. } => guard::HOME,
      Self::Events { .. }
      | Self::Event { .. }
      | Self::Vote { .. }
      | Self::MyVotes
      | Self::Stats { .. }
      | Self::Watch => guard::EVENTS,
    }
  }
}
