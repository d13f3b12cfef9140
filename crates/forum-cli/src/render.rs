//! Plain-text formatting of events and votes for terminal output.

use forum_core::{
  event::Event,
  vote::{Vote, VoteChoice},
};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// One summary line per event: id, date, title and tallies.
pub fn event_line(event: &Event) -> String {
  format!(
    "{:<12} {}  {}  [yes {} / no {}]",
    event.id,
    event.date.format(DATE_FORMAT),
    event.title,
    event.yes_votes,
    event.no_votes,
  )
}

/// Multi-line view of a single event, with the viewer's own vote if known.
pub fn event_detail(event: &Event, own_vote: Option<VoteChoice>) -> String {
  let mut out = format!(
    "{}\n  id:    {}\n  date:  {}\n  votes: {} yes, {} no ({} total)",
    event.title,
    event.id,
    event.date.format(DATE_FORMAT),
    event.yes_votes,
    event.no_votes,
    event.total_votes(),
  );
  if let Some(updated_at) = event.updated_at {
    out.push_str(&format!("\n  updated {}", updated_at.format(DATE_FORMAT)));
  }
  if let Some(choice) = own_vote {
    out.push_str(&format!("\n  you voted {choice}"));
  }
  out
}

pub fn vote_line(vote: &Vote) -> String {
  format!(
    "{:<12} {:<3}  {}",
    vote.event_id,
    vote.vote,
    vote.timestamp.format(DATE_FORMAT),
  )
}

pub fn stats_line(event_id: &str, count: usize, yes_percent: u32) -> String {
  format!("{event_id}: {count} votes, {yes_percent}% yes")
}

#[cfg(test)]
mod tests {
  use chrono::{TimeZone, Utc};
  use forum_core::vote::NewVote;

  use super::*;

  fn event() -> Event {
    Event {
      id:         "e1".into(),
      title:      "Kickoff".into(),
      date:       Utc.with_ymd_and_hms(2099, 1, 1, 18, 30, 0).unwrap(),
      yes_votes:  3,
      no_votes:   1,
      updated_at: None,
    }
  }

  #[test]
  fn event_line_shows_tallies() {
    let line = event_line(&event());
    assert!(line.starts_with("e1 "));
    assert!(line.contains("2099-01-01 18:30"));
    assert!(line.ends_with("Kickoff  [yes 3 / no 1]"));
  }

  #[test]
  fn event_detail_includes_own_vote() {
    let detail = event_detail(&event(), Some(VoteChoice::No));
    assert!(detail.starts_with("Kickoff\n"));
    assert!(detail.contains("3 yes, 1 no (4 total)"));
    assert!(detail.ends_with("you voted no"));
    assert!(!event_detail(&event(), None).contains("you voted"));
  }

  #[test]
  fn vote_line_lists_choice() {
    let vote = Vote::record(
      NewVote::new("e1", "u1", VoteChoice::Yes),
      Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap(),
    );
    assert_eq!(vote_line(&vote), "e1           yes  2024-05-02 09:00");
  }

  #[test]
  fn stats_line_format() {
    assert_eq!(stats_line("e1", 3, 67), "e1: 3 votes, 67% yes");
  }
}
