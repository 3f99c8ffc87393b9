use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::event::{SYSTEM_ID, USER_ID};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunnerKind {
  #[default]
  Pty,
  Headless,
}

impl fmt::Display for RunnerKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RunnerKind::Pty => f.write_str("pty"),
      RunnerKind::Headless => f.write_str("headless"),
    }
  }
}

/// Derived from creation order and the enabled flag; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
  Foreman,
  Peer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
  #[default]
  Stopped,
  Starting,
  Running,
  Stopping,
  Removed,
}

impl Lifecycle {
  pub fn can_transition(from: Lifecycle, to: Lifecycle) -> bool {
    use Lifecycle::*;
    matches!(
      (from, to),
      (Stopped, Starting)
        | (Starting, Running)
        | (Starting, Stopped)
        | (Running, Stopping)
        | (Running, Stopped)
        | (Stopping, Stopped)
        | (Stopped, Removed)
    )
  }

  /// Transitional states park further lifecycle requests until they settle.
  pub fn is_transitional(&self) -> bool {
    matches!(self, Lifecycle::Starting | Lifecycle::Stopping)
  }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid lifecycle transition: {from:?} -> {to:?}")]
pub struct InvalidTransition {
  pub from: Lifecycle,
  pub to: Lifecycle,
}

/// Registry entry rebuilt from `actor.added` / `actor.updated` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorRecord {
  pub id: String,
  pub runtime: String,
  pub runner: RunnerKind,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub command: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cwd: Option<String>,
  pub enabled: bool,
  /// Id of the `actor.added` event; defines creation order.
  pub added_at: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActorIdError {
  #[error("actor id must match [A-Za-z0-9_-]{{1,32}}: {0:?}")]
  Malformed(String),
  #[error("actor id `{0}` is reserved")]
  Reserved(String),
}

pub fn validate_actor_id(id: &str) -> Result<(), ActorIdError> {
  if !actor_id_regex().is_match(id) {
    return Err(ActorIdError::Malformed(id.to_string()));
  }
  if id.eq_ignore_ascii_case(USER_ID) || id.eq_ignore_ascii_case(SYSTEM_ID) {
    return Err(ActorIdError::Reserved(id.to_string()));
  }
  Ok(())
}

fn actor_id_regex() -> &'static Regex {
  static ONCE_CELL: OnceLock<Regex> = OnceLock::new();
  ONCE_CELL.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,32}$").expect("valid regex"))
}

#[cfg(test)]
mod tests {
  use super::*;
  use proptest::prelude::*;

  #[test]
  fn lifecycle_transitions_enforced() {
    use Lifecycle::*;
    assert!(Lifecycle::can_transition(Stopped, Starting));
    assert!(Lifecycle::can_transition(Starting, Running));
    assert!(Lifecycle::can_transition(Running, Stopping));
    assert!(Lifecycle::can_transition(Stopping, Stopped));
    assert!(Lifecycle::can_transition(Stopped, Removed));
    // removal only from stopped
    assert!(!Lifecycle::can_transition(Running, Removed));
    assert!(!Lifecycle::can_transition(Starting, Removed));
    // removed is terminal
    assert!(!Lifecycle::can_transition(Removed, Starting));
    assert!(!Lifecycle::can_transition(Removed, Stopped));
  }

  #[test]
  fn reserved_and_malformed_ids_are_rejected() {
    assert!(validate_actor_id("peer-1").is_ok());
    assert!(validate_actor_id("Foreman_A").is_ok());
    assert_eq!(
      validate_actor_id("User"),
      Err(ActorIdError::Reserved("User".into()))
    );
    assert!(matches!(
      validate_actor_id("system"),
      Err(ActorIdError::Reserved(_))
    ));
    assert!(matches!(
      validate_actor_id("@all"),
      Err(ActorIdError::Malformed(_))
    ));
    assert!(matches!(validate_actor_id(""), Err(ActorIdError::Malformed(_))));
    assert!(matches!(
      validate_actor_id(&"x".repeat(33)),
      Err(ActorIdError::Malformed(_))
    ));
  }

  proptest! {
    #[test]
    fn well_formed_ids_validate(id in "[a-z0-9][A-Za-z0-9_-]{0,31}") {
      prop_assume!(!id.eq_ignore_ascii_case("user") && !id.eq_ignore_ascii_case("system"));
      prop_assert!(validate_actor_id(&id).is_ok());
    }
  }
}
