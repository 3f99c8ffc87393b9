use std::collections::HashSet;

use crate::domain::event::USER_ID;
use crate::domain::group::GroupView;

/// Result of resolving a message's target tokens against the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
  /// Actor recipients in creation order.
  pub actors: Vec<String>,
  /// Whether the human operator was addressed. Ack target only; never injected.
  pub user: bool,
  /// Tokens that matched nothing, in the order given.
  pub unresolved: Vec<String>,
}

impl Resolution {
  /// Actors first, then `user` when addressed.
  pub fn recipients(&self) -> Vec<String> {
    let mut out = self.actors.clone();
    if self.user {
      out.push(USER_ID.to_string());
    }
    out
  }
}

/// Resolve raw target tokens for a message sent by `sender`.
///
/// Matching is case-insensitive. An empty token list means `@all`. The sender is never a
/// recipient of its own message.
pub fn resolve(view: &GroupView, sender: &str, tokens: &[String]) -> Resolution {
  let tokens: Vec<&str> = tokens
    .iter()
    .map(|t| t.trim())
    .filter(|t| !t.is_empty())
    .collect();

  let foreman = view.foreman().map(|a| a.id.clone());
  let mut selected: HashSet<String> = HashSet::new();
  let mut user = false;
  let mut unresolved: Vec<String> = Vec::new();

  if tokens.is_empty() {
    selected.extend(view.actors().iter().map(|a| a.id.clone()));
  }

  for token in tokens {
    match token.to_ascii_lowercase().as_str() {
      "@all" => selected.extend(view.actors().iter().map(|a| a.id.clone())),
      "@foreman" => match &foreman {
        Some(id) => {
          selected.insert(id.clone());
        }
        None => push_unique(&mut unresolved, token),
      },
      "@peers" => selected.extend(
        view
          .actors()
          .iter()
          .filter(|a| Some(&a.id) != foreman.as_ref())
          .map(|a| a.id.clone()),
      ),
      "user" | "@user" => user = true,
      _ => {
        let literal = token.strip_prefix('@').unwrap_or(token);
        match view.actor_ci(literal) {
          Some(actor) => {
            selected.insert(actor.id.clone());
          }
          None => push_unique(&mut unresolved, token),
        }
      }
    }
  }

  let actors = view
    .actors()
    .iter()
    .filter(|a| a.id != sender && selected.contains(&a.id))
    .map(|a| a.id.clone())
    .collect();

  Resolution {
    actors,
    user: user && sender != USER_ID,
    unresolved,
  }
}

fn push_unique(list: &mut Vec<String>, token: &str) {
  if !list.iter().any(|t| t == token) {
    list.push(token.to_string());
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::actor::RunnerKind;
  use crate::domain::event::{ActorAdded, ActorRef, Event, EventBody};
  use crate::domain::group::GroupSettings;
  use chrono::Utc;

  fn added(id: u64, actor: &str) -> Event {
    Event {
      id,
      ts: Utc::now(),
      by: USER_ID.into(),
      body: EventBody::ActorAdded(ActorAdded {
        actor_id: actor.into(),
        runtime: "shell".into(),
        runner: RunnerKind::Pty,
        command: None,
        cwd: None,
      }),
    }
  }

  fn pqr() -> GroupView {
    GroupView::replay(
      "g",
      GroupSettings::default(),
      &[added(1, "P"), added(2, "Q"), added(3, "R")],
    )
  }

  fn toks(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn all_from_foreman_excludes_sender() {
    let r = resolve(&pqr(), "P", &toks(&["@all"]));
    assert_eq!(r.actors, vec!["Q", "R"]);
    assert!(!r.user);
    assert!(r.unresolved.is_empty());
  }

  #[test]
  fn empty_targets_mean_everyone_but_sender() {
    let r = resolve(&pqr(), USER_ID, &[]);
    assert_eq!(r.actors, vec!["P", "Q", "R"]);
    let r = resolve(&pqr(), "Q", &toks(&["  "]));
    assert_eq!(r.actors, vec!["P", "R"]);
  }

  #[test]
  fn foreman_resolves_to_current_foreman() {
    let mut view = pqr();
    let r = resolve(&view, USER_ID, &toks(&["@FOREMAN"]));
    assert_eq!(r.actors, vec!["P"]);

    view.apply(&Event {
      id: 4,
      ts: Utc::now(),
      by: USER_ID.into(),
      body: EventBody::ActorRemoved(ActorRef {
        actor_id: "P".into(),
      }),
    });
    let r = resolve(&view, USER_ID, &toks(&["@foreman"]));
    assert_eq!(r.actors, vec!["Q"]);
  }

  #[test]
  fn peers_user_literals_and_unresolved() {
    let r = resolve(&pqr(), "Q", &toks(&["@peers", "user", "p", "ghost", "ghost"]));
    // Q is excluded as sender; P comes from the literal.
    assert_eq!(r.actors, vec!["P", "R"]);
    assert!(r.user);
    assert_eq!(r.unresolved, vec!["ghost"]);
    assert_eq!(r.recipients(), vec!["P", "R", "user"]);
  }

  #[test]
  fn user_cannot_address_itself() {
    let r = resolve(&pqr(), USER_ID, &toks(&["@user", "@r"]));
    assert_eq!(r.actors, vec!["R"]);
    assert!(!r.user);
  }

  #[test]
  fn foreman_token_without_actors_is_unresolved() {
    let view = GroupView::new("g", GroupSettings::default());
    let r = resolve(&view, USER_ID, &toks(&["@foreman"]));
    assert!(r.actors.is_empty());
    assert_eq!(r.unresolved, vec!["@foreman"]);
  }
}
