//! Stateless authorization of group operations.
//!
//! A decision depends only on who is calling, the caller's derived role in the current registry
//! snapshot, and (for self-scoped operations) the target actor id.

use std::fmt;

use crate::domain::actor::Role;
use crate::domain::event::{SYSTEM_ID, USER_ID};
use crate::domain::group::GroupView;
use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
  User,
  /// Automation and delivery bookkeeping inside the daemon.
  System,
  Actor(String),
}

impl Caller {
  /// Parse the `by` field of an external request. External callers may not act as `system`.
  pub fn from_external(by: &str) -> Result<Self, CoreError> {
    let by = by.trim();
    if by.is_empty() || by.eq_ignore_ascii_case(USER_ID) {
      Ok(Caller::User)
    } else if by.eq_ignore_ascii_case(SYSTEM_ID) {
      Err(CoreError::invalid("`system` is reserved for the daemon"))
    } else {
      Ok(Caller::Actor(by.to_string()))
    }
  }

  pub fn id(&self) -> &str {
    match self {
      Caller::User => USER_ID,
      Caller::System => SYSTEM_ID,
      Caller::Actor(id) => id,
    }
  }
}

impl fmt::Display for Caller {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.id())
  }
}

/// Standing of a caller for one decision. `System` is authorized as the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standing {
  Operator,
  Foreman,
  Peer,
}

impl Standing {
  pub fn of(caller: &Caller, view: &GroupView) -> Result<Self, CoreError> {
    match caller {
      Caller::User | Caller::System => Ok(Standing::Operator),
      Caller::Actor(id) => match view.role_of(id) {
        Some(Role::Foreman) => Ok(Standing::Foreman),
        Some(Role::Peer) => Ok(Standing::Peer),
        None => Err(CoreError::ActorNotFound(id.clone())),
      },
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation<'a> {
  ActorAdd,
  /// start, stop, restart, update and output.
  ActorControl { target: &'a str },
  ActorRemove { target: &'a str },
  /// set_state, start/stop all, settings and context.
  GroupAdmin,
  /// Messaging, acks, inbox and read-only views.
  Participate,
  SystemNotify,
  AutomationSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
  pub foreman_can_remove_others: bool,
}

impl Default for Policy {
  fn default() -> Self {
    Self {
      foreman_can_remove_others: true,
    }
  }
}

pub fn authorize(
  caller: &Caller,
  standing: Standing,
  op: Operation<'_>,
  policy: &Policy,
) -> Result<(), CoreError> {
  use Standing::*;
  let is_self = |target: &str| caller.id() == target;

  let allowed = match op {
    Operation::Participate => true,
    Operation::ActorAdd | Operation::GroupAdmin | Operation::SystemNotify => {
      matches!(standing, Operator | Foreman)
    }
    Operation::ActorControl { target } => match standing {
      Operator | Foreman => true,
      Peer => is_self(target),
    },
    Operation::ActorRemove { target } => match standing {
      Operator => true,
      Foreman => is_self(target) || policy.foreman_can_remove_others,
      Peer => is_self(target),
    },
    Operation::AutomationSnapshot => standing == Operator,
  };

  if allowed {
    Ok(())
  } else {
    Err(CoreError::PermissionDenied(format!(
      "{caller} ({standing:?}) may not perform {op:?}"
    )))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::CoreError;

  fn peer(id: &str) -> Caller {
    Caller::Actor(id.into())
  }

  #[test]
  fn peers_cannot_add_or_administer() {
    let policy = Policy::default();
    let p = peer("q");
    assert!(matches!(
      authorize(&p, Standing::Peer, Operation::ActorAdd, &policy),
      Err(CoreError::PermissionDenied(_))
    ));
    assert!(authorize(&p, Standing::Peer, Operation::GroupAdmin, &policy).is_err());
    assert!(authorize(&p, Standing::Peer, Operation::SystemNotify, &policy).is_err());
    assert!(authorize(&p, Standing::Peer, Operation::Participate, &policy).is_ok());
  }

  #[test]
  fn peer_controls_only_itself() {
    let policy = Policy::default();
    let p = peer("q");
    assert!(authorize(&p, Standing::Peer, Operation::ActorControl { target: "q" }, &policy).is_ok());
    assert!(authorize(&p, Standing::Peer, Operation::ActorControl { target: "r" }, &policy).is_err());
    assert!(authorize(&p, Standing::Peer, Operation::ActorRemove { target: "q" }, &policy).is_ok());
    assert!(authorize(&p, Standing::Peer, Operation::ActorRemove { target: "r" }, &policy).is_err());
  }

  #[test]
  fn foreman_removal_follows_policy() {
    let f = peer("p");
    let open = Policy::default();
    let strict = Policy {
      foreman_can_remove_others: false,
    };
    let other = Operation::ActorRemove { target: "q" };
    assert!(authorize(&f, Standing::Foreman, other, &open).is_ok());
    assert!(authorize(&f, Standing::Foreman, other, &strict).is_err());
    assert!(authorize(&f, Standing::Foreman, Operation::ActorRemove { target: "p" }, &strict).is_ok());
  }

  #[test]
  fn snapshot_is_operator_only() {
    let policy = Policy::default();
    assert!(authorize(&Caller::System, Standing::Operator, Operation::AutomationSnapshot, &policy).is_ok());
    assert!(authorize(&peer("p"), Standing::Foreman, Operation::AutomationSnapshot, &policy).is_err());
  }

  #[test]
  fn external_callers_cannot_claim_system() {
    assert_eq!(Caller::from_external("").unwrap(), Caller::User);
    assert_eq!(Caller::from_external("USER").unwrap(), Caller::User);
    assert!(matches!(
      Caller::from_external("system"),
      Err(CoreError::InvalidRequest(_))
    ));
    assert_eq!(Caller::from_external("peer1").unwrap(), peer("peer1"));
  }
}
