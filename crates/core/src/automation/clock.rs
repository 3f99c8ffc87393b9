use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::Regex;

use crate::domain::actor::{Lifecycle, RunnerKind};
use crate::domain::event::{Event, EventBody, NotifyKind, SYSTEM_ID, USER_ID};
use crate::domain::group::GroupState;
use crate::rpc::AutomationSnapshot;

/// A notification the scheduler wants to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomationAction {
  pub to: String,
  pub kind: NotifyKind,
  pub text: String,
}

#[derive(Debug, Default)]
struct NudgeState {
  since: Option<Instant>,
  sent: u32,
  last_sent: Option<Instant>,
}

#[derive(Debug)]
struct KeepaliveState {
  armed_at: Instant,
  fired: bool,
}

/// Timer bookkeeping for one group. Pure: callers feed it events and snapshots with the time
/// they were observed, and it answers with the notifications that are due.
#[derive(Debug)]
pub struct AutomationClock {
  suspended: bool,
  last_activity: Instant,
  silence_fired: bool,
  nudges: HashMap<String, NudgeState>,
  idle_fired: HashSet<String>,
  keepalive: HashMap<String, KeepaliveState>,
}

fn has_next_line(text: &str) -> bool {
  get_next_regex().is_match(text)
}

fn get_next_regex() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"(?m)^\s*Next:").expect("valid regex"))
}

fn elapsed(now: Instant, since: Instant, secs: u64) -> bool {
  now.saturating_duration_since(since) >= Duration::from_secs(secs)
}

impl AutomationClock {
  pub fn new(now: Instant) -> Self {
    Self {
      suspended: false,
      last_activity: now,
      silence_fired: false,
      nudges: HashMap::new(),
      idle_fired: HashSet::new(),
      keepalive: HashMap::new(),
    }
  }

  pub fn observe(&mut self, event: &Event, now: Instant) {
    if event.by == SYSTEM_ID {
      return;
    }
    self.last_activity = now;
    self.silence_fired = false;

    if let EventBody::ChatRead(read) = &event.body {
      self.nudges.remove(&read.actor_id);
    }

    if event.by == USER_ID {
      return;
    }
    match &event.body {
      EventBody::ChatMessage(msg) if has_next_line(&msg.text) => {
        self.keepalive.insert(
          event.by.clone(),
          KeepaliveState {
            armed_at: now,
            fired: false,
          },
        );
      }
      EventBody::ChatMessage(_) => {
        self.keepalive.remove(&event.by);
      }
      _ => {
        if let Some(state) = self.keepalive.get_mut(&event.by) {
          state.armed_at = now;
        }
      }
    }
  }

  fn rearm(&mut self, now: Instant) {
    self.last_activity = now;
    self.silence_fired = false;
    self.nudges.clear();
    self.idle_fired.clear();
    for state in self.keepalive.values_mut() {
      state.armed_at = now;
    }
  }

  /// Notifications due at `now`. Nothing fires while the group is not active; on return to
  /// active every timer starts over.
  pub fn sweep(&mut self, snapshot: &AutomationSnapshot, now: Instant) -> Vec<AutomationAction> {
    if snapshot.state != GroupState::Active {
      self.suspended = true;
      return Vec::new();
    }
    if self.suspended {
      self.suspended = false;
      self.rearm(now);
    }

    let settings = &snapshot.settings;
    let escalate_to = snapshot
      .foreman
      .clone()
      .unwrap_or_else(|| USER_ID.to_string());
    let mut actions = Vec::new();

    // Silence
    if settings.silence_timeout_seconds > 0
      && !self.silence_fired
      && elapsed(now, self.last_activity, settings.silence_timeout_seconds)
    {
      self.silence_fired = true;
      actions.push(AutomationAction {
        to: escalate_to.clone(),
        kind: NotifyKind::Silence,
        text: format!(
          "No activity in this group for {}s.",
          settings.silence_timeout_seconds
        ),
      });
    }

    for probe in &snapshot.actors {
      let running = probe.lifecycle == Lifecycle::Running;

      // Nudge
      if running && probe.unread_messages > 0 {
        let state = self.nudges.entry(probe.actor_id.clone()).or_default();
        let since = *state.since.get_or_insert(now);
        let after = settings.nudge_after_seconds;
        // Age the oldest unread message by its ledger time when the snapshot carries it.
        let overdue = match probe.oldest_unread_age_ms {
          Some(age_ms) => age_ms >= after.saturating_mul(1000),
          None => elapsed(now, since, after),
        };
        let spaced = state
          .last_sent
          .is_none_or(|last| elapsed(now, last, after));
        if after > 0
          && state.sent < settings.nudge_max_repeats
          && overdue
          && spaced
        {
          state.sent += 1;
          state.last_sent = Some(now);
          actions.push(AutomationAction {
            to: probe.actor_id.clone(),
            kind: NotifyKind::Nudge,
            text: format!(
              "You have {} unread message(s). Check inbox.list and mark them read.",
              probe.unread_messages
            ),
          });
        }
      } else {
        self.nudges.remove(&probe.actor_id);
      }

      // Actor idle
      let timeout = settings.actor_idle_timeout_seconds;
      match probe.idle_ms {
        Some(idle_ms) if running && probe.runner == RunnerKind::Pty && timeout > 0 => {
          if idle_ms >= timeout.saturating_mul(1000) {
            if self.idle_fired.insert(probe.actor_id.clone()) {
              let to = match &snapshot.foreman {
                Some(foreman) if *foreman != probe.actor_id => foreman.clone(),
                _ => USER_ID.to_string(),
              };
              actions.push(AutomationAction {
                to,
                kind: NotifyKind::ActorIdle,
                text: format!(
                  "{} has produced no output for {}s.",
                  probe.actor_id,
                  idle_ms / 1000
                ),
              });
            }
          } else {
            self.idle_fired.remove(&probe.actor_id);
          }
        }
        _ => {
          self.idle_fired.remove(&probe.actor_id);
        }
      }
    }

    // Keepalive
    self
      .keepalive
      .retain(|id, _| snapshot.actors.iter().any(|a| a.actor_id == *id));
    let delay = settings.keepalive_delay_seconds;
    if delay > 0 {
      let mut due: Vec<&String> = self
        .keepalive
        .iter()
        .filter(|(_, s)| !s.fired && elapsed(now, s.armed_at, delay))
        .map(|(id, _)| id)
        .collect();
      due.sort();
      let due: Vec<String> = due.into_iter().cloned().collect();
      for actor_id in due {
        if let Some(state) = self.keepalive.get_mut(&actor_id) {
          state.fired = true;
        }
        actions.push(AutomationAction {
          to: actor_id,
          kind: NotifyKind::Keepalive,
          text: "You announced a next step. Continue with it or report your status.".to_string(),
        });
      }
    }

    actions
  }
}
