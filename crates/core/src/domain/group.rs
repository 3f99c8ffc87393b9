use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::actor::{ActorRecord, Role};
use super::event::{ContextSync, Event, EventBody};
use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroupState {
  #[default]
  Active,
  Idle,
  Paused,
}

impl fmt::Display for GroupState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      GroupState::Active => f.write_str("active"),
      GroupState::Idle => f.write_str("idle"),
      GroupState::Paused => f.write_str("paused"),
    }
  }
}

/// Per-group automation and delivery thresholds. Zero disables a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSettings {
  pub nudge_after_seconds: u64,
  pub nudge_max_repeats: u32,
  pub actor_idle_timeout_seconds: u64,
  pub keepalive_delay_seconds: u64,
  pub silence_timeout_seconds: u64,
  pub min_interval_seconds: u64,
}

impl GroupSettings {
  pub fn from_config(cfg: &Config) -> Self {
    Self {
      nudge_after_seconds: cfg.automation.nudge_after_seconds,
      nudge_max_repeats: cfg.automation.nudge_max_repeats,
      actor_idle_timeout_seconds: cfg.automation.actor_idle_timeout_seconds,
      keepalive_delay_seconds: cfg.automation.keepalive_delay_seconds,
      silence_timeout_seconds: cfg.automation.silence_timeout_seconds,
      min_interval_seconds: cfg.delivery.min_interval_seconds,
    }
  }

  pub fn apply(&mut self, patch: &SettingsPatch) {
    if let Some(v) = patch.nudge_after_seconds {
      self.nudge_after_seconds = v;
    }
    if let Some(v) = patch.nudge_max_repeats {
      self.nudge_max_repeats = v;
    }
    if let Some(v) = patch.actor_idle_timeout_seconds {
      self.actor_idle_timeout_seconds = v;
    }
    if let Some(v) = patch.keepalive_delay_seconds {
      self.keepalive_delay_seconds = v;
    }
    if let Some(v) = patch.silence_timeout_seconds {
      self.silence_timeout_seconds = v;
    }
    if let Some(v) = patch.min_interval_seconds {
      self.min_interval_seconds = v;
    }
  }
}

impl Default for GroupSettings {
  fn default() -> Self {
    Self::from_config(&Config::default())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SettingsPatch {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub nudge_after_seconds: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub nudge_max_repeats: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub actor_idle_timeout_seconds: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub keepalive_delay_seconds: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub silence_timeout_seconds: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub min_interval_seconds: Option<u64>,
}

impl SettingsPatch {
  pub fn is_empty(&self) -> bool {
    self == &SettingsPatch::default()
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GroupContext {
  pub vision: String,
  pub tasks: Vec<String>,
  pub notes: String,
}

impl GroupContext {
  fn apply(&mut self, sync: &ContextSync) {
    if let Some(vision) = &sync.vision {
      self.vision = vision.clone();
    }
    if let Some(tasks) = &sync.tasks {
      self.tasks = tasks.clone();
    }
    if let Some(notes) = &sync.notes {
      self.notes = notes.clone();
    }
  }
}

/// Group state folded from its ledger. Replaying the same events always yields the same view.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupView {
  pub id: String,
  pub title: String,
  pub scope: String,
  pub state: GroupState,
  pub settings: GroupSettings,
  pub context: GroupContext,
  /// Registry in creation order.
  actors: Vec<ActorRecord>,
  /// Whether the ledger last saw each actor as started (used when resuming after a restart).
  started: HashMap<String, bool>,
}

impl GroupView {
  pub fn new(id: impl Into<String>, settings: GroupSettings) -> Self {
    Self {
      id: id.into(),
      title: String::new(),
      scope: String::new(),
      state: GroupState::Active,
      settings,
      context: GroupContext::default(),
      actors: Vec::new(),
      started: HashMap::new(),
    }
  }

  pub fn replay<'a>(
    id: impl Into<String>,
    settings: GroupSettings,
    events: impl IntoIterator<Item = &'a Event>,
  ) -> Self {
    let mut view = Self::new(id, settings);
    for event in events {
      view.apply(event);
    }
    view
  }

  pub fn apply(&mut self, event: &Event) {
    match &event.body {
      EventBody::GroupCreated(created) => {
        self.title = created.title.clone();
        self.scope = created.scope.clone();
      }
      EventBody::GroupSetState(change) => self.state = change.state,
      EventBody::GroupSettings(patch) => self.settings.apply(patch),
      EventBody::ContextSync(sync) => self.context.apply(sync),
      EventBody::ActorAdded(added) => {
        if self.actor(&added.actor_id).is_none() {
          self.actors.push(ActorRecord {
            id: added.actor_id.clone(),
            runtime: added.runtime.clone(),
            runner: added.runner,
            command: added.command.clone(),
            cwd: added.cwd.clone(),
            enabled: true,
            added_at: event.id,
          });
        }
      }
      EventBody::ActorUpdated(update) => {
        if let Some(actor) = self.actors.iter_mut().find(|a| a.id == update.actor_id) {
          actor.enabled = update.enabled;
        }
      }
      EventBody::ActorStarted(r) => {
        self.started.insert(r.actor_id.clone(), true);
      }
      EventBody::ActorStopped(s) => {
        self.started.insert(s.actor_id.clone(), false);
      }
      EventBody::ActorCrashed(c) => {
        self.started.insert(c.actor_id.clone(), false);
      }
      EventBody::ActorRemoved(r) => {
        self.actors.retain(|a| a.id != r.actor_id);
        self.started.remove(&r.actor_id);
      }
      EventBody::GroupStart(_)
      | EventBody::GroupStop(_)
      | EventBody::ChatMessage(_)
      | EventBody::ChatRead(_)
      | EventBody::ChatAck(_)
      | EventBody::ChatDelivered(_)
      | EventBody::SystemNotify(_) => {}
    }
  }

  pub fn actors(&self) -> &[ActorRecord] {
    &self.actors
  }

  pub fn actor(&self, id: &str) -> Option<&ActorRecord> {
    self.actors.iter().find(|a| a.id == id)
  }

  /// Case-insensitive registry lookup used by target resolution.
  pub fn actor_ci(&self, token: &str) -> Option<&ActorRecord> {
    self.actors.iter().find(|a| a.id.eq_ignore_ascii_case(token))
  }

  /// Earliest-created actor that is still enabled.
  pub fn foreman(&self) -> Option<&ActorRecord> {
    self.actors.iter().find(|a| a.enabled)
  }

  pub fn role_of(&self, id: &str) -> Option<Role> {
    self.actor(id)?;
    match self.foreman() {
      Some(f) if f.id == id => Some(Role::Foreman),
      _ => Some(Role::Peer),
    }
  }

  /// Actors the ledger last recorded as started; on daemon boot these are marked stopped.
  pub fn recorded_running(&self) -> Vec<String> {
    self
      .actors
      .iter()
      .filter(|a| self.started.get(&a.id).copied().unwrap_or(false))
      .map(|a| a.id.clone())
      .collect()
  }
}
