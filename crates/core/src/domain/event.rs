use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::actor::RunnerKind;
use super::group::{GroupState, SettingsPatch};

/// Identity written into `by` for events produced by automation and delivery.
pub const SYSTEM_ID: &str = "system";
/// Identity of the human operator.
pub const USER_ID: &str = "user";

/// A committed ledger record. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
  pub id: u64,
  pub ts: DateTime<Utc>,
  pub by: String,
  #[serde(flatten)]
  pub body: EventBody,
}

impl Event {
  pub fn kind(&self) -> EventKind {
    self.body.kind()
  }

  /// Whether this event addresses `actor_id` as an inbox item.
  pub fn addresses(&self, actor_id: &str) -> bool {
    match &self.body {
      EventBody::ChatMessage(msg) => msg.to.iter().any(|to| to == actor_id),
      EventBody::SystemNotify(notify) => notify.to == actor_id,
      _ => false,
    }
  }
}

/// Event awaiting an id and timestamp from the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
  pub by: String,
  pub body: EventBody,
}

impl EventDraft {
  pub fn new(by: impl Into<String>, body: EventBody) -> Self {
    Self {
      by: by.into(),
      body,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
  #[serde(rename = "group.created")]
  GroupCreated,
  #[serde(rename = "group.set_state")]
  GroupSetState,
  #[serde(rename = "group.start")]
  GroupStart,
  #[serde(rename = "group.stop")]
  GroupStop,
  #[serde(rename = "group.settings")]
  GroupSettings,
  #[serde(rename = "context.sync")]
  ContextSync,
  #[serde(rename = "actor.added")]
  ActorAdded,
  #[serde(rename = "actor.updated")]
  ActorUpdated,
  #[serde(rename = "actor.started")]
  ActorStarted,
  #[serde(rename = "actor.stopped")]
  ActorStopped,
  #[serde(rename = "actor.crashed")]
  ActorCrashed,
  #[serde(rename = "actor.removed")]
  ActorRemoved,
  #[serde(rename = "chat.message")]
  ChatMessage,
  #[serde(rename = "chat.read")]
  ChatRead,
  #[serde(rename = "chat.ack")]
  ChatAck,
  #[serde(rename = "chat.delivered")]
  ChatDelivered,
  #[serde(rename = "system.notify")]
  SystemNotify,
}

impl EventKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      EventKind::GroupCreated => "group.created",
      EventKind::GroupSetState => "group.set_state",
      EventKind::GroupStart => "group.start",
      EventKind::GroupStop => "group.stop",
      EventKind::GroupSettings => "group.settings",
      EventKind::ContextSync => "context.sync",
      EventKind::ActorAdded => "actor.added",
      EventKind::ActorUpdated => "actor.updated",
      EventKind::ActorStarted => "actor.started",
      EventKind::ActorStopped => "actor.stopped",
      EventKind::ActorCrashed => "actor.crashed",
      EventKind::ActorRemoved => "actor.removed",
      EventKind::ChatMessage => "chat.message",
      EventKind::ChatRead => "chat.read",
      EventKind::ChatAck => "chat.ack",
      EventKind::ChatDelivered => "chat.delivered",
      EventKind::SystemNotify => "system.notify",
    }
  }
}

impl fmt::Display for EventKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Kind tag plus kind-specific payload, serialized as `{"kind": ..., "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum EventBody {
  #[serde(rename = "group.created")]
  GroupCreated(GroupCreated),
  #[serde(rename = "group.set_state")]
  GroupSetState(GroupStateChanged),
  #[serde(rename = "group.start")]
  GroupStart(GroupRun),
  #[serde(rename = "group.stop")]
  GroupStop(GroupRun),
  #[serde(rename = "group.settings")]
  GroupSettings(SettingsPatch),
  #[serde(rename = "context.sync")]
  ContextSync(ContextSync),
  #[serde(rename = "actor.added")]
  ActorAdded(ActorAdded),
  #[serde(rename = "actor.updated")]
  ActorUpdated(ActorUpdated),
  #[serde(rename = "actor.started")]
  ActorStarted(ActorRef),
  #[serde(rename = "actor.stopped")]
  ActorStopped(ActorStopped),
  #[serde(rename = "actor.crashed")]
  ActorCrashed(ActorCrashed),
  #[serde(rename = "actor.removed")]
  ActorRemoved(ActorRef),
  #[serde(rename = "chat.message")]
  ChatMessage(ChatMessage),
  #[serde(rename = "chat.read")]
  ChatRead(ChatRead),
  #[serde(rename = "chat.ack")]
  ChatAck(ChatAck),
  #[serde(rename = "chat.delivered")]
  ChatDelivered(ChatDelivered),
  #[serde(rename = "system.notify")]
  SystemNotify(SystemNotify),
}

impl EventBody {
  pub fn kind(&self) -> EventKind {
    match self {
      EventBody::GroupCreated(_) => EventKind::GroupCreated,
      EventBody::GroupSetState(_) => EventKind::GroupSetState,
      EventBody::GroupStart(_) => EventKind::GroupStart,
      EventBody::GroupStop(_) => EventKind::GroupStop,
      EventBody::GroupSettings(_) => EventKind::GroupSettings,
      EventBody::ContextSync(_) => EventKind::ContextSync,
      EventBody::ActorAdded(_) => EventKind::ActorAdded,
      EventBody::ActorUpdated(_) => EventKind::ActorUpdated,
      EventBody::ActorStarted(_) => EventKind::ActorStarted,
      EventBody::ActorStopped(_) => EventKind::ActorStopped,
      EventBody::ActorCrashed(_) => EventKind::ActorCrashed,
      EventBody::ActorRemoved(_) => EventKind::ActorRemoved,
      EventBody::ChatMessage(_) => EventKind::ChatMessage,
      EventBody::ChatRead(_) => EventKind::ChatRead,
      EventBody::ChatAck(_) => EventKind::ChatAck,
      EventBody::ChatDelivered(_) => EventKind::ChatDelivered,
      EventBody::SystemNotify(_) => EventKind::SystemNotify,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCreated {
  pub title: String,
  pub scope: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStateChanged {
  pub state: GroupState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRun {
  pub actors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContextSync {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub vision: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tasks: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorAdded {
  pub actor_id: String,
  pub runtime: String,
  pub runner: RunnerKind,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub command: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cwd: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorUpdated {
  pub actor_id: String,
  pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorRef {
  pub actor_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
  Requested,
  DaemonRestart,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorStopped {
  pub actor_id: String,
  pub reason: StopReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorCrashed {
  pub actor_id: String,
  #[serde(default)]
  pub exit_code: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
  #[default]
  Normal,
  Attention,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
  pub text: String,
  #[serde(default)]
  pub priority: Priority,
  /// Resolved recipients: actor ids in creation order, then `user` when addressed.
  pub to: Vec<String>,
  /// Raw target tokens as supplied by the sender.
  #[serde(default)]
  pub tokens: Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub unresolved: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reply_to: Option<u64>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub ack_required: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRead {
  pub actor_id: String,
  pub event_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatAck {
  pub event_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatDelivered {
  pub actor_id: String,
  pub event_ids: Vec<u64>,
  pub ok: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotifyKind {
  Nudge,
  ActorIdle,
  Keepalive,
  Silence,
  #[default]
  Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemNotify {
  pub to: String,
  #[serde(default)]
  pub kind: NotifyKind,
  pub text: String,
}
