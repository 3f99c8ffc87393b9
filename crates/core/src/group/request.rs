use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::domain::actor::RunnerKind;
use crate::domain::event::{ContextSync, NotifyKind, Priority};
use crate::domain::group::{GroupState, SettingsPatch};
use crate::error::CoreError;
use crate::permission::Operation;
use crate::router::MessageArgs;

const DEFAULT_INBOX_LIMIT: usize = 50;
const DEFAULT_TAIL: usize = 50;
const DEFAULT_PAGE: usize = 100;
const DEFAULT_OUTPUT_BYTES: usize = 4096;

/// Every group-scoped control-surface method.
pub const GROUP_METHODS: &[&str] = &[
  "group.show",
  "group.set_state",
  "group.start",
  "group.stop",
  "group.update_settings",
  "context.sync",
  "actor.add",
  "actor.start",
  "actor.stop",
  "actor.restart",
  "actor.remove",
  "actor.update",
  "actor.list",
  "actor.output",
  "message.send",
  "message.reply",
  "message.ack",
  "message.ack_status",
  "inbox.list",
  "inbox.mark_read",
  "inbox.mark_all_read",
  "ledger.tail",
  "ledger.read_from",
  "system.notify",
  "automation.snapshot",
];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ActorAddArgs {
  pub actor_id: String,
  pub runtime: String,
  #[serde(default)]
  pub runner: RunnerKind,
  #[serde(default)]
  pub command: Option<Vec<String>>,
  #[serde(default)]
  pub cwd: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NotifyArgs {
  pub to: String,
  pub text: String,
  #[serde(default)]
  pub kind: NotifyKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupRequest {
  Show,
  SetState { state: GroupState },
  StartAll,
  StopAll,
  UpdateSettings(SettingsPatch),
  ContextSync(ContextSync),
  ActorAdd(ActorAddArgs),
  ActorStart { actor_id: String },
  ActorStop { actor_id: String },
  ActorRestart { actor_id: String },
  ActorRemove { actor_id: String },
  ActorUpdate { actor_id: String, enabled: bool },
  ActorList,
  ActorOutput { actor_id: String, max_bytes: usize },
  MessageSend(MessageArgs),
  MessageAck { event_id: u64 },
  AckStatus { event_id: u64 },
  InboxList { limit: usize },
  InboxMarkRead { event_id: u64 },
  InboxMarkAllRead,
  LedgerTail { n: usize },
  LedgerReadFrom { cursor: u64, limit: usize },
  SystemNotify(NotifyArgs),
  AutomationSnapshot,
}

#[derive(Deserialize)]
struct ActorArgs {
  actor_id: String,
}

#[derive(Deserialize)]
struct UpdateArgs {
  actor_id: String,
  enabled: bool,
}

#[derive(Deserialize)]
struct OutputArgs {
  actor_id: String,
  #[serde(default)]
  max_bytes: Option<usize>,
}

#[derive(Deserialize)]
struct StateArgs {
  state: GroupState,
}

#[derive(Deserialize)]
struct ReplyArgs {
  reply_to: u64,
  #[serde(default)]
  to: Vec<String>,
  text: String,
  #[serde(default)]
  priority: Priority,
}

#[derive(Deserialize)]
struct EventArgs {
  event_id: u64,
}

#[derive(Deserialize)]
struct LimitArgs {
  #[serde(default)]
  limit: Option<usize>,
}

#[derive(Deserialize)]
struct TailArgs {
  #[serde(default)]
  n: Option<usize>,
}

#[derive(Deserialize)]
struct ReadFromArgs {
  #[serde(default)]
  cursor: u64,
  #[serde(default)]
  limit: Option<usize>,
}

fn args<T: DeserializeOwned>(value: Value) -> Result<T, CoreError> {
  let value = match value {
    Value::Null => Value::Object(Default::default()),
    other => other,
  };
  Ok(serde_json::from_value(value)?)
}

impl GroupRequest {
  /// Build a request from a method name and its `args` object.
  pub fn parse(method: &str, raw: Value) -> Result<Self, CoreError> {
    let request = match method {
      "group.show" => GroupRequest::Show,
      "group.set_state" => {
        let a: StateArgs = args(raw)?;
        GroupRequest::SetState { state: a.state }
      }
      "group.start" => GroupRequest::StartAll,
      "group.stop" => GroupRequest::StopAll,
      "group.update_settings" => GroupRequest::UpdateSettings(args(raw)?),
      "context.sync" => GroupRequest::ContextSync(args(raw)?),
      "actor.add" => GroupRequest::ActorAdd(args(raw)?),
      "actor.start" => GroupRequest::ActorStart {
        actor_id: args::<ActorArgs>(raw)?.actor_id,
      },
      "actor.stop" => GroupRequest::ActorStop {
        actor_id: args::<ActorArgs>(raw)?.actor_id,
      },
      "actor.restart" => GroupRequest::ActorRestart {
        actor_id: args::<ActorArgs>(raw)?.actor_id,
      },
      "actor.remove" => GroupRequest::ActorRemove {
        actor_id: args::<ActorArgs>(raw)?.actor_id,
      },
      "actor.update" => {
        let a: UpdateArgs = args(raw)?;
        GroupRequest::ActorUpdate {
          actor_id: a.actor_id,
          enabled: a.enabled,
        }
      }
      "actor.list" => GroupRequest::ActorList,
      "actor.output" => {
        let a: OutputArgs = args(raw)?;
        GroupRequest::ActorOutput {
          actor_id: a.actor_id,
          max_bytes: a.max_bytes.unwrap_or(DEFAULT_OUTPUT_BYTES),
        }
      }
      "message.send" => {
        let mut a: MessageArgs = args(raw)?;
        // Replies go through `message.reply` so the linkage is always explicit.
        a.reply_to = None;
        GroupRequest::MessageSend(a)
      }
      "message.reply" => {
        let a: ReplyArgs = args(raw)?;
        GroupRequest::MessageSend(MessageArgs {
          to: a.to,
          text: a.text,
          priority: a.priority,
          reply_to: Some(a.reply_to),
        })
      }
      "message.ack" => GroupRequest::MessageAck {
        event_id: args::<EventArgs>(raw)?.event_id,
      },
      "message.ack_status" => GroupRequest::AckStatus {
        event_id: args::<EventArgs>(raw)?.event_id,
      },
      "inbox.list" => GroupRequest::InboxList {
        limit: args::<LimitArgs>(raw)?.limit.unwrap_or(DEFAULT_INBOX_LIMIT),
      },
      "inbox.mark_read" => GroupRequest::InboxMarkRead {
        event_id: args::<EventArgs>(raw)?.event_id,
      },
      "inbox.mark_all_read" => GroupRequest::InboxMarkAllRead,
      "ledger.tail" => GroupRequest::LedgerTail {
        n: args::<TailArgs>(raw)?.n.unwrap_or(DEFAULT_TAIL),
      },
      "ledger.read_from" => {
        let a: ReadFromArgs = args(raw)?;
        GroupRequest::LedgerReadFrom {
          cursor: a.cursor,
          limit: a.limit.unwrap_or(DEFAULT_PAGE),
        }
      }
      "system.notify" => GroupRequest::SystemNotify(args(raw)?),
      "automation.snapshot" => GroupRequest::AutomationSnapshot,
      other => return Err(CoreError::invalid(format!("unknown operation `{other}`"))),
    };
    Ok(request)
  }

  pub fn method(&self) -> &'static str {
    match self {
      GroupRequest::Show => "group.show",
      GroupRequest::SetState { .. } => "group.set_state",
      GroupRequest::StartAll => "group.start",
      GroupRequest::StopAll => "group.stop",
      GroupRequest::UpdateSettings(_) => "group.update_settings",
      GroupRequest::ContextSync(_) => "context.sync",
      GroupRequest::ActorAdd(_) => "actor.add",
      GroupRequest::ActorStart { .. } => "actor.start",
      GroupRequest::ActorStop { .. } => "actor.stop",
      GroupRequest::ActorRestart { .. } => "actor.restart",
      GroupRequest::ActorRemove { .. } => "actor.remove",
      GroupRequest::ActorUpdate { .. } => "actor.update",
      GroupRequest::ActorList => "actor.list",
      GroupRequest::ActorOutput { .. } => "actor.output",
      GroupRequest::MessageSend(a) if a.reply_to.is_some() => "message.reply",
      GroupRequest::MessageSend(_) => "message.send",
      GroupRequest::MessageAck { .. } => "message.ack",
      GroupRequest::AckStatus { .. } => "message.ack_status",
      GroupRequest::InboxList { .. } => "inbox.list",
      GroupRequest::InboxMarkRead { .. } => "inbox.mark_read",
      GroupRequest::InboxMarkAllRead => "inbox.mark_all_read",
      GroupRequest::LedgerTail { .. } => "ledger.tail",
      GroupRequest::LedgerReadFrom { .. } => "ledger.read_from",
      GroupRequest::SystemNotify(_) => "system.notify",
      GroupRequest::AutomationSnapshot => "automation.snapshot",
    }
  }

  pub fn operation(&self) -> Operation<'_> {
    match self {
      GroupRequest::ActorAdd(_) => Operation::ActorAdd,
      GroupRequest::ActorStart { actor_id }
      | GroupRequest::ActorStop { actor_id }
      | GroupRequest::ActorRestart { actor_id }
      | GroupRequest::ActorUpdate { actor_id, .. }
      | GroupRequest::ActorOutput { actor_id, .. } => Operation::ActorControl { target: actor_id },
      GroupRequest::ActorRemove { actor_id } => Operation::ActorRemove { target: actor_id },
      GroupRequest::SetState { .. }
      | GroupRequest::StartAll
      | GroupRequest::StopAll
      | GroupRequest::UpdateSettings(_)
      | GroupRequest::ContextSync(_) => Operation::GroupAdmin,
      GroupRequest::SystemNotify(_) => Operation::SystemNotify,
      GroupRequest::AutomationSnapshot => Operation::AutomationSnapshot,
      GroupRequest::Show
      | GroupRequest::ActorList
      | GroupRequest::MessageSend(_)
      | GroupRequest::MessageAck { .. }
      | GroupRequest::AckStatus { .. }
      | GroupRequest::InboxList { .. }
      | GroupRequest::InboxMarkRead { .. }
      | GroupRequest::InboxMarkAllRead
      | GroupRequest::LedgerTail { .. }
      | GroupRequest::LedgerReadFrom { .. } => Operation::Participate,
    }
  }
}
