use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::actor::{Lifecycle, Role, RunnerKind};
use crate::domain::event::Event;
use crate::domain::group::{GroupContext, GroupSettings, GroupState};

/// Typed error vocabulary shared by the daemon and every client.
///
/// `DaemonNotRunning` and `SocketNotFound` are only produced client-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
  DaemonNotRunning,
  SocketNotFound,
  Timeout,
  InvalidRequest,
  PermissionDenied,
  GroupNotFound,
  ActorNotFound,
  Internal,
}

impl ErrorCode {
  pub fn as_str(&self) -> &'static str {
    match self {
      ErrorCode::DaemonNotRunning => "DAEMON_NOT_RUNNING",
      ErrorCode::SocketNotFound => "SOCKET_NOT_FOUND",
      ErrorCode::Timeout => "TIMEOUT",
      ErrorCode::InvalidRequest => "INVALID_REQUEST",
      ErrorCode::PermissionDenied => "PERMISSION_DENIED",
      ErrorCode::GroupNotFound => "GROUP_NOT_FOUND",
      ErrorCode::ActorNotFound => "ACTOR_NOT_FOUND",
      ErrorCode::Internal => "INTERNAL",
    }
  }

  /// Numeric JSON-RPC error code carried alongside the symbolic one.
  pub fn rpc_code(&self) -> i32 {
    match self {
      ErrorCode::InvalidRequest => -32602,
      ErrorCode::Internal => -32603,
      ErrorCode::PermissionDenied => -32001,
      ErrorCode::GroupNotFound => -32002,
      ErrorCode::ActorNotFound => -32003,
      ErrorCode::Timeout => -32004,
      ErrorCode::DaemonNotRunning => -32010,
      ErrorCode::SocketNotFound => -32011,
    }
  }
}

impl fmt::Display for ErrorCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// `data` member of every JSON-RPC error returned by the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorData {
  pub code: ErrorCode,
}

/// Params envelope for every group-scoped method.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlRequest {
  pub group_id: String,
  /// Caller identity: `user` or an actor id.
  #[serde(default = "default_by")]
  pub by: String,
  #[serde(default)]
  pub args: serde_json::Value,
}

fn default_by() -> String {
  crate::domain::event::USER_ID.to_string()
}

/// Response type for daemon.status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DaemonStatus {
  pub version: String,
  pub pid: u32,
  pub socket_path: String,
  pub home: String,
  pub groups: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachParams {
  pub path: String,
  #[serde(default)]
  pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachResult {
  pub group_id: String,
  pub created: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActorInfo {
  pub actor_id: String,
  pub role: Role,
  pub runtime: String,
  pub runner: RunnerKind,
  pub enabled: bool,
  pub lifecycle: Lifecycle,
  pub ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupInfo {
  pub group_id: String,
  pub title: String,
  pub scope: String,
  pub state: GroupState,
  pub settings: GroupSettings,
  pub context: GroupContext,
  pub foreman: Option<String>,
  pub actors: Vec<ActorInfo>,
  pub last_event_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupList {
  pub groups: Vec<GroupSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupSummary {
  pub group_id: String,
  pub title: String,
  pub scope: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SendResult {
  pub event: Event,
  /// Resolved recipients (actors in creation order, then `user`).
  pub recipients: Vec<String>,
  /// Target tokens that matched nothing; the message was still recorded.
  pub unresolved: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AckStatus {
  pub event_id: u64,
  pub acks: BTreeMap<String, bool>,
  pub fully_acked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InboxList {
  pub actor_id: String,
  pub cursor: u64,
  pub events: Vec<Event>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MarkReadResult {
  pub actor_id: String,
  pub cursor: u64,
  /// False when the call was a no-op (older or equal id).
  pub advanced: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerPage {
  pub events: Vec<Event>,
  pub last_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LifecycleResult {
  pub actor_id: String,
  pub lifecycle: Lifecycle,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActorOutput {
  pub actor_id: String,
  pub data: String,
}

/// Per-actor facts the automation scheduler cannot derive from the ledger stream alone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActorProbe {
  pub actor_id: String,
  pub lifecycle: Lifecycle,
  pub runner: RunnerKind,
  /// Unread `chat.message` events addressed to this actor.
  pub unread_messages: usize,
  /// Age in milliseconds of the oldest of those messages.
  #[serde(default)]
  pub oldest_unread_age_ms: Option<u64>,
  /// Milliseconds since the runner last produced output, for runners that track it.
  pub idle_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AutomationSnapshot {
  pub state: GroupState,
  pub settings: GroupSettings,
  pub foreman: Option<String>,
  pub actors: Vec<ActorProbe>,
}
