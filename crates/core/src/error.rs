use thiserror::Error;

use crate::domain::actor::{ActorIdError, InvalidTransition};
use crate::ledger::LedgerError;
use crate::rpc::ErrorCode;

/// Error returned by group operations and surfaced through the control surface.
#[derive(Debug, Error)]
pub enum CoreError {
  #[error("{0}")]
  InvalidRequest(String),
  #[error("{0}")]
  PermissionDenied(String),
  #[error("group not found: {0}")]
  GroupNotFound(String),
  #[error("actor not found: {0}")]
  ActorNotFound(String),
  #[error("request timed out after {0}s; outcome unknown")]
  Timeout(u64),
  #[error(transparent)]
  Ledger(#[from] LedgerError),
  #[error("{0}")]
  Internal(String),
}

impl CoreError {
  pub fn invalid(msg: impl Into<String>) -> Self {
    CoreError::InvalidRequest(msg.into())
  }

  pub fn internal(msg: impl Into<String>) -> Self {
    CoreError::Internal(msg.into())
  }

  pub fn code(&self) -> ErrorCode {
    match self {
      CoreError::InvalidRequest(_) => ErrorCode::InvalidRequest,
      CoreError::PermissionDenied(_) => ErrorCode::PermissionDenied,
      CoreError::GroupNotFound(_) => ErrorCode::GroupNotFound,
      CoreError::ActorNotFound(_) => ErrorCode::ActorNotFound,
      CoreError::Timeout(_) => ErrorCode::Timeout,
      CoreError::Ledger(_) | CoreError::Internal(_) => ErrorCode::Internal,
    }
  }
}

impl From<ActorIdError> for CoreError {
  fn from(err: ActorIdError) -> Self {
    CoreError::InvalidRequest(err.to_string())
  }
}

impl From<InvalidTransition> for CoreError {
  fn from(err: InvalidTransition) -> Self {
    CoreError::InvalidRequest(err.to_string())
  }
}

impl From<serde_json::Error> for CoreError {
  fn from(err: serde_json::Error) -> Self {
    CoreError::InvalidRequest(format!("invalid arguments: {err}"))
  }
}
