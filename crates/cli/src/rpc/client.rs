use std::path::{Path, PathBuf};
use std::time::Duration;

use cccc_core::rpc::{AttachParams, AttachResult, DaemonStatus, ErrorCode, GroupList};
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, body::Bytes};
use hyper_util::client::legacy::Client as HttpClient;
use hyperlocal::UnixClientExt;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("no daemon socket at {}", .0.display())]
  SocketNotFound(PathBuf),
  #[error("daemon not running at {}: {reason}", .sock.display())]
  DaemonNotRunning { sock: PathBuf, reason: String },
  #[error("request timed out after {0}s; outcome unknown")]
  Timeout(u64),
  #[error("{message}")]
  Rpc {
    code: i32,
    symbol: Option<ErrorCode>,
    message: String,
  },
  #[error("http: {0}")]
  Http(#[from] hyper::Error),
  #[error("json: {0}")]
  Json(#[from] serde_json::Error),
  #[error("http status {0}: {1}")]
  HttpStatus(u16, String),
}

impl Error {
  /// Symbolic code for this failure. Transport and decoding problems map to INTERNAL.
  pub fn code(&self) -> ErrorCode {
    match self {
      Error::SocketNotFound(_) => ErrorCode::SocketNotFound,
      Error::DaemonNotRunning { .. } => ErrorCode::DaemonNotRunning,
      Error::Timeout(_) => ErrorCode::Timeout,
      Error::Rpc {
        symbol: Some(code), ..
      } => *code,
      Error::Rpc { code: -32602, .. } => ErrorCode::InvalidRequest,
      Error::Rpc { .. } | Error::Http(_) | Error::Json(_) | Error::HttpStatus(..) => {
        ErrorCode::Internal
      }
    }
  }
}

pub type Result<T> = std::result::Result<T, Error>;

/// JSON-RPC client bound to one daemon socket.
pub struct Client {
  sock: PathBuf,
  timeout: Duration,
  http: HttpClient<hyperlocal::UnixConnector, Full<Bytes>>,
}

impl Client {
  pub fn new(sock: &Path, timeout: Duration) -> Self {
    Self {
      sock: sock.to_path_buf(),
      timeout,
      http: HttpClient::unix(),
    }
  }

  pub fn socket(&self) -> &Path {
    &self.sock
  }

  pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
    if !self.sock.exists() {
      return Err(Error::SocketNotFound(self.sock.clone()));
    }
    debug!(event = "rpc_call", method, socket = %self.sock.display());
    match tokio::time::timeout(self.timeout, self.send(method, params)).await {
      Ok(result) => result,
      Err(_) => Err(Error::Timeout(self.timeout.as_secs())),
    }
  }

  async fn send(&self, method: &str, params: Option<Value>) -> Result<Value> {
    let url = hyperlocal::Uri::new(&self.sock, "/");
    let req_body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
    let req = Request::builder()
      .method(Method::POST)
      .uri(url)
      .header(hyper::header::CONTENT_TYPE, "application/json")
      .body(Full::<Bytes>::from(serde_json::to_vec(&req_body)?))
      .map_err(|e| Error::HttpStatus(0, e.to_string()))?;

    let resp = self
      .http
      .request(req)
      .await
      .map_err(|e| Error::DaemonNotRunning {
        sock: self.sock.clone(),
        reason: e.to_string(),
      })?;
    let status_code = resp.status();
    let bytes = resp.into_body().collect().await?.to_bytes();
    if !status_code.is_success() {
      return Err(Error::HttpStatus(
        status_code.as_u16(),
        String::from_utf8_lossy(&bytes).into(),
      ));
    }
    let v: Value = serde_json::from_slice(&bytes)?;
    if let Some(err) = v.get("error") {
      return Err(rpc_error(err));
    }
    v.get("result").cloned().ok_or_else(|| Error::Rpc {
      code: -32603,
      symbol: Some(ErrorCode::Internal),
      message: "missing result".to_string(),
    })
  }

  async fn call_typed<T: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> Result<T> {
    let v = self.call(method, params).await?;
    Ok(serde_json::from_value(v)?)
  }

  pub async fn daemon_status(&self) -> Result<DaemonStatus> {
    self.call_typed("daemon.status", None).await
  }

  pub async fn daemon_shutdown(&self) -> Result<()> {
    let _ = self.call("daemon.shutdown", None).await?;
    Ok(())
  }

  pub async fn group_attach(&self, params: AttachParams) -> Result<AttachResult> {
    self
      .call_typed("group.attach", Some(serde_json::to_value(params)?))
      .await
  }

  pub async fn group_list(&self) -> Result<GroupList> {
    self.call_typed("group.list", None).await
  }

  /// Call a group-scoped method with the `{group_id, by, args}` envelope.
  pub async fn group_call<T: DeserializeOwned>(
    &self,
    method: &str,
    group_id: &str,
    by: &str,
    args: Value,
  ) -> Result<T> {
    let params = json!({ "group_id": group_id, "by": by, "args": args });
    self.call_typed(method, Some(params)).await
  }
}

fn rpc_error(err: &Value) -> Error {
  let code = err.get("code").and_then(|c| c.as_i64()).unwrap_or(-32000) as i32;
  let message = match err.get("message").and_then(|m| m.as_str()) {
    Some(m) => m.to_string(),
    None => err.to_string(),
  };
  let symbol = err
    .get("data")
    .and_then(|d| d.get("code"))
    .and_then(|c| serde_json::from_value(c.clone()).ok());
  Error::Rpc {
    code,
    symbol,
    message,
  }
}
