use http_body_util::BodyExt;
use hyperlocal::UnixClientExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Temporary daemon home for tests.
/// Holds the socket, the group ledgers and a scratch project directory to attach.
pub struct TempHome {
  pub root: tempfile::TempDir,
}

impl Default for TempHome {
  fn default() -> Self {
    Self::new()
  }
}

impl TempHome {
  pub fn new() -> Self {
    let root = tempfile::tempdir().expect("tempdir");
    Self { root }
  }

  pub fn path(&self) -> PathBuf {
    self.root.path().to_path_buf()
  }

  /// Daemon home directory (`<root>/home`), created on demand.
  pub fn home(&self) -> PathBuf {
    let p = self.path().join("home");
    std::fs::create_dir_all(&p).expect("mkdir home");
    p
  }

  pub fn socket(&self) -> PathBuf {
    self.path().join("cccc.sock")
  }

  /// Create a project directory under the temp root, suitable for `group.attach`.
  pub fn project(&self, name: &str) -> PathBuf {
    let p = self.path().join(name);
    std::fs::create_dir_all(&p).expect("mkdir project");
    p
  }
}

/// Poll a condition repeatedly until it returns true or times out.
/// Returns true if condition met, false on timeout.
pub async fn poll_until<F, Fut>(timeout: Duration, interval: Duration, mut check: F) -> bool
where
  F: FnMut() -> Fut,
  Fut: std::future::Future<Output = bool>,
{
  use tokio::time::{Instant, sleep};
  let start = Instant::now();
  loop {
    if check().await {
      return true;
    }
    if start.elapsed() >= timeout {
      return false;
    }
    sleep(interval).await;
  }
}

/// Minimal JSON-RPC 2.0 response wrapper for tests.
#[derive(Debug, serde::Deserialize)]
pub struct RpcError {
  pub code: i32,
  pub message: String,
  pub data: Option<serde_json::Value>,
}

impl RpcError {
  /// Symbolic code carried in `data.code`, e.g. `PERMISSION_DENIED`.
  pub fn symbol(&self) -> Option<&str> {
    self.data.as_ref()?.get("code")?.as_str()
  }
}

#[derive(Debug, serde::Deserialize)]
pub struct RpcResp<T> {
  pub jsonrpc: String,
  pub id: serde_json::Value,
  pub result: Option<T>,
  pub error: Option<RpcError>,
}

/// A tiny Unix-domain JSON-RPC client used by tests.
pub struct UnixRpcClient {
  sock: PathBuf,
}

impl UnixRpcClient {
  pub fn new<P: AsRef<Path>>(sock: P) -> Self {
    Self {
      sock: sock.as_ref().to_path_buf(),
    }
  }

  fn build_request(
    &self,
    body: serde_json::Value,
  ) -> hyper::Request<http_body_util::Full<hyper::body::Bytes>> {
    let url = hyperlocal::Uri::new(&self.sock, "/");
    hyper::Request::builder()
      .method(hyper::Method::POST)
      .uri(url)
      .header(hyper::header::CONTENT_TYPE, "application/json")
      .body(http_body_util::Full::<hyper::body::Bytes>::from(
        serde_json::to_vec(&body).unwrap(),
      ))
      .unwrap()
  }

  /// Like [`UnixRpcClient::call`] but reports transport failures instead of panicking.
  pub async fn try_call<T: serde::de::DeserializeOwned>(
    &self,
    method: &str,
    params: Option<serde_json::Value>,
  ) -> Result<RpcResp<T>, String> {
    let req_body = serde_json::json!({
      "jsonrpc": "2.0",
      "id": 1,
      "method": method,
      "params": params
    });
    let req = self.build_request(req_body);
    let client = hyper_util::client::legacy::Client::unix();
    let resp = client.request(req).await.map_err(|e| e.to_string())?;
    if !resp.status().is_success() {
      return Err(format!("http status {}", resp.status()));
    }
    let bytes = resp
      .into_body()
      .collect()
      .await
      .map_err(|e| e.to_string())?
      .to_bytes();
    serde_json::from_slice(&bytes).map_err(|e| e.to_string())
  }

  pub async fn call<T: serde::de::DeserializeOwned>(
    &self,
    method: &str,
    params: Option<serde_json::Value>,
  ) -> RpcResp<T> {
    self.try_call(method, params).await.expect("request ok")
  }
}
