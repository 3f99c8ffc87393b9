//! Unix socket transport for the control surface.
//!
//! Every accepted connection speaks JSON-RPC over HTTP/1 and is served by the shared method
//! table (`daemon.*`, `group.attach`, `group.list` and the group-scoped operations). A home
//! has at most one daemon: a socket that still answers is never taken over.

use std::fs;
use std::io;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::Path;
use std::time::Duration;

use jsonrpsee::server::{self, RpcModule};
use tokio::net::UnixListener;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::DaemonContext;

/// How long in-flight requests may finish after shutdown before connections are dropped.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
  watch::channel(false)
}

/// Remove a stale socket file, or fail if another daemon still accepts on it.
fn claim_socket(socket_path: &Path) -> io::Result<()> {
  if StdUnixStream::connect(socket_path).is_ok() {
    return Err(io::Error::new(
      io::ErrorKind::AddrInUse,
      format!("a daemon is already serving {}", socket_path.display()),
    ));
  }
  match fs::remove_file(socket_path) {
    Ok(()) => {
      info!(event = "stale_socket_removed", socket = %socket_path.display());
      Ok(())
    }
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(e) => Err(e),
  }
}

/// Bind `socket_path` and serve `module` until `shutdown_rx` flips. The returned task ends
/// after open connections drained and the socket file is gone.
pub fn start(
  socket_path: &Path,
  module: RpcModule<DaemonContext>,
  mut shutdown_rx: watch::Receiver<bool>,
) -> io::Result<JoinHandle<()>> {
  if let Some(parent) = socket_path.parent() {
    fs::create_dir_all(parent)?;
  }
  claim_socket(socket_path)?;

  let listener = UnixListener::bind(socket_path)?;
  let sock = socket_path.to_path_buf();
  let svc_builder = server::Server::builder().to_service_builder();
  let (stop_handle, server_handle) = server::stop_channel();
  info!(event = "daemon_started", socket = %sock.display(), "control surface listening");

  let task = tokio::spawn(async move {
    let mut connections = JoinSet::new();
    loop {
      tokio::select! {
        _ = shutdown_rx.changed() => {
          info!(event = "daemon_shutdown", "shutdown signal received; stopping accept loop");
          break;
        }
        Some(_) = connections.join_next(), if !connections.is_empty() => {}
        res = listener.accept() => match res {
          Ok((stream, _addr)) => {
            let svc = svc_builder.clone().build(module.clone(), stop_handle.clone());
            let stopped = stop_handle.clone().shutdown();
            connections.spawn(async move {
              if let Err(e) = server::serve_with_graceful_shutdown(stream, svc, stopped).await {
                debug!(event = "rpc_connection_closed", error = %e);
              }
            });
          }
          Err(e) => {
            error!(event = "rpc_accept_failed", error = %e);
            break;
          }
        }
      }
    }

    drop(listener);
    let _ = fs::remove_file(&sock);
    let _ = server_handle.stop();
    let open = connections.len();
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
      while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
      warn!(event = "rpc_drain_timeout", open, "dropping connections still open");
      connections.abort_all();
    }
    info!(event = "daemon_stopped", socket = %sock.display(), "control surface closed");
  });

  Ok(task)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stale_socket_file_is_replaced() {
    let td = tempfile::tempdir().unwrap();
    let path = td.path().join("ccccd.sock");
    drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
    assert!(path.exists());
    claim_socket(&path).unwrap();
    assert!(!path.exists());
  }

  #[test]
  fn live_socket_is_not_taken_over() {
    let td = tempfile::tempdir().unwrap();
    let path = td.path().join("ccccd.sock");
    let _live = std::os::unix::net::UnixListener::bind(&path).unwrap();
    let err = claim_socket(&path).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::AddrInUse);
    assert!(path.exists());
  }
}
