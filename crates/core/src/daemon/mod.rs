use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{fs, io};

use jsonrpsee::server::RpcModule;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub mod api;
mod registry;
mod server;

pub use registry::Groups;

use crate::adapters::fs as fsutil;
use crate::agent::RunnerFactory;
use crate::config::Config;
use crate::group::GroupEnv;
use server::{shutdown_channel, start as start_server};

/// Shared state handed to every RPC method.
pub struct DaemonContext {
  pub socket_path: PathBuf,
  pub home: PathBuf,
  pub groups: Arc<Groups>,
}

/// Handle to the running daemon server.
pub struct DaemonHandle {
  task: JoinHandle<()>,
  socket_path: PathBuf,
  shutdown_tx: watch::Sender<bool>,
}

impl DaemonHandle {
  /// Stop serving, shut every group down and remove the socket file.
  pub async fn stop(self) {
    let _ = self.shutdown_tx.send(true);
    let _ = self.task.await;
    let _ = fs::remove_file(&self.socket_path);
  }

  /// Await the daemon task to finish (e.g., after `daemon.shutdown`).
  pub async fn wait(self) {
    let _ = self.task.await;
  }

  /// Get the socket path the daemon is bound to.
  pub fn socket_path(&self) -> &Path {
    &self.socket_path
  }
}

/// Load every group under `home` and serve the control surface on `socket_path`.
pub async fn start(
  socket_path: &Path,
  home: &Path,
  config: Config,
  factory: Arc<dyn RunnerFactory>,
) -> io::Result<DaemonHandle> {
  fsutil::ensure_layout(home)?;
  let env = GroupEnv {
    home: home.to_path_buf(),
    socket: socket_path.to_path_buf(),
    config: Arc::new(config),
    factory,
  };
  let groups = Arc::new(Groups::load_all(env)?);

  let mut module = RpcModule::new(DaemonContext {
    socket_path: socket_path.to_path_buf(),
    home: home.to_path_buf(),
    groups: Arc::clone(&groups),
  });

  let (shutdown_tx, shutdown_rx) = shutdown_channel();
  api::daemon::register(&mut module, shutdown_tx.clone());
  api::groups::register(&mut module);

  let server_task = start_server(socket_path, module, shutdown_rx)?;
  let task = tokio::spawn(async move {
    let _ = server_task.await;
    groups.shutdown_all().await;
  });

  Ok(DaemonHandle {
    task,
    socket_path: socket_path.to_path_buf(),
    shutdown_tx,
  })
}
