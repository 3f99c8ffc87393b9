use std::path::{Path, PathBuf};
use std::time::Duration;

use cccc_core::config::{self, Config};

use crate::rpc::client::Client;

/// Home, socket and effective config for this invocation.
pub struct Env {
  pub home: PathBuf,
  pub socket: PathBuf,
  pub config: Config,
}

impl Env {
  pub fn client(&self) -> Client {
    Client::new(&self.socket, self.config.request_timeout())
  }
}

pub fn resolve_env() -> Env {
  let home = match config::resolve_home() {
    Ok(home) => home,
    Err(e) => {
      eprintln!("could not resolve cccc home: {e}");
      std::process::exit(1);
    }
  };
  let config = config::load(Some(&home)).unwrap_or_else(|e| {
    eprintln!("warning: ignoring invalid config: {e}");
    Config::default()
  });
  let socket = config::resolve_socket_path(&home);
  Env {
    home,
    socket,
    config,
  }
}

pub fn runtime() -> tokio::runtime::Runtime {
  tokio::runtime::Builder::new_current_thread()
    .enable_io()
    .enable_time()
    .build()
    .expect("tokio runtime")
}

/// Poll `daemon.status` until it answers or `attempts` run out.
pub async fn wait_until_up(client: &Client, attempts: u8) -> bool {
  for _ in 0..attempts {
    if client.daemon_status().await.is_ok() {
      return true;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
  }
  false
}

pub async fn wait_until_down(client: &Client, attempts: u8) -> bool {
  for _ in 0..attempts {
    if client.daemon_status().await.is_err() {
      return true;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
  }
  false
}

pub fn spawn_daemon_background(home: &Path, sock: &Path) -> std::io::Result<()> {
  let exe = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("cccc"));
  let mut cmd = std::process::Command::new(exe);
  cmd.arg("daemon").arg("run");
  cmd.env("CCCC_HOME", home);
  cmd.env("CCCC_SOCKET", sock);
  cmd
    .stdin(std::process::Stdio::null())
    .stdout(std::process::Stdio::null())
    .stderr(std::process::Stdio::null());
  let _ = cmd.spawn()?;
  Ok(())
}
