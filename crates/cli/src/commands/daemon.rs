use std::sync::Arc;

use cccc_core::adapters::NativeRunnerFactory;

use crate::util::daemon_proc::{
  resolve_env, runtime, spawn_daemon_background, wait_until_down, wait_until_up,
};

pub fn print_status() {
  let env = resolve_env();
  let client = env.client();
  match runtime().block_on(client.daemon_status()) {
    Ok(status) => println!(
      "daemon: running (v{}, pid {}, socket {}, {} groups)",
      status.version, status.pid, status.socket_path, status.groups
    ),
    Err(_) => println!("daemon: stopped"),
  }
}

pub fn run_daemon_foreground() {
  let env = resolve_env();
  let rt = tokio::runtime::Builder::new_multi_thread()
    .enable_io()
    .enable_time()
    .worker_threads(2)
    .build()
    .expect("tokio runtime");
  rt.block_on(async move {
    if let Some(parent) = env.socket.parent()
      && let Err(e) = std::fs::create_dir_all(parent)
    {
      eprintln!("failed to create socket directory: {e}");
      std::process::exit(1);
    }
    match cccc_core::daemon::start(
      &env.socket,
      &env.home,
      env.config,
      Arc::new(NativeRunnerFactory),
    )
    .await
    {
      Ok(handle) => {
        handle.wait().await;
        let _ = std::fs::remove_file(&env.socket);
      }
      Err(e) => {
        eprintln!("failed to start daemon: {e}");
        std::process::exit(1);
      }
    }
  });
}

pub fn start_daemon() {
  let env = resolve_env();
  let client = env.client();
  let rt = runtime();
  if rt.block_on(client.daemon_status()).is_ok() {
    print_status();
    return;
  }
  // A socket file left behind by a crashed daemon would make the bind fail.
  let _ = std::fs::remove_file(&env.socket);

  if let Err(e) = spawn_daemon_background(&env.home, &env.socket) {
    eprintln!("failed to spawn daemon: {e}");
    std::process::exit(1);
  }
  if rt.block_on(wait_until_up(&client, 30)) {
    print_status();
  } else {
    eprintln!("daemon did not come up at {}", env.socket.display());
    std::process::exit(1);
  }
}

pub fn stop_daemon() {
  let env = resolve_env();
  let client = env.client();
  let rt = runtime();
  rt.block_on(async {
    if client.daemon_shutdown().await.is_ok() {
      let _ = wait_until_down(&client, 30).await;
    }
  });
  println!("daemon: stopped");
}
