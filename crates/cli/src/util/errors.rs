use crate::rpc::client;

pub fn render_rpc_failure(action: &str, err: &client::Error) -> String {
  match err {
    client::Error::SocketNotFound(_) | client::Error::DaemonNotRunning { .. } => format!(
      "{action} failed [{}]: {err}. Start it with `cccc daemon start`.",
      err.code()
    ),
    _ => format!("{action} failed [{}]: {err}", err.code()),
  }
}

/// Print the failure and exit non-zero.
pub fn fail(action: &str, err: &client::Error) -> ! {
  eprintln!("{}", render_rpc_failure(action, err));
  std::process::exit(1);
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::path::PathBuf;

  #[test]
  fn connection_failures_suggest_starting_daemon() {
    let err = client::Error::SocketNotFound(PathBuf::from("/tmp/x.sock"));
    let text = render_rpc_failure("send", &err);
    assert!(text.starts_with("send failed [SOCKET_NOT_FOUND]"), "{text}");
    assert!(text.contains("cccc daemon start"), "{text}");
  }

  #[test]
  fn timeouts_name_their_code() {
    let text = render_rpc_failure("actor start", &client::Error::Timeout(10));
    assert_eq!(
      text,
      "actor start failed [TIMEOUT]: request timed out after 10s; outcome unknown"
    );
  }
}
