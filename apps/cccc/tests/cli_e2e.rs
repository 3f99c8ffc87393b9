use assert_cmd::prelude::*;
use pretty_assertions::assert_eq;
use std::path::Path;
use std::process::Command;

fn cccc(home: &Path, sock: &Path) -> Command {
  let mut cmd = Command::cargo_bin("cccc").expect("compile bin");
  cmd
    .env("CCCC_HOME", home)
    .env("CCCC_SOCKET", sock)
    .env_remove("CCCC_GROUP_ID")
    .env_remove("CCCC_ACTOR_ID");
  cmd
}

fn stdout(cmd: &mut Command) -> String {
  let out = cmd.assert().success().get_output().stdout.clone();
  String::from_utf8_lossy(&out).into_owned()
}

#[test]
fn daemon_start_attach_send_inbox_stop() {
  let td = tempfile::tempdir().unwrap();
  let home = td.path().join("home");
  let project = td.path().join("proj");
  std::fs::create_dir_all(&project).unwrap();
  let sock = td.path().join("cccc.sock");

  let started = stdout(cccc(&home, &sock).args(["daemon", "start"]));
  assert!(started.contains("daemon: running ("), "{started}");

  let attached = stdout(
    cccc(&home, &sock)
      .current_dir(&project)
      .args(["--json", "attach"]),
  );
  let attached: serde_json::Value = serde_json::from_str(&attached).unwrap();
  assert_eq!(attached["created"], true);
  let gid = attached["group_id"].as_str().unwrap().to_string();

  // Group is found from the working directory. The first actor becomes foreman.
  for actor in ["lead", "bot"] {
    stdout(
      cccc(&home, &sock)
        .current_dir(&project)
        .args(["actor", "add", actor, "--runtime", "custom", "--runner", "headless"]),
    );
  }
  let sent = stdout(
    cccc(&home, &sock)
      .current_dir(&project)
      .args(["send", "--to", "@bot", "check the build"]),
  );
  assert!(sent.contains("to bot"), "{sent}");

  let inbox = stdout(cccc(&home, &sock).args([
    "--json", "inbox", "--group", &gid, "--by", "bot",
  ]));
  let inbox: serde_json::Value = serde_json::from_str(&inbox).unwrap();
  assert_eq!(inbox["events"][0]["data"]["text"], "check the build");

  let denied = cccc(&home, &sock)
    .args(["actor", "--group", &gid, "--by", "bot", "add", "other"])
    .assert()
    .failure()
    .get_output()
    .stderr
    .clone();
  let denied = String::from_utf8_lossy(&denied);
  assert!(denied.contains("[PERMISSION_DENIED]"), "{denied}");

  let stopped = stdout(cccc(&home, &sock).args(["daemon", "stop"]));
  assert!(stopped.contains("daemon: stopped"), "{stopped}");
}
