use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use cccc_core::adapters::{NativeRunnerFactory, fs as fsutil};
use cccc_core::config::{Config, LogLevel};
use cccc_core::domain::event::{EventBody, NotifyKind, SYSTEM_ID};
use cccc_core::logging;
use cccc_core::rpc::{AttachResult, DaemonStatus, LedgerPage};
use serde_json::{Value, json};
use test_support::{RpcResp, TempHome, UnixRpcClient, poll_until};

async fn group_call<T: serde::de::DeserializeOwned>(
  sock: &Path,
  method: &str,
  group_id: &str,
  args: Value,
) -> RpcResp<T> {
  UnixRpcClient::new(sock)
    .call(
      method,
      Some(json!({ "group_id": group_id, "by": "user", "args": args })),
    )
    .await
}

/// `(to, by)` of every silence notification in the ledger.
async fn silence_notices(sock: &Path, group_id: &str) -> Vec<(String, String)> {
  let page: RpcResp<LedgerPage> = group_call(sock, "ledger.tail", group_id, json!({ "n": 500 })).await;
  page
    .result
    .expect("tail result")
    .events
    .into_iter()
    .filter_map(|e| match e.body {
      EventBody::SystemNotify(n) if n.kind == NotifyKind::Silence => Some((n.to, e.by)),
      _ => None,
    })
    .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn silent_group_notifies_the_foreman_once() {
  let tmp = TempHome::new();
  logging::init(&fsutil::logs_path(&tmp.home()), LogLevel::Info);
  let sock = tmp.socket();

  let mut config = Config::default();
  config.automation.silence_timeout_seconds = 2;
  config.automation.sweep_interval_ms = 50;
  let handle = cccc_core::daemon::start(
    &sock,
    &tmp.home(),
    config,
    Arc::new(NativeRunnerFactory),
  )
  .await
  .expect("start daemon");

  let client = UnixRpcClient::new(&sock);
  let ok = poll_until(Duration::from_secs(2), Duration::from_millis(50), || {
    let c = &client;
    async move {
      c.try_call::<DaemonStatus>("daemon.status", None)
        .await
        .is_ok_and(|r| r.error.is_none())
    }
  })
  .await;
  assert!(ok, "daemon did not become ready in time");

  let project = tmp.project("proj");
  let attached: RpcResp<AttachResult> = client
    .call(
      "group.attach",
      Some(json!({ "path": project.display().to_string() })),
    )
    .await;
  let gid = attached.result.expect("attach").group_id;
  let added: RpcResp<Value> = group_call(
    &sock,
    "actor.add",
    &gid,
    json!({ "actor_id": "F", "runtime": "custom", "runner": "headless" }),
  )
  .await;
  assert!(added.error.is_none(), "actor.add error: {:?}", added.error);

  // Activity halfway through the window pushes the deadline out.
  tokio::time::sleep(Duration::from_millis(1200)).await;
  let sent: RpcResp<Value> =
    group_call(&sock, "message.send", &gid, json!({ "text": "still here" })).await;
  assert!(sent.error.is_none(), "send error: {:?}", sent.error);

  tokio::time::sleep(Duration::from_millis(1200)).await;
  assert!(
    silence_notices(&sock, &gid).await.is_empty(),
    "silence fired although the group was active"
  );

  let fired = poll_until(Duration::from_secs(3), Duration::from_millis(50), || {
    let sock = sock.clone();
    let gid = gid.clone();
    async move { !silence_notices(&sock, &gid).await.is_empty() }
  })
  .await;
  assert!(fired, "no silence notification");

  // Its own notification does not count as activity, and it does not repeat.
  tokio::time::sleep(Duration::from_millis(2500)).await;
  assert_eq!(
    silence_notices(&sock, &gid).await,
    vec![("F".to_string(), SYSTEM_ID.to_string())]
  );

  handle.stop().await;
}
