use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tempfile::TempDir;
use test_support::poll_until;
use tokio::sync::{mpsc, oneshot};

use super::worker::GroupCore;
use super::fake::FakeFactory;
use super::{GroupEnv, GroupMessage, GroupRequest};
use crate::config::Config;
use crate::domain::event::{Event, EventBody, EventKind, StopReason, SYSTEM_ID};
use crate::error::CoreError;
use crate::permission::Caller;
use crate::rpc::ErrorCode;

const GROUP: &str = "g_test";

type Reply = oneshot::Receiver<Result<Value, CoreError>>;

/// Drives a `GroupCore` by hand so tests control exactly when reports are processed.
struct Harness {
  _home: TempDir,
  env: GroupEnv,
  factory: Arc<FakeFactory>,
  core: GroupCore,
  rx: mpsc::UnboundedReceiver<GroupMessage>,
}

impl Harness {
  fn new() -> Self {
    let home = tempfile::tempdir().unwrap();
    let factory = Arc::new(FakeFactory::default());
    let env = GroupEnv {
      home: home.path().to_path_buf(),
      socket: home.path().join("ccccd.sock"),
      config: Arc::new(Config::default()),
      factory: factory.clone(),
    };
    let scope = home.path().to_string_lossy().into_owned();
    let (tx, rx) = mpsc::unbounded_channel();
    let core = GroupCore::create(&env, GROUP, "demo", &scope, tx).unwrap();
    Self {
      _home: home,
      env,
      factory,
      core,
      rx,
    }
  }

  fn submit(&mut self, caller: Caller, method: &str, args: Value) -> Reply {
    let request = GroupRequest::parse(method, args).unwrap();
    let (reply, rx) = oneshot::channel();
    self.core.handle(GroupMessage::Request {
      caller,
      request,
      reply,
    });
    rx
  }

  /// Process worker reports until `rx` resolves.
  async fn wait(&mut self, mut rx: Reply) -> Result<Value, CoreError> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
      match rx.try_recv() {
        Ok(result) => return result,
        Err(oneshot::error::TryRecvError::Closed) => panic!("request dropped without reply"),
        Err(oneshot::error::TryRecvError::Empty) => {}
      }
      let msg = tokio::time::timeout_at(deadline, self.rx.recv())
        .await
        .expect("timed out waiting for reply")
        .expect("group channel open");
      self.core.handle(msg);
    }
  }

  async fn call(&mut self, caller: Caller, method: &str, args: Value) -> Result<Value, CoreError> {
    let rx = self.submit(caller, method, args);
    self.wait(rx).await
  }

  /// Handle whatever reports arrive within a short quiet period.
  async fn settle(&mut self) {
    while let Ok(Some(msg)) = tokio::time::timeout(Duration::from_millis(150), self.rx.recv()).await
    {
      self.core.handle(msg);
    }
  }

  async fn add(&mut self, actor_id: &str) {
    self
      .call(
        Caller::User,
        "actor.add",
        json!({"actor_id": actor_id, "runtime": "shell"}),
      )
      .await
      .unwrap();
  }

  async fn start(&mut self, actor_id: &str) -> Value {
    self
      .call(Caller::User, "actor.start", json!({"actor_id": actor_id}))
      .await
      .unwrap()
  }

  fn events(&self) -> Vec<Event> {
    self.core.ledger.events().to_vec()
  }

  fn last(&self) -> Event {
    self.events().last().cloned().unwrap()
  }

  fn count(&self, kind: EventKind) -> usize {
    self.events().iter().filter(|e| e.kind() == kind).count()
  }
}

fn peer(id: &str) -> Caller {
  Caller::Actor(id.to_string())
}

#[tokio::test]
async fn peer_cannot_add_actors_and_nothing_is_written() {
  let mut h = Harness::new();
  h.add("F").await;
  h.add("P").await;
  let before = h.core.ledger.last_id();

  let err = h
    .call(peer("P"), "actor.add", json!({"actor_id": "Q", "runtime": "shell"}))
    .await
    .unwrap_err();
  assert_eq!(err.code(), ErrorCode::PermissionDenied);
  assert_eq!(h.core.ledger.last_id(), before);

  // The foreman may.
  h.call(peer("F"), "actor.add", json!({"actor_id": "Q", "runtime": "shell"}))
    .await
    .unwrap();
}

#[tokio::test]
async fn unknown_caller_is_actor_not_found() {
  let mut h = Harness::new();
  let err = h
    .call(peer("ghost"), "message.send", json!({"text": "boo"}))
    .await
    .unwrap_err();
  assert_eq!(err.code(), ErrorCode::ActorNotFound);
}

#[tokio::test]
async fn duplicate_ids_are_rejected_case_insensitively() {
  let mut h = Harness::new();
  h.add("Alpha").await;
  let err = h
    .call(
      Caller::User,
      "actor.add",
      json!({"actor_id": "alpha", "runtime": "shell"}),
    )
    .await
    .unwrap_err();
  assert_eq!(err.code(), ErrorCode::InvalidRequest);
}

#[tokio::test]
async fn starting_twice_spawns_one_process() {
  let mut h = Harness::new();
  h.add("F").await;

  let first = h.submit(Caller::User, "actor.start", json!({"actor_id": "F"}));
  let second = h.submit(Caller::User, "actor.start", json!({"actor_id": "F"}));
  assert_eq!(h.wait(first).await.unwrap()["lifecycle"], "running");
  assert_eq!(h.wait(second).await.unwrap()["lifecycle"], "running");
  // And once more after it settled.
  assert_eq!(h.start("F").await["lifecycle"], "running");

  assert_eq!(h.factory.spawn_count(), 1);
  assert_eq!(h.count(EventKind::ActorStarted), 1);
}

#[tokio::test]
async fn hello_from_user_is_injected_into_the_foreman() {
  let mut h = Harness::new();
  h.add("F").await;
  h.start("F").await;

  let sent = h
    .call(Caller::User, "message.send", json!({"text": "Hello"}))
    .await
    .unwrap();
  assert_eq!(sent["recipients"], json!(["F"]));
  let message_id = sent["event"]["id"].as_u64().unwrap();

  let runner = h.factory.runner("F").unwrap();
  let probe = Arc::clone(&runner);
  assert!(
    poll_until(Duration::from_secs(2), Duration::from_millis(10), || {
      let probe = Arc::clone(&probe);
      async move { !probe.injected.lock().is_empty() }
    })
    .await
  );
  assert_eq!(runner.injected.lock()[0].1, "[cccc] user → F: Hello");

  h.settle().await;
  match &h.last().body {
    EventBody::ChatDelivered(d) => {
      assert_eq!(d.actor_id, "F");
      assert_eq!(d.event_ids, vec![message_id]);
      assert!(d.ok);
    }
    other => panic!("expected chat.delivered, got {other:?}"),
  }
  assert_eq!(h.last().by, SYSTEM_ID);
}

#[tokio::test]
async fn early_messages_queue_until_the_interval_allows() {
  let mut h = Harness::new();
  h.add("F").await;
  h.start("F").await;
  let runner = h.factory.runner("F").unwrap();

  h.call(Caller::User, "message.send", json!({"text": "first"}))
    .await
    .unwrap();
  h.call(Caller::User, "message.send", json!({"text": "second"}))
    .await
    .unwrap();
  h.settle().await;
  assert_eq!(runner.injected.lock().len(), 1);
  assert!(h.core.next_flush().is_some());

  h.call(
    Caller::User,
    "group.update_settings",
    json!({"min_interval_seconds": 0}),
  )
  .await
  .unwrap();
  h.core.flush_due(Instant::now());
  let probe = Arc::clone(&runner);
  assert!(
    poll_until(Duration::from_secs(2), Duration::from_millis(10), || {
      let probe = Arc::clone(&probe);
      async move { probe.injected.lock().len() == 2 }
    })
    .await
  );
  assert_eq!(runner.injected.lock()[1].1, "[cccc] user → F: second");
}

#[tokio::test]
async fn headless_actors_read_from_their_inbox() {
  let mut h = Harness::new();
  h.call(
    Caller::User,
    "actor.add",
    json!({"actor_id": "H", "runtime": "custom", "runner": "headless"}),
  )
  .await
  .unwrap();
  h.start("H").await;
  h.call(Caller::User, "message.send", json!({"text": "poll me"}))
    .await
    .unwrap();
  h.settle().await;
  assert_eq!(h.count(EventKind::ChatDelivered), 0);

  let inbox = h.call(peer("H"), "inbox.list", json!({})).await.unwrap();
  assert_eq!(inbox["events"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn mark_read_never_moves_backwards() {
  let mut h = Harness::new();
  h.add("F").await;
  h.add("P").await;
  let one = h
    .call(Caller::User, "message.send", json!({"to": ["P"], "text": "one"}))
    .await
    .unwrap()["event"]["id"]
    .as_u64()
    .unwrap();
  let two = h
    .call(Caller::User, "message.send", json!({"to": ["P"], "text": "two"}))
    .await
    .unwrap()["event"]["id"]
    .as_u64()
    .unwrap();

  let moved = h
    .call(peer("P"), "inbox.mark_read", json!({"event_id": two}))
    .await
    .unwrap();
  assert_eq!(moved["advanced"], true);
  assert_eq!(moved["cursor"], two);

  let reads = h.count(EventKind::ChatRead);
  let back = h
    .call(peer("P"), "inbox.mark_read", json!({"event_id": one}))
    .await
    .unwrap();
  assert_eq!(back["advanced"], false);
  assert_eq!(back["cursor"], two);
  assert_eq!(h.count(EventKind::ChatRead), reads);

  let inbox = h.call(peer("P"), "inbox.list", json!({})).await.unwrap();
  assert!(inbox["events"].as_array().unwrap().is_empty());

  let err = h
    .call(peer("P"), "inbox.mark_read", json!({"event_id": 9999}))
    .await
    .unwrap_err();
  assert_eq!(err.code(), ErrorCode::InvalidRequest);
}

#[tokio::test]
async fn attention_message_is_fully_acked_after_every_recipient() {
  let mut h = Harness::new();
  for id in ["P", "Q", "R"] {
    h.add(id).await;
  }
  let sent = h
    .call(
      peer("P"),
      "message.send",
      json!({"to": ["@all"], "text": "review", "priority": "attention"}),
    )
    .await
    .unwrap();
  assert_eq!(sent["recipients"], json!(["Q", "R"]));
  let id = sent["event"]["id"].as_u64().unwrap();

  let status = h
    .call(Caller::User, "message.ack_status", json!({"event_id": id}))
    .await
    .unwrap();
  assert_eq!(status["acks"], json!({"Q": false, "R": false}));

  let after_q = h
    .call(peer("Q"), "message.ack", json!({"event_id": id}))
    .await
    .unwrap();
  assert_eq!(after_q["fully_acked"], false);
  let acks = h.count(EventKind::ChatAck);
  h.call(peer("Q"), "message.ack", json!({"event_id": id}))
    .await
    .unwrap();
  assert_eq!(h.count(EventKind::ChatAck), acks);

  let after_r = h
    .call(peer("R"), "message.ack", json!({"event_id": id}))
    .await
    .unwrap();
  assert_eq!(after_r["fully_acked"], true);

  let err = h
    .call(peer("P"), "message.ack", json!({"event_id": id}))
    .await
    .unwrap_err();
  assert_eq!(err.code(), ErrorCode::InvalidRequest);
}

#[tokio::test]
async fn unknown_reply_target_writes_nothing() {
  let mut h = Harness::new();
  h.add("F").await;
  let before = h.core.ledger.last_id();
  let err = h
    .call(
      Caller::User,
      "message.reply",
      json!({"reply_to": 999, "text": "hm"}),
    )
    .await
    .unwrap_err();
  assert_eq!(err.code(), ErrorCode::InvalidRequest);
  assert_eq!(h.core.ledger.last_id(), before);
}

#[tokio::test]
async fn crash_is_recorded_and_not_restarted() {
  let mut h = Harness::new();
  h.add("F").await;
  h.start("F").await;

  h.factory.exit("F", Some(3));
  h.settle().await;

  let last = h.last();
  assert_eq!(last.by, SYSTEM_ID);
  match last.body {
    EventBody::ActorCrashed(c) => {
      assert_eq!(c.actor_id, "F");
      assert_eq!(c.exit_code, Some(3));
    }
    other => panic!("expected actor.crashed, got {other:?}"),
  }
  let list = h.call(Caller::User, "actor.list", json!({})).await.unwrap();
  assert_eq!(list[0]["lifecycle"], "stopped");
  assert_eq!(h.factory.spawn_count(), 1);
}

#[tokio::test]
async fn stop_preempts_an_in_flight_start() {
  let mut h = Harness::new();
  h.add("F").await;
  h.factory.hold.store(true, Ordering::SeqCst);

  let start = h.submit(Caller::User, "actor.start", json!({"actor_id": "F"}));
  let factory = Arc::clone(&h.factory);
  assert!(
    poll_until(Duration::from_secs(2), Duration::from_millis(5), || {
      let factory = Arc::clone(&factory);
      async move { factory.in_flight.load(Ordering::SeqCst) == 1 }
    })
    .await
  );

  let stopped = h
    .call(Caller::User, "actor.stop", json!({"actor_id": "F"}))
    .await
    .unwrap();
  assert_eq!(stopped["lifecycle"], "stopped");
  let err = h.wait(start).await.unwrap_err();
  assert_eq!(err.code(), ErrorCode::InvalidRequest);

  h.factory.hold.store(false, Ordering::SeqCst);
  h.settle().await;
  let runner = h.factory.runner("F").unwrap();
  let probe = Arc::clone(&runner);
  assert!(
    poll_until(Duration::from_secs(2), Duration::from_millis(10), || {
      let probe = Arc::clone(&probe);
      async move { probe.terminated.load(Ordering::SeqCst) }
    })
    .await
  );
  assert_eq!(h.count(EventKind::ActorStarted), 0);
}

#[tokio::test]
async fn remove_requires_stopped_and_promotes_the_next_foreman() {
  let mut h = Harness::new();
  h.add("F").await;
  h.add("P").await;
  h.start("F").await;

  let err = h
    .call(Caller::User, "actor.remove", json!({"actor_id": "F"}))
    .await
    .unwrap_err();
  assert_eq!(err.code(), ErrorCode::InvalidRequest);

  h.call(Caller::User, "actor.stop", json!({"actor_id": "F"}))
    .await
    .unwrap();
  assert_eq!(h.count(EventKind::ActorStopped), 1);
  h.call(Caller::User, "actor.remove", json!({"actor_id": "F"}))
    .await
    .unwrap();

  let info = h.call(peer("P"), "group.show", json!({})).await.unwrap();
  assert_eq!(info["foreman"], "P");
  assert_eq!(info["actors"][0]["role"], "foreman");
}

#[tokio::test]
async fn foreman_target_stays_recorded_after_promotion() {
  let mut h = Harness::new();
  h.add("P").await;
  h.add("Q").await;
  h.start("P").await;

  let sent = h
    .call(
      Caller::User,
      "message.send",
      json!({"to": ["@foreman"], "text": "status?"}),
    )
    .await
    .unwrap();
  let message_id = sent["event"]["id"].as_u64().unwrap();
  h.settle().await;

  h.call(Caller::User, "actor.stop", json!({"actor_id": "P"}))
    .await
    .unwrap();
  h.call(Caller::User, "actor.remove", json!({"actor_id": "P"}))
    .await
    .unwrap();

  let stored = h
    .events()
    .into_iter()
    .find(|e| e.id == message_id)
    .unwrap();
  match stored.body {
    EventBody::ChatMessage(m) => {
      assert_eq!(m.to, vec!["P".to_string()]);
      assert_eq!(m.tokens, vec!["@foreman".to_string()]);
    }
    other => panic!("expected chat.message, got {other:?}"),
  }

  let info = h.call(peer("Q"), "group.show", json!({})).await.unwrap();
  assert_eq!(info["foreman"], "Q");
  let inbox = h.call(peer("Q"), "inbox.list", json!({})).await.unwrap();
  assert_eq!(inbox["events"], json!([]));
}

#[tokio::test]
async fn snapshot_reports_age_of_oldest_unread_message() {
  let mut h = Harness::new();
  h.add("F").await;
  h.add("P").await;

  let snap = h
    .call(Caller::System, "automation.snapshot", json!({}))
    .await
    .unwrap();
  assert_eq!(snap["actors"][1]["oldest_unread_age_ms"], Value::Null);

  h.call(
    Caller::User,
    "message.send",
    json!({"to": ["@P"], "text": "look at this"}),
  )
  .await
  .unwrap();
  tokio::time::sleep(Duration::from_millis(30)).await;

  let snap = h
    .call(Caller::System, "automation.snapshot", json!({}))
    .await
    .unwrap();
  let p = &snap["actors"][1];
  assert_eq!(p["actor_id"], "P");
  assert_eq!(p["unread_messages"], 1);
  assert!(p["oldest_unread_age_ms"].as_u64().unwrap() >= 30);
}

#[tokio::test]
async fn restart_runs_stop_then_start() {
  let mut h = Harness::new();
  h.add("F").await;
  h.start("F").await;
  let restarted = h
    .call(Caller::User, "actor.restart", json!({"actor_id": "F"}))
    .await
    .unwrap();
  assert_eq!(restarted["lifecycle"], "running");
  assert_eq!(h.factory.spawn_count(), 2);
  let kinds: Vec<EventKind> = h
    .events()
    .iter()
    .map(|e| e.kind())
    .filter(|k| matches!(k, EventKind::ActorStarted | EventKind::ActorStopped))
    .collect();
  assert_eq!(
    kinds,
    vec![
      EventKind::ActorStarted,
      EventKind::ActorStopped,
      EventKind::ActorStarted
    ]
  );
}

#[tokio::test]
async fn boot_marks_previously_running_actors_stopped() {
  let mut h = Harness::new();
  h.add("F").await;
  h.start("F").await;
  h.core.shutdown();

  let (tx, _rx) = mpsc::unbounded_channel();
  let mut reopened = GroupCore::open(&h.env, GROUP, tx).unwrap();
  reopened.resume();
  let last = reopened.ledger.events().last().cloned().unwrap();
  assert_eq!(last.by, SYSTEM_ID);
  match last.body {
    EventBody::ActorStopped(s) => {
      assert_eq!(s.actor_id, "F");
      assert_eq!(s.reason, StopReason::DaemonRestart);
    }
    other => panic!("expected actor.stopped, got {other:?}"),
  }
  assert!(reopened.view().recorded_running().is_empty());
}

#[tokio::test]
async fn failed_append_leaves_no_trace() {
  let mut h = Harness::new();
  h.add("F").await;
  let before = h.core.ledger.last_id();

  h.core.ledger.fail_next_write();
  let err = h
    .call(Caller::User, "message.send", json!({"text": "lost"}))
    .await
    .unwrap_err();
  assert_eq!(err.code(), ErrorCode::Internal);
  assert_eq!(h.core.ledger.last_id(), before);

  let ok = h
    .call(Caller::User, "message.send", json!({"text": "kept"}))
    .await
    .unwrap();
  assert_eq!(ok["event"]["id"], before + 1);
}

#[tokio::test]
async fn notifications_need_a_known_target_and_standing() {
  let mut h = Harness::new();
  h.add("F").await;
  h.add("P").await;

  let err = h
    .call(Caller::User, "system.notify", json!({"to": "ghost", "text": "x"}))
    .await
    .unwrap_err();
  assert_eq!(err.code(), ErrorCode::ActorNotFound);

  let err = h
    .call(peer("P"), "system.notify", json!({"to": "F", "text": "x"}))
    .await
    .unwrap_err();
  assert_eq!(err.code(), ErrorCode::PermissionDenied);

  let notified = h
    .call(
      Caller::System,
      "system.notify",
      json!({"to": "p", "text": "wake up", "kind": "nudge"}),
    )
    .await
    .unwrap();
  assert_eq!(notified["data"]["to"], "P");
  let inbox = h.call(peer("P"), "inbox.list", json!({})).await.unwrap();
  assert_eq!(inbox["events"][0]["kind"], "system.notify");
}
