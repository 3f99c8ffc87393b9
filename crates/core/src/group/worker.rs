use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::injector::Injector;
use super::{GroupEnv, GroupMessage, GroupRequest, GroupSender, NotifyArgs, Responder};
use crate::adapters::fs;
use crate::agent::{LaunchContext, LaunchSpec, Runner, resolve_launch};
use crate::config::Config;
use crate::domain::actor::{ActorRecord, Lifecycle, RunnerKind, validate_actor_id};
use crate::domain::event::{
  ActorAdded, ActorCrashed, ActorRef, ActorStopped, ActorUpdated, ChatAck, ChatDelivered, ChatRead,
  Event, EventBody, EventDraft, GroupCreated, GroupRun, GroupStateChanged, SYSTEM_ID, StopReason,
  SystemNotify, USER_ID,
};
use crate::domain::group::{GroupSettings, GroupView};
use crate::error::CoreError;
use crate::ledger::cursors::CacheStatus;
use crate::ledger::{CursorTable, Ledger, LedgerError};
use crate::permission::{Caller, Policy, Standing, authorize};
use crate::router::{Pending, Router, format_envelope};
use crate::rpc::{
  AckStatus, ActorInfo, ActorOutput, ActorProbe, AutomationSnapshot, GroupInfo, InboxList,
  LedgerPage, LifecycleResult, MarkReadResult, SendResult,
};
use crate::supervisor::{Deferred, StartOutcome, Supervisor};

/// State owned by a group's worker task.
pub(crate) struct GroupCore {
  id: String,
  home: PathBuf,
  socket: PathBuf,
  cursors_path: PathBuf,
  config: Arc<Config>,
  policy: Policy,
  pub(super) ledger: Ledger,
  view: GroupView,
  router: Router,
  supervisor: Supervisor,
  injector: Injector,
  tx: GroupSender,
}

fn respond(reply: Option<Responder>, result: Result<Value, CoreError>) {
  if let Some(reply) = reply {
    let _ = reply.send(result);
  }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, CoreError> {
  serde_json::to_value(value).map_err(|e| CoreError::internal(format!("encode response: {e}")))
}

impl GroupCore {
  pub(crate) fn open(env: &GroupEnv, group_id: &str, tx: GroupSender) -> Result<Self, CoreError> {
    let path = fs::ledger_path(&env.home, group_id);
    if !path.exists() {
      return Err(CoreError::GroupNotFound(group_id.to_string()));
    }
    let (ledger, _recovery) = Ledger::open(&path)?;
    match ledger.events().first().map(|e| &e.body) {
      Some(EventBody::GroupCreated(_)) => {}
      _ => {
        return Err(
          LedgerError::Corrupt {
            line: 1,
            details: "first record is not group.created".to_string(),
          }
          .into(),
        );
      }
    }
    Ok(Self::assemble(env, group_id, ledger, tx))
  }

  pub(crate) fn create(
    env: &GroupEnv,
    group_id: &str,
    title: &str,
    scope: &str,
    tx: GroupSender,
  ) -> Result<Self, CoreError> {
    let (ledger, _recovery) = Ledger::open(&fs::ledger_path(&env.home, group_id))?;
    if ledger.last_id() != 0 {
      return Err(CoreError::invalid(format!("group {group_id} already exists")));
    }
    let mut core = Self::assemble(env, group_id, ledger, tx);
    core.append(EventDraft::new(
      USER_ID,
      EventBody::GroupCreated(GroupCreated {
        title: title.to_string(),
        scope: scope.to_string(),
      }),
    ))?;
    info!(event = "group_created", group_id, scope, title);
    Ok(core)
  }

  fn assemble(env: &GroupEnv, group_id: &str, ledger: Ledger, tx: GroupSender) -> Self {
    let view = GroupView::replay(
      group_id,
      GroupSettings::from_config(&env.config),
      ledger.events(),
    );
    let cursors_path = fs::cursors_path(&env.home, group_id);
    let (cursors, status) = CursorTable::load(&cursors_path, ledger.events());
    if let CacheStatus::Rebuilt(_) = status
      && let Err(e) = cursors.persist(&cursors_path, ledger.last_id())
    {
      warn!(event = "cursor_cache_write_failed", group_id, error = %e);
    }
    let router = Router::new(
      cursors,
      ledger.events(),
      Duration::from_secs(view.settings.min_interval_seconds),
    );
    Self {
      id: group_id.to_string(),
      home: env.home.clone(),
      socket: env.socket.clone(),
      cursors_path,
      config: Arc::clone(&env.config),
      policy: Policy {
        foreman_can_remove_others: env.config.permissions.foreman_can_remove_others,
      },
      ledger,
      view,
      router,
      supervisor: Supervisor::new(group_id, Arc::clone(&env.factory)),
      injector: Injector::spawn(group_id, tx.clone()),
      tx,
    }
  }

  /// Processes never survive the daemon: actors the ledger left running are recorded as stopped.
  pub(crate) fn resume(&mut self) {
    for actor_id in self.view.recorded_running() {
      let draft = EventDraft::new(
        SYSTEM_ID,
        EventBody::ActorStopped(ActorStopped {
          actor_id: actor_id.clone(),
          reason: StopReason::DaemonRestart,
        }),
      );
      match self.append(draft) {
        Ok(_) => info!(
          event = "actor_marked_stopped_on_boot",
          group_id = %self.id,
          actor_id = %actor_id
        ),
        Err(e) => warn!(
          event = "actor_boot_stop_failed",
          group_id = %self.id,
          actor_id = %actor_id,
          error = %e
        ),
      }
    }
  }

  pub(crate) fn id(&self) -> &str {
    &self.id
  }

  pub(crate) fn view(&self) -> &GroupView {
    &self.view
  }

  pub(crate) fn live_sender(&self) -> broadcast::Sender<Event> {
    self.ledger.live_sender()
  }

  pub(crate) fn next_flush(&self) -> Option<Instant> {
    self.router.throttle.next_deadline()
  }

  /// Process one message. Returns false once the group has shut down.
  pub(crate) fn handle(&mut self, msg: GroupMessage) -> bool {
    match msg {
      GroupMessage::Request {
        caller,
        request,
        reply,
      } => self.dispatch(caller, request, Some(reply)),
      GroupMessage::StartFinished {
        actor_id,
        generation,
        result,
      } => self.on_start_finished(&actor_id, generation, result),
      GroupMessage::StopFinished {
        actor_id,
        generation,
      } => self.on_stop_finished(&actor_id, generation),
      GroupMessage::RunnerExited {
        actor_id,
        generation,
        exit_code,
      } => {
        if self.supervisor.runner_exited(&actor_id, generation, exit_code) {
          self.on_crash(&actor_id, exit_code);
        }
      }
      GroupMessage::DeliveryFinished {
        actor_id,
        event_ids,
        error,
      } => self.on_delivery_finished(actor_id, event_ids, error),
      GroupMessage::Shutdown { done } => {
        self.shutdown();
        let _ = done.send(());
        return false;
      }
    }
    true
  }

  fn admit(&self, caller: &Caller, request: &GroupRequest) -> Result<(), CoreError> {
    let standing = Standing::of(caller, &self.view)?;
    authorize(caller, standing, request.operation(), &self.policy)
  }

  fn dispatch(&mut self, caller: Caller, request: GroupRequest, reply: Option<Responder>) {
    if let Err(err) = self.admit(&caller, &request) {
      debug!(
        event = "request_rejected",
        group_id = %self.id,
        method = request.method(),
        by = %caller,
        error = %err
      );
      respond(reply, Err(err));
      return;
    }

    match request {
      GroupRequest::ActorStart { actor_id } => self.actor_start(caller, actor_id, reply),
      GroupRequest::ActorStop { actor_id } => self.actor_stop(caller, actor_id, reply),
      GroupRequest::ActorRestart { actor_id } => self.actor_restart(caller, actor_id, reply),
      GroupRequest::ActorRemove { actor_id } => self.actor_remove(caller, actor_id, reply),
      GroupRequest::StartAll => {
        let result = self.start_all(&caller);
        respond(reply, result);
      }
      GroupRequest::StopAll => {
        let result = self.stop_all(&caller);
        respond(reply, result);
      }
      other => {
        let method = other.method();
        let result = self.execute(&caller, other);
        if let Err(err) = &result {
          debug!(
            event = "request_failed",
            group_id = %self.id,
            method,
            by = %caller,
            code = %err.code(),
            error = %err
          );
        }
        respond(reply, result);
      }
    }
  }

  /// Commit an event and fold it into every in-memory projection.
  fn append(&mut self, draft: EventDraft) -> Result<Event, CoreError> {
    let event = self.ledger.append(draft)?;
    self.view.apply(&event);
    self.router.observe(&event);
    if let EventBody::GroupSettings(_) = &event.body {
      self
        .router
        .throttle
        .set_min_interval(Duration::from_secs(self.view.settings.min_interval_seconds));
    }
    Ok(event)
  }

  fn existing_actor(&self, actor_id: &str) -> Result<ActorRecord, CoreError> {
    self
      .view
      .actor(actor_id)
      .cloned()
      .ok_or_else(|| CoreError::ActorNotFound(actor_id.to_string()))
  }

  fn lifecycle_result(&self, actor_id: &str) -> Result<Value, CoreError> {
    to_value(&LifecycleResult {
      actor_id: actor_id.to_string(),
      lifecycle: self.supervisor.lifecycle(actor_id),
    })
  }

  fn launch_spec(&self, actor: &ActorRecord) -> Result<LaunchSpec, CoreError> {
    let ctx = LaunchContext {
      home: &self.home,
      socket: &self.socket,
      group_id: &self.id,
      scope: Path::new(&self.view.scope),
    };
    resolve_launch(&self.config, &ctx, actor).map_err(|e| CoreError::invalid(e.to_string()))
  }

  // Lifecycle

  fn actor_start(&mut self, caller: Caller, actor_id: String, reply: Option<Responder>) {
    let actor = match self.existing_actor(&actor_id) {
      Ok(actor) => actor,
      Err(err) => return respond(reply, Err(err)),
    };
    match self.supervisor.lifecycle(&actor_id) {
      Lifecycle::Running => respond(reply, self.lifecycle_result(&actor_id)),
      Lifecycle::Starting | Lifecycle::Stopping => self.supervisor.defer(
        &actor_id,
        Deferred {
          caller,
          request: GroupRequest::ActorStart {
            actor_id: actor_id.clone(),
          },
          reply,
        },
      ),
      Lifecycle::Removed => respond(reply, Err(CoreError::ActorNotFound(actor_id))),
      Lifecycle::Stopped => {
        if !actor.enabled {
          return respond(
            reply,
            Err(CoreError::invalid(format!("actor {actor_id} is disabled"))),
          );
        }
        let spec = match self.launch_spec(&actor) {
          Ok(spec) => spec,
          Err(err) => return respond(reply, Err(err)),
        };
        if let Err(e) = self.supervisor.begin_start(spec, &caller, reply, &self.tx) {
          error!(event = "actor_start_rejected", group_id = %self.id, actor_id = %actor_id, error = %e);
        }
      }
    }
  }

  fn actor_stop(&mut self, caller: Caller, actor_id: String, reply: Option<Responder>) {
    if let Err(err) = self.existing_actor(&actor_id) {
      return respond(reply, Err(err));
    }
    match self.supervisor.lifecycle(&actor_id) {
      Lifecycle::Stopped | Lifecycle::Removed => respond(reply, self.lifecycle_result(&actor_id)),
      Lifecycle::Stopping => self.supervisor.defer(
        &actor_id,
        Deferred {
          caller,
          request: GroupRequest::ActorStop {
            actor_id: actor_id.clone(),
          },
          reply,
        },
      ),
      Lifecycle::Starting => {
        match self.supervisor.preempt_start(&actor_id) {
          Ok(start_reply) => {
            respond(
              start_reply,
              Err(CoreError::invalid(format!(
                "start of {actor_id} preempted by stop"
              ))),
            );
            respond(reply, self.lifecycle_result(&actor_id));
          }
          Err(e) => respond(reply, Err(e.into())),
        }
        self.drain_deferred(&actor_id);
      }
      Lifecycle::Running => {
        self.router.throttle.forget(&actor_id);
        if let Err(e) = self.supervisor.begin_stop(&actor_id, &caller, reply, &self.tx) {
          error!(event = "actor_stop_rejected", group_id = %self.id, actor_id = %actor_id, error = %e);
        }
      }
    }
  }

  fn actor_restart(&mut self, caller: Caller, actor_id: String, reply: Option<Responder>) {
    if let Err(err) = self.existing_actor(&actor_id) {
      return respond(reply, Err(err));
    }
    match self.supervisor.lifecycle(&actor_id) {
      Lifecycle::Running => {
        self.router.throttle.forget(&actor_id);
        if let Err(e) = self.supervisor.begin_stop(&actor_id, &caller, None, &self.tx) {
          return respond(reply, Err(e.into()));
        }
        // The start runs once the stop settles and answers the restart caller.
        self.supervisor.defer(
          &actor_id,
          Deferred {
            caller,
            request: GroupRequest::ActorStart {
              actor_id: actor_id.clone(),
            },
            reply,
          },
        );
      }
      Lifecycle::Starting | Lifecycle::Stopping => self.supervisor.defer(
        &actor_id,
        Deferred {
          caller,
          request: GroupRequest::ActorRestart {
            actor_id: actor_id.clone(),
          },
          reply,
        },
      ),
      Lifecycle::Stopped | Lifecycle::Removed => self.actor_start(caller, actor_id, reply),
    }
  }

  fn actor_remove(&mut self, caller: Caller, actor_id: String, reply: Option<Responder>) {
    if let Err(err) = self.existing_actor(&actor_id) {
      return respond(reply, Err(err));
    }
    match self.supervisor.lifecycle(&actor_id) {
      Lifecycle::Starting | Lifecycle::Stopping => self.supervisor.defer(
        &actor_id,
        Deferred {
          caller,
          request: GroupRequest::ActorRemove {
            actor_id: actor_id.clone(),
          },
          reply,
        },
      ),
      Lifecycle::Running => respond(
        reply,
        Err(CoreError::invalid(format!(
          "actor {actor_id} must be stopped before removal"
        ))),
      ),
      Lifecycle::Stopped | Lifecycle::Removed => {
        let draft = EventDraft::new(
          caller.id(),
          EventBody::ActorRemoved(ActorRef {
            actor_id: actor_id.clone(),
          }),
        );
        if let Err(err) = self.append(draft) {
          return respond(reply, Err(err));
        }
        self.router.throttle.forget(&actor_id);
        match self.supervisor.remove(&actor_id) {
          Ok(leftover) => {
            for parked in leftover {
              respond(parked.reply, Err(CoreError::ActorNotFound(actor_id.clone())));
            }
          }
          Err(e) => warn!(event = "actor_remove_transition_invalid", actor_id = %actor_id, error = %e),
        }
        info!(event = "actor_removed", group_id = %self.id, actor_id = %actor_id, by = %caller);
        respond(
          reply,
          to_value(&LifecycleResult {
            actor_id,
            lifecycle: Lifecycle::Removed,
          }),
        );
      }
    }
  }

  fn start_all(&mut self, caller: &Caller) -> Result<Value, CoreError> {
    let actors: Vec<String> = self
      .view
      .actors()
      .iter()
      .filter(|a| a.enabled && self.supervisor.lifecycle(&a.id) == Lifecycle::Stopped)
      .map(|a| a.id.clone())
      .collect();
    self.append(EventDraft::new(
      caller.id(),
      EventBody::GroupStart(GroupRun {
        actors: actors.clone(),
      }),
    ))?;
    for actor_id in &actors {
      self.actor_start(caller.clone(), actor_id.clone(), None);
    }
    Ok(serde_json::json!({ "actors": actors }))
  }

  fn stop_all(&mut self, caller: &Caller) -> Result<Value, CoreError> {
    let actors: Vec<String> = self
      .view
      .actors()
      .iter()
      .filter(|a| {
        matches!(
          self.supervisor.lifecycle(&a.id),
          Lifecycle::Starting | Lifecycle::Running
        )
      })
      .map(|a| a.id.clone())
      .collect();
    self.append(EventDraft::new(
      caller.id(),
      EventBody::GroupStop(GroupRun {
        actors: actors.clone(),
      }),
    ))?;
    for actor_id in &actors {
      self.actor_stop(caller.clone(), actor_id.clone(), None);
    }
    Ok(serde_json::json!({ "actors": actors }))
  }

  fn drain_deferred(&mut self, actor_id: &str) {
    while let Some(parked) = self.supervisor.next_deferred(actor_id) {
      self.dispatch(parked.caller, parked.request, parked.reply);
    }
  }

  fn on_start_finished(
    &mut self,
    actor_id: &str,
    generation: u64,
    result: anyhow::Result<Arc<dyn Runner>>,
  ) {
    match self.supervisor.start_finished(actor_id, generation, result) {
      StartOutcome::Stale => return,
      StartOutcome::Failed { error, reply } => {
        warn!(
          event = "actor_start_failed",
          group_id = %self.id,
          actor_id,
          error = %format!("{error:#}")
        );
        respond(
          reply,
          Err(CoreError::internal(format!("failed to start {actor_id}: {error:#}"))),
        );
      }
      StartOutcome::Spawned { runner, by, reply } => {
        let draft = EventDraft::new(
          by,
          EventBody::ActorStarted(ActorRef {
            actor_id: actor_id.to_string(),
          }),
        );
        if let Err(err) = self.append(draft) {
          self.supervisor.abort_start(actor_id, runner);
          respond(reply, Err(err));
        } else {
          match self.supervisor.commit_start(actor_id, runner) {
            Ok(early_exit) => {
              info!(event = "actor_running", group_id = %self.id, actor_id);
              respond(reply, self.lifecycle_result(actor_id));
              if let Some(exit_code) = early_exit {
                self.on_crash(actor_id, exit_code);
              }
            }
            Err(e) => respond(reply, Err(e.into())),
          }
        }
      }
    }
    self.drain_deferred(actor_id);
  }

  fn on_stop_finished(&mut self, actor_id: &str, generation: u64) {
    let Some((by, reply)) = self.supervisor.stop_finished(actor_id, generation) else {
      return;
    };
    let draft = EventDraft::new(
      by,
      EventBody::ActorStopped(ActorStopped {
        actor_id: actor_id.to_string(),
        reason: StopReason::Requested,
      }),
    );
    match self.append(draft) {
      Ok(_) => respond(reply, self.lifecycle_result(actor_id)),
      Err(err) => {
        warn!(event = "actor_stop_record_failed", group_id = %self.id, actor_id, error = %err);
        respond(reply, Err(err));
      }
    }
    self.drain_deferred(actor_id);
  }

  /// A running actor exited on its own. Recorded; never restarted automatically.
  fn on_crash(&mut self, actor_id: &str, exit_code: Option<u32>) {
    warn!(
      event = "actor_crashed",
      group_id = %self.id,
      actor_id,
      exit_code = ?exit_code
    );
    self.supervisor.mark_crashed(actor_id);
    let dropped = self.router.throttle.forget(actor_id);
    if !dropped.is_empty() {
      info!(
        event = "delivery_batch_discarded",
        group_id = %self.id,
        actor_id,
        messages = dropped.len()
      );
    }
    let draft = EventDraft::new(
      SYSTEM_ID,
      EventBody::ActorCrashed(ActorCrashed {
        actor_id: actor_id.to_string(),
        exit_code,
      }),
    );
    if let Err(err) = self.append(draft) {
      error!(event = "actor_crash_record_failed", group_id = %self.id, actor_id, error = %err);
    }
    self.drain_deferred(actor_id);
  }

  fn on_delivery_finished(&mut self, actor_id: String, event_ids: Vec<u64>, error: Option<String>) {
    if let Some(error) = &error {
      info!(
        event = "delivery_failed",
        group_id = %self.id,
        actor_id = %actor_id,
        events = ?event_ids,
        error = %error
      );
    }
    let draft = EventDraft::new(
      SYSTEM_ID,
      EventBody::ChatDelivered(ChatDelivered {
        actor_id,
        ok: error.is_none(),
        event_ids,
        error,
      }),
    );
    if let Err(err) = self.append(draft) {
      warn!(event = "delivery_record_failed", group_id = %self.id, error = %err);
    }
  }

  // Delivery

  /// Queue or inject `text` for a running, ready PTY recipient. Everyone else reads the inbox.
  fn offer(&mut self, recipient: &str, event_id: u64, text: String) {
    let Some(runner) = self.supervisor.runner(recipient) else {
      return;
    };
    if runner.kind() != RunnerKind::Pty || !runner.is_ready() {
      debug!(
        event = "delivery_skipped",
        group_id = %self.id,
        actor_id = recipient,
        event_id
      );
      return;
    }
    let pending = Pending { event_id, text };
    if let Some(batch) = self
      .router
      .throttle
      .offer(recipient, pending, Instant::now())
    {
      self.injector.submit(runner, batch);
    } else {
      debug!(
        event = "delivery_throttled",
        group_id = %self.id,
        actor_id = recipient,
        event_id,
        queued = self.router.throttle.queued(recipient)
      );
    }
  }

  fn deliver(&mut self, event: &Event) {
    match &event.body {
      EventBody::ChatMessage(msg) => {
        for recipient in msg.to.iter().filter(|r| r.as_str() != USER_ID) {
          let text = format_envelope(&event.by, recipient, &msg.text, msg.reply_to);
          self.offer(recipient, event.id, text);
        }
      }
      EventBody::SystemNotify(notify) if notify.to != USER_ID => {
        let text = format_envelope(&event.by, &notify.to, &notify.text, None);
        self.offer(&notify.to, event.id, text);
      }
      _ => {}
    }
  }

  pub(crate) fn flush_due(&mut self, now: Instant) {
    for batch in self.router.throttle.due(now) {
      match self.supervisor.runner(&batch.actor_id) {
        Some(runner) if runner.is_ready() => self.injector.submit(runner, batch),
        _ => info!(
          event = "delivery_batch_discarded",
          group_id = %self.id,
          actor_id = %batch.actor_id,
          messages = batch.items.len()
        ),
      }
    }
  }

  // Plain requests

  fn execute(&mut self, caller: &Caller, request: GroupRequest) -> Result<Value, CoreError> {
    match request {
      GroupRequest::Show => to_value(&self.group_info()),
      GroupRequest::SetState { state } => {
        if self.view.state != state {
          self.append(EventDraft::new(
            caller.id(),
            EventBody::GroupSetState(GroupStateChanged { state }),
          ))?;
          info!(event = "group_state_changed", group_id = %self.id, state = %state, by = %caller);
        }
        to_value(&self.group_info())
      }
      GroupRequest::UpdateSettings(patch) => {
        if patch.is_empty() {
          return Err(CoreError::invalid("no settings given"));
        }
        self.append(EventDraft::new(caller.id(), EventBody::GroupSettings(patch)))?;
        to_value(&self.view.settings)
      }
      GroupRequest::ContextSync(sync) => {
        if sync.vision.is_none() && sync.tasks.is_none() && sync.notes.is_none() {
          return Err(CoreError::invalid("context.sync needs vision, tasks or notes"));
        }
        self.append(EventDraft::new(caller.id(), EventBody::ContextSync(sync)))?;
        to_value(&self.view.context)
      }
      GroupRequest::ActorAdd(args) => {
        validate_actor_id(&args.actor_id)?;
        if let Some(existing) = self.view.actor_ci(&args.actor_id) {
          return Err(CoreError::invalid(format!(
            "actor {} already exists",
            existing.id
          )));
        }
        match &args.command {
          Some(cmd) if cmd.first().is_none_or(|p| p.trim().is_empty()) => {
            return Err(CoreError::invalid("command must not be empty"));
          }
          None if args.runner == RunnerKind::Pty
            && !self.config.runtimes.contains_key(&args.runtime) =>
          {
            return Err(CoreError::invalid(format!(
              "runtime `{}` is not configured",
              args.runtime
            )));
          }
          _ => {}
        }
        let actor_id = args.actor_id.clone();
        self.append(EventDraft::new(
          caller.id(),
          EventBody::ActorAdded(ActorAdded {
            actor_id: args.actor_id,
            runtime: args.runtime,
            runner: args.runner,
            command: args.command,
            cwd: args.cwd,
          }),
        ))?;
        info!(event = "actor_added", group_id = %self.id, actor_id = %actor_id, by = %caller);
        let record = self.existing_actor(&actor_id)?;
        to_value(&self.actor_info(&record))
      }
      GroupRequest::ActorUpdate { actor_id, enabled } => {
        let record = self.existing_actor(&actor_id)?;
        if record.enabled != enabled {
          self.append(EventDraft::new(
            caller.id(),
            EventBody::ActorUpdated(ActorUpdated {
              actor_id: actor_id.clone(),
              enabled,
            }),
          ))?;
        }
        let record = self.existing_actor(&actor_id)?;
        to_value(&self.actor_info(&record))
      }
      GroupRequest::ActorList => {
        let actors: Vec<ActorInfo> = self
          .view
          .actors()
          .iter()
          .map(|a| self.actor_info(a))
          .collect();
        to_value(&actors)
      }
      GroupRequest::ActorOutput {
        actor_id,
        max_bytes,
      } => {
        let record = self.existing_actor(&actor_id)?;
        if record.runner == RunnerKind::Headless {
          return Err(CoreError::invalid(format!(
            "actor {actor_id} is headless and has no output"
          )));
        }
        let data = self
          .supervisor
          .runner(&actor_id)
          .map(|r| String::from_utf8_lossy(&r.read_output(max_bytes)).into_owned())
          .unwrap_or_default();
        to_value(&ActorOutput { actor_id, data })
      }
      GroupRequest::MessageSend(args) => {
        let (draft, resolution) =
          Router::prepare_message(&self.view, &self.ledger, caller.id(), &args)?;
        let event = self.append(draft)?;
        self.deliver(&event);
        to_value(&SendResult {
          recipients: resolution.recipients(),
          unresolved: resolution.unresolved,
          event,
        })
      }
      GroupRequest::MessageAck { event_id } => {
        let already = self.router.acks.check(event_id, caller.id())?;
        if !already {
          self.append(EventDraft::new(
            caller.id(),
            EventBody::ChatAck(ChatAck { event_id }),
          ))?;
        }
        self.ack_status(event_id)
      }
      GroupRequest::AckStatus { event_id } => self.ack_status(event_id),
      GroupRequest::InboxList { limit } => {
        let reader = caller.id();
        to_value(&InboxList {
          actor_id: reader.to_string(),
          cursor: self.router.cursors.get(reader),
          events: self.router.inbox(&self.ledger, reader, limit),
        })
      }
      GroupRequest::InboxMarkRead { event_id } => self.mark_read(caller, event_id),
      GroupRequest::InboxMarkAllRead => {
        let last = self.ledger.last_id();
        self.mark_read(caller, last)
      }
      GroupRequest::LedgerTail { n } => to_value(&LedgerPage {
        events: self.ledger.tail(n).to_vec(),
        last_id: self.ledger.last_id(),
      }),
      GroupRequest::LedgerReadFrom { cursor, limit } => to_value(&LedgerPage {
        events: self.ledger.read_from(cursor, limit).to_vec(),
        last_id: self.ledger.last_id(),
      }),
      GroupRequest::SystemNotify(args) => self.notify(caller, args),
      GroupRequest::AutomationSnapshot => to_value(&self.automation_snapshot()),
      GroupRequest::StartAll
      | GroupRequest::StopAll
      | GroupRequest::ActorStart { .. }
      | GroupRequest::ActorStop { .. }
      | GroupRequest::ActorRestart { .. }
      | GroupRequest::ActorRemove { .. } => Err(CoreError::internal(
        "lifecycle request reached the plain request path",
      )),
    }
  }

  fn ack_status(&self, event_id: u64) -> Result<Value, CoreError> {
    let acks = self.router.acks.status(event_id).cloned().ok_or_else(|| {
      CoreError::invalid(format!("event {event_id} does not require acknowledgement"))
    })?;
    let fully_acked = acks.values().all(|v| *v);
    to_value(&AckStatus {
      event_id,
      acks,
      fully_acked,
    })
  }

  fn mark_read(&mut self, caller: &Caller, event_id: u64) -> Result<Value, CoreError> {
    let reader = caller.id().to_string();
    if event_id == 0 && self.ledger.last_id() == 0 {
      return to_value(&MarkReadResult {
        cursor: self.router.cursors.get(&reader),
        actor_id: reader,
        advanced: false,
      });
    }
    if self.ledger.get(event_id).is_none() {
      return Err(CoreError::invalid(format!(
        "event {event_id} does not exist in group {}",
        self.id
      )));
    }
    let advanced = event_id > self.router.cursors.get(&reader);
    if advanced {
      self.append(EventDraft::new(
        reader.clone(),
        EventBody::ChatRead(ChatRead {
          actor_id: reader.clone(),
          event_id,
        }),
      ))?;
      self.persist_cursors();
    }
    to_value(&MarkReadResult {
      cursor: self.router.cursors.get(&reader),
      actor_id: reader,
      advanced,
    })
  }

  fn notify(&mut self, caller: &Caller, args: NotifyArgs) -> Result<Value, CoreError> {
    if args.text.trim().is_empty() {
      return Err(CoreError::invalid("notification text must not be empty"));
    }
    let to = if args.to.eq_ignore_ascii_case(USER_ID) || args.to.eq_ignore_ascii_case("@user") {
      USER_ID.to_string()
    } else {
      let target = args.to.strip_prefix('@').unwrap_or(&args.to);
      self
        .view
        .actor_ci(target)
        .map(|a| a.id.clone())
        .ok_or_else(|| CoreError::ActorNotFound(args.to.clone()))?
    };
    let event = self.append(EventDraft::new(
      caller.id(),
      EventBody::SystemNotify(SystemNotify {
        to,
        kind: args.kind,
        text: args.text,
      }),
    ))?;
    self.deliver(&event);
    to_value(&event)
  }

  // Views

  fn actor_info(&self, record: &ActorRecord) -> ActorInfo {
    ActorInfo {
      actor_id: record.id.clone(),
      role: self
        .view
        .role_of(&record.id)
        .unwrap_or(crate::domain::actor::Role::Peer),
      runtime: record.runtime.clone(),
      runner: record.runner,
      enabled: record.enabled,
      lifecycle: self.supervisor.lifecycle(&record.id),
      ready: self
        .supervisor
        .runner(&record.id)
        .is_some_and(|r| r.is_ready()),
    }
  }

  fn group_info(&self) -> GroupInfo {
    GroupInfo {
      group_id: self.id.clone(),
      title: self.view.title.clone(),
      scope: self.view.scope.clone(),
      state: self.view.state,
      settings: self.view.settings,
      context: self.view.context.clone(),
      foreman: self.view.foreman().map(|a| a.id.clone()),
      actors: self
        .view
        .actors()
        .iter()
        .map(|a| self.actor_info(a))
        .collect(),
      last_event_id: self.ledger.last_id(),
    }
  }

  fn automation_snapshot(&self) -> AutomationSnapshot {
    let now = Utc::now();
    AutomationSnapshot {
      state: self.view.state,
      settings: self.view.settings,
      foreman: self.view.foreman().map(|a| a.id.clone()),
      actors: self
        .view
        .actors()
        .iter()
        .map(|a| ActorProbe {
          actor_id: a.id.clone(),
          lifecycle: self.supervisor.lifecycle(&a.id),
          runner: a.runner,
          unread_messages: self.router.unread_messages(&self.ledger, &a.id),
          oldest_unread_age_ms: self
            .router
            .oldest_unread_ts(&self.ledger, &a.id)
            .map(|ts| (now - ts).num_milliseconds().max(0) as u64),
          idle_ms: self
            .supervisor
            .runner(&a.id)
            .and_then(|r| r.idle_for())
            .map(|d| d.as_millis() as u64),
        })
        .collect(),
    }
  }

  fn persist_cursors(&self) {
    if let Err(e) = self
      .router
      .cursors
      .persist(&self.cursors_path, self.ledger.last_id())
    {
      warn!(event = "cursor_cache_write_failed", group_id = %self.id, error = %e);
    }
  }

  pub(crate) fn shutdown(&mut self) {
    self.supervisor.terminate_all();
    self.persist_cursors();
    info!(event = "group_worker_shutdown", group_id = %self.id);
  }
}
