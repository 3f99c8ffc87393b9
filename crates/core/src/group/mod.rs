//! One owning task per group.
//!
//! All ledger appends and registry mutations for a group happen on its worker task, which
//! processes [`GroupMessage`]s sequentially. Callers hold a cloneable [`GroupHandle`]; process
//! I/O finishes on other threads and reports back through the same channel.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info};

use crate::agent::{Runner, RunnerFactory};
use crate::config::Config;
use crate::domain::event::Event;
use crate::error::CoreError;
use crate::permission::Caller;

mod worker;
mod injector;
pub mod request;

#[cfg(test)]
pub(crate) mod fake;
#[cfg(test)]
mod tests;

pub use request::{ActorAddArgs, GROUP_METHODS, GroupRequest, NotifyArgs};

use self::worker::GroupCore;

pub type Responder = oneshot::Sender<Result<Value, CoreError>>;
pub type GroupSender = mpsc::UnboundedSender<GroupMessage>;

pub enum GroupMessage {
  Request {
    caller: Caller,
    request: GroupRequest,
    reply: Responder,
  },
  StartFinished {
    actor_id: String,
    generation: u64,
    result: anyhow::Result<Arc<dyn Runner>>,
  },
  StopFinished {
    actor_id: String,
    generation: u64,
  },
  RunnerExited {
    actor_id: String,
    generation: u64,
    exit_code: Option<u32>,
  },
  DeliveryFinished {
    actor_id: String,
    event_ids: Vec<u64>,
    error: Option<String>,
  },
  Shutdown {
    done: oneshot::Sender<()>,
  },
}

/// Daemon-wide facts every group needs.
#[derive(Clone)]
pub struct GroupEnv {
  pub home: PathBuf,
  pub socket: PathBuf,
  pub config: Arc<Config>,
  pub factory: Arc<dyn RunnerFactory>,
}

#[derive(Clone)]
pub struct GroupHandle {
  id: String,
  title: String,
  scope: String,
  tx: GroupSender,
  live: broadcast::Sender<Event>,
  timeout: Duration,
}

impl GroupHandle {
  /// Load an existing group from its ledger and start its worker.
  pub fn open(env: &GroupEnv, group_id: &str) -> Result<Self, CoreError> {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut core = GroupCore::open(env, group_id, tx.clone())?;
    core.resume();
    Ok(Self::launch(env, core, tx, rx))
  }

  /// Create a new group rooted at `scope` and start its worker.
  pub fn create(env: &GroupEnv, group_id: &str, title: &str, scope: &str) -> Result<Self, CoreError> {
    let (tx, rx) = mpsc::unbounded_channel();
    let core = GroupCore::create(env, group_id, title, scope, tx.clone())?;
    Ok(Self::launch(env, core, tx, rx))
  }

  fn launch(
    env: &GroupEnv,
    core: GroupCore,
    tx: GroupSender,
    rx: mpsc::UnboundedReceiver<GroupMessage>,
  ) -> Self {
    let handle = Self {
      id: core.id().to_string(),
      title: core.view().title.clone(),
      scope: core.view().scope.clone(),
      tx,
      live: core.live_sender(),
      timeout: env.config.request_timeout(),
    };
    info!(
      event = "group_worker_started",
      group_id = %handle.id,
      scope = %handle.scope
    );
    tokio::spawn(run(core, rx));
    handle
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn title(&self) -> &str {
    &self.title
  }

  pub fn scope(&self) -> &str {
    &self.scope
  }

  /// Submit a request and wait for its result, bounded by the request timeout.
  pub async fn call(&self, caller: Caller, request: GroupRequest) -> Result<Value, CoreError> {
    let (reply, rx) = oneshot::channel();
    let method = request.method();
    self
      .tx
      .send(GroupMessage::Request {
        caller,
        request,
        reply,
      })
      .map_err(|_| CoreError::GroupNotFound(self.id.clone()))?;
    match tokio::time::timeout(self.timeout, rx).await {
      Ok(Ok(result)) => result,
      Ok(Err(_)) => Err(CoreError::internal(format!(
        "group {} dropped {method} before answering",
        self.id
      ))),
      Err(_) => Err(CoreError::Timeout(self.timeout.as_secs())),
    }
  }

  /// Live stream of events appended from now on.
  pub fn subscribe(&self) -> broadcast::Receiver<Event> {
    self.live.subscribe()
  }

  pub fn is_closed(&self) -> bool {
    self.tx.is_closed()
  }

  /// Stop the worker, terminating every actor process. Resolves once the worker is done.
  pub async fn shutdown(&self) {
    let (done, rx) = oneshot::channel();
    if self.tx.send(GroupMessage::Shutdown { done }).is_ok() {
      let _ = rx.await;
    }
  }
}

async fn run(mut core: GroupCore, mut rx: mpsc::UnboundedReceiver<GroupMessage>) {
  loop {
    let deadline = core.next_flush();
    tokio::select! {
      msg = rx.recv() => match msg {
        Some(msg) => {
          if !core.handle(msg) {
            break;
          }
        }
        None => {
          core.shutdown();
          break;
        }
      },
      _ = sleep_until(deadline) => core.flush_due(Instant::now()),
    }
  }
  debug!(event = "group_worker_exited", group_id = %core.id());
}

async fn sleep_until(deadline: Option<Instant>) {
  match deadline {
    Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
    None => std::future::pending::<()>().await,
  }
}
