//! Time-driven nudges and escalations.
//!
//! One scheduler task runs per group. It follows the group's live ledger stream, sweeps on a
//! fixed interval with a fresh [`AutomationSnapshot`], and sends whatever the
//! [`AutomationClock`] reports as due back through the group's request path as `system`.

use std::time::{Duration, Instant};

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::group::{GroupHandle, GroupRequest, NotifyArgs};
use crate::permission::Caller;
use crate::rpc::AutomationSnapshot;

mod clock;

pub use clock::{AutomationAction, AutomationClock};

pub fn spawn(handle: GroupHandle, sweep_interval: Duration) -> JoinHandle<()> {
  tokio::spawn(run(handle, sweep_interval))
}

async fn run(handle: GroupHandle, sweep_interval: Duration) {
  let mut events = handle.subscribe();
  let mut clock = AutomationClock::new(Instant::now());
  let mut ticker = tokio::time::interval(sweep_interval.max(Duration::from_millis(10)));
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
  debug!(event = "automation_started", group_id = %handle.id());

  loop {
    tokio::select! {
      received = events.recv() => match received {
        Ok(event) => clock.observe(&event, Instant::now()),
        Err(RecvError::Lagged(skipped)) => {
          debug!(event = "automation_lagged", group_id = %handle.id(), skipped);
        }
        Err(RecvError::Closed) => break,
      },
      _ = ticker.tick() => {
        if handle.is_closed() {
          break;
        }
        sweep(&handle, &mut clock).await;
      }
    }
  }
  debug!(event = "automation_stopped", group_id = %handle.id());
}

async fn snapshot(handle: &GroupHandle) -> Result<AutomationSnapshot, CoreError> {
  let value = handle
    .call(Caller::System, GroupRequest::AutomationSnapshot)
    .await?;
  serde_json::from_value(value).map_err(|e| CoreError::internal(format!("decode snapshot: {e}")))
}

async fn sweep(handle: &GroupHandle, clock: &mut AutomationClock) {
  let snapshot = match snapshot(handle).await {
    Ok(snapshot) => snapshot,
    Err(err) => {
      if !handle.is_closed() {
        warn!(
          event = "automation_snapshot_failed",
          group_id = %handle.id(),
          code = %err.code(),
          error = %err
        );
      }
      return;
    }
  };

  for action in clock.sweep(&snapshot, Instant::now()) {
    let AutomationAction { to, kind, text } = action;
    let request = GroupRequest::SystemNotify(NotifyArgs {
      to: to.clone(),
      text,
      kind,
    });
    match handle.call(Caller::System, request).await {
      Ok(_) => info!(
        event = "automation_notified",
        group_id = %handle.id(),
        to = %to,
        kind = ?kind
      ),
      Err(err) => warn!(
        event = "automation_action_failed",
        group_id = %handle.id(),
        to = %to,
        kind = ?kind,
        code = %err.code(),
        error = %err
      ),
    }
  }
}
