//! Actor lifecycle bookkeeping.
//!
//! Each actor has a slot holding its lifecycle state, its live runner, and the requests parked
//! while a transition is in flight. Spawning and terminating run on the blocking pool and report
//! back to the group task as [`GroupMessage`]s tagged with the slot's generation, so a report
//! from a superseded attempt is recognised and ignored.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::agent::{LaunchSpec, Runner, RunnerFactory};
use crate::domain::actor::{InvalidTransition, Lifecycle};
use crate::group::{GroupMessage, GroupRequest, GroupSender, Responder};
use crate::permission::Caller;

/// A lifecycle request parked until the actor settles.
pub struct Deferred {
  pub caller: Caller,
  pub request: GroupRequest,
  pub reply: Option<Responder>,
}

#[derive(Default)]
pub struct ActorSlot {
  lifecycle: Lifecycle,
  generation: u64,
  runner: Option<Arc<dyn Runner>>,
  /// Identity recorded on the `actor.started` event.
  start_by: String,
  /// Identity recorded on the `actor.stopped` event.
  stop_by: String,
  start_reply: Option<Responder>,
  stop_reply: Option<Responder>,
  /// Exit reported while the start was still in flight.
  early_exit: Option<Option<u32>>,
  deferred: VecDeque<Deferred>,
}

impl ActorSlot {
  fn transition(&mut self, to: Lifecycle) -> Result<(), InvalidTransition> {
    if !Lifecycle::can_transition(self.lifecycle, to) {
      return Err(InvalidTransition {
        from: self.lifecycle,
        to,
      });
    }
    self.lifecycle = to;
    Ok(())
  }

  pub fn lifecycle(&self) -> Lifecycle {
    self.lifecycle
  }
}

/// What a start report turned out to be.
pub enum StartOutcome {
  /// The attempt was superseded; any runner it produced has been terminated.
  Stale,
  Spawned {
    runner: Arc<dyn Runner>,
    by: String,
    reply: Option<Responder>,
  },
  Failed {
    error: anyhow::Error,
    reply: Option<Responder>,
  },
}

pub struct Supervisor {
  group_id: String,
  factory: Arc<dyn RunnerFactory>,
  slots: HashMap<String, ActorSlot>,
  next_generation: u64,
}

impl Supervisor {
  pub fn new(group_id: &str, factory: Arc<dyn RunnerFactory>) -> Self {
    Self {
      group_id: group_id.to_string(),
      factory,
      slots: HashMap::new(),
      next_generation: 0,
    }
  }

  fn bump(&mut self) -> u64 {
    self.next_generation += 1;
    self.next_generation
  }

  pub fn lifecycle(&self, actor_id: &str) -> Lifecycle {
    self
      .slots
      .get(actor_id)
      .map(|s| s.lifecycle)
      .unwrap_or(Lifecycle::Stopped)
  }

  /// The live runner of a `running` actor.
  pub fn runner(&self, actor_id: &str) -> Option<Arc<dyn Runner>> {
    self
      .slots
      .get(actor_id)
      .filter(|s| s.lifecycle == Lifecycle::Running)
      .and_then(|s| s.runner.clone())
  }

  pub fn defer(&mut self, actor_id: &str, deferred: Deferred) {
    debug!(
      event = "actor_request_deferred",
      group_id = %self.group_id,
      actor_id,
      request = deferred.request.method(),
      lifecycle = ?self.lifecycle(actor_id)
    );
    self
      .slots
      .entry(actor_id.to_string())
      .or_default()
      .deferred
      .push_back(deferred);
  }

  /// Next parked request, if the actor has settled.
  pub fn next_deferred(&mut self, actor_id: &str) -> Option<Deferred> {
    let slot = self.slots.get_mut(actor_id)?;
    if slot.lifecycle.is_transitional() {
      return None;
    }
    slot.deferred.pop_front()
  }

  /// `stopped → starting`: spawn on the blocking pool and report `StartFinished`.
  pub fn begin_start(
    &mut self,
    spec: LaunchSpec,
    by: &Caller,
    reply: Option<Responder>,
    tx: &GroupSender,
  ) -> Result<(), InvalidTransition> {
    let generation = self.bump();
    let actor_id = spec.actor_id.clone();
    let slot = self.slots.entry(actor_id.clone()).or_default();
    slot.transition(Lifecycle::Starting)?;
    slot.generation = generation;
    slot.start_by = by.id().to_string();
    slot.start_reply = reply;
    slot.early_exit = None;

    info!(
      event = "actor_starting",
      group_id = %self.group_id,
      actor_id = %actor_id,
      runner = %spec.runner,
      generation
    );

    let factory = Arc::clone(&self.factory);
    let tx = tx.clone();
    tokio::task::spawn_blocking(move || {
      let exit_tx = tx.clone();
      let exit_actor = actor_id.clone();
      let on_exit = Box::new(move |exit_code: Option<u32>| {
        let _ = exit_tx.send(GroupMessage::RunnerExited {
          actor_id: exit_actor,
          generation,
          exit_code,
        });
      });
      let result = factory.spawn(&spec, on_exit);
      let _ = tx.send(GroupMessage::StartFinished {
        actor_id,
        generation,
        result,
      });
    });
    Ok(())
  }

  /// Classify a start report. On a current, successful report the slot stays `starting`
  /// until [`Supervisor::commit_start`] records it as running.
  pub fn start_finished(
    &mut self,
    actor_id: &str,
    generation: u64,
    result: anyhow::Result<Arc<dyn Runner>>,
  ) -> StartOutcome {
    let current = self
      .slots
      .get(actor_id)
      .is_some_and(|s| s.generation == generation && s.lifecycle == Lifecycle::Starting);
    if !current {
      if let Ok(runner) = result {
        info!(
          event = "actor_start_superseded",
          group_id = %self.group_id,
          actor_id,
          generation
        );
        tokio::task::spawn_blocking(move || runner.terminate());
      }
      return StartOutcome::Stale;
    }

    let Some(slot) = self.slots.get_mut(actor_id) else {
      return StartOutcome::Stale;
    };
    match result {
      Ok(runner) => StartOutcome::Spawned {
        runner,
        by: std::mem::take(&mut slot.start_by),
        reply: slot.start_reply.take(),
      },
      Err(error) => {
        slot.lifecycle = Lifecycle::Stopped;
        StartOutcome::Failed {
          error,
          reply: slot.start_reply.take(),
        }
      }
    }
  }

  /// `starting → running`. Returns an exit code if the process already died meanwhile.
  pub fn commit_start(
    &mut self,
    actor_id: &str,
    runner: Arc<dyn Runner>,
  ) -> Result<Option<Option<u32>>, InvalidTransition> {
    let slot = self.slots.entry(actor_id.to_string()).or_default();
    slot.transition(Lifecycle::Running)?;
    slot.runner = Some(runner);
    Ok(slot.early_exit.take())
  }

  /// `starting → stopped` after the started event could not be recorded.
  pub fn abort_start(&mut self, actor_id: &str, runner: Arc<dyn Runner>) {
    if let Some(slot) = self.slots.get_mut(actor_id) {
      slot.lifecycle = Lifecycle::Stopped;
    }
    tokio::task::spawn_blocking(move || runner.terminate());
  }

  /// Cancel an in-flight start. Returns the start caller's responder.
  pub fn preempt_start(&mut self, actor_id: &str) -> Result<Option<Responder>, InvalidTransition> {
    let generation = self.bump();
    let slot = self.slots.entry(actor_id.to_string()).or_default();
    slot.transition(Lifecycle::Stopped)?;
    slot.generation = generation;
    info!(
      event = "actor_start_preempted",
      group_id = %self.group_id,
      actor_id
    );
    Ok(slot.start_reply.take())
  }

  /// `running → stopping`: terminate on the blocking pool and report `StopFinished`.
  pub fn begin_stop(
    &mut self,
    actor_id: &str,
    by: &Caller,
    reply: Option<Responder>,
    tx: &GroupSender,
  ) -> Result<(), InvalidTransition> {
    let generation = self.bump();
    let slot = self.slots.entry(actor_id.to_string()).or_default();
    slot.transition(Lifecycle::Stopping)?;
    slot.generation = generation;
    slot.stop_by = by.id().to_string();
    slot.stop_reply = reply;
    let runner = slot.runner.take();

    info!(
      event = "actor_stopping",
      group_id = %self.group_id,
      actor_id,
      generation
    );

    let tx = tx.clone();
    let actor_id = actor_id.to_string();
    tokio::task::spawn_blocking(move || {
      if let Some(runner) = runner {
        runner.terminate();
      }
      let _ = tx.send(GroupMessage::StopFinished {
        actor_id,
        generation,
      });
    });
    Ok(())
  }

  /// `stopping → stopped`. Returns the stop caller's identity and responder for a current report.
  pub fn stop_finished(
    &mut self,
    actor_id: &str,
    generation: u64,
  ) -> Option<(String, Option<Responder>)> {
    let slot = self.slots.get_mut(actor_id)?;
    if slot.generation != generation || slot.lifecycle != Lifecycle::Stopping {
      return None;
    }
    slot.lifecycle = Lifecycle::Stopped;
    info!(
      event = "actor_stopped",
      group_id = %self.group_id,
      actor_id
    );
    Some((std::mem::take(&mut slot.stop_by), slot.stop_reply.take()))
  }

  /// Whether an exit report means the running actor crashed. Exits during a start are
  /// remembered and surface from [`Supervisor::commit_start`].
  pub fn runner_exited(&mut self, actor_id: &str, generation: u64, exit_code: Option<u32>) -> bool {
    let Some(slot) = self.slots.get_mut(actor_id) else {
      return false;
    };
    if slot.generation != generation {
      return false;
    }
    match slot.lifecycle {
      Lifecycle::Starting => {
        slot.early_exit = Some(exit_code);
        false
      }
      Lifecycle::Running => true,
      _ => false,
    }
  }

  /// `running → stopped` after an unexpected exit.
  pub fn mark_crashed(&mut self, actor_id: &str) {
    if let Some(slot) = self.slots.get_mut(actor_id) {
      slot.runner = None;
      if let Err(e) = slot.transition(Lifecycle::Stopped) {
        warn!(event = "actor_crash_transition_invalid", actor_id, error = %e);
      }
    }
  }

  /// `stopped → removed`; the slot is dropped. Returns requests still parked on it.
  pub fn remove(&mut self, actor_id: &str) -> Result<Vec<Deferred>, InvalidTransition> {
    if let Some(slot) = self.slots.get_mut(actor_id) {
      slot.transition(Lifecycle::Removed)?;
    }
    Ok(
      self
        .slots
        .remove(actor_id)
        .map(|slot| slot.deferred.into_iter().collect())
        .unwrap_or_default(),
    )
  }

  /// Kill every live runner. Used when the group shuts down.
  pub fn terminate_all(&mut self) {
    for (actor_id, slot) in self.slots.iter_mut() {
      if let Some(runner) = slot.runner.take() {
        debug!(event = "actor_terminate_on_shutdown", actor_id = %actor_id);
        runner.terminate();
      }
      slot.lifecycle = Lifecycle::Stopped;
    }
  }
}
