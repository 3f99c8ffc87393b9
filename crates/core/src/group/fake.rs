//! In-memory runners for exercising group workers without real processes.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::agent::{ExitHook, LaunchSpec, Runner, RunnerFactory};
use crate::domain::actor::RunnerKind;

pub(crate) struct FakeRunner {
  pub actor_id: String,
  kind: RunnerKind,
  pub injected: Mutex<Vec<(Instant, String)>>,
  pub terminated: AtomicBool,
  pub idle: Mutex<Option<Duration>>,
}

impl Runner for FakeRunner {
  fn kind(&self) -> RunnerKind {
    self.kind
  }

  fn is_ready(&self) -> bool {
    !self.terminated.load(Ordering::SeqCst)
  }

  fn inject_text(&self, text: &str) -> anyhow::Result<()> {
    if self.kind == RunnerKind::Headless {
      anyhow::bail!("not injectable");
    }
    if self.terminated.load(Ordering::SeqCst) {
      anyhow::bail!("terminated");
    }
    self.injected.lock().push((Instant::now(), text.to_string()));
    Ok(())
  }

  fn read_output(&self, max_bytes: usize) -> Vec<u8> {
    let out = format!("output of {}", self.actor_id).into_bytes();
    let start = out.len().saturating_sub(max_bytes);
    out[start..].to_vec()
  }

  fn idle_for(&self) -> Option<Duration> {
    *self.idle.lock()
  }

  fn terminate(&self) {
    self.terminated.store(true, Ordering::SeqCst);
  }
}

/// Records every spawn. Spawns can be held back or made to fail, and exits can be triggered.
#[derive(Default)]
pub(crate) struct FakeFactory {
  pub spawned: Mutex<Vec<Arc<FakeRunner>>>,
  hooks: Mutex<HashMap<String, ExitHook>>,
  pub hold: AtomicBool,
  pub fail: AtomicBool,
  pub in_flight: AtomicUsize,
}

impl FakeFactory {
  pub fn spawn_count(&self) -> usize {
    self.spawned.lock().len()
  }

  pub fn runner(&self, actor_id: &str) -> Option<Arc<FakeRunner>> {
    self
      .spawned
      .lock()
      .iter()
      .rev()
      .find(|r| r.actor_id == actor_id)
      .cloned()
  }

  /// Simulate the actor's process exiting on its own.
  pub fn exit(&self, actor_id: &str, code: Option<u32>) {
    let hook = self.hooks.lock().remove(actor_id);
    if let Some(hook) = hook {
      hook(code);
    }
  }
}

impl RunnerFactory for FakeFactory {
  fn spawn(&self, spec: &LaunchSpec, on_exit: ExitHook) -> anyhow::Result<Arc<dyn Runner>> {
    self.in_flight.fetch_add(1, Ordering::SeqCst);
    while self.hold.load(Ordering::SeqCst) {
      thread::sleep(Duration::from_millis(5));
    }
    self.in_flight.fetch_sub(1, Ordering::SeqCst);
    if self.fail.load(Ordering::SeqCst) {
      anyhow::bail!("spawn refused for {}", spec.actor_id);
    }
    let runner = Arc::new(FakeRunner {
      actor_id: spec.actor_id.clone(),
      kind: spec.runner,
      injected: Mutex::new(Vec::new()),
      terminated: AtomicBool::new(false),
      idle: Mutex::new(None),
    });
    self.spawned.lock().push(Arc::clone(&runner));
    self.hooks.lock().insert(spec.actor_id.clone(), on_exit);
    Ok(runner)
  }
}
