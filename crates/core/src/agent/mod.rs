//! Runner capability interface.
//!
//! The router and scheduler only talk to actors through [`Runner`], so neither needs to know
//! whether an actor sits behind a pseudo-terminal or has no managed process at all.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::actor::RunnerKind;

pub mod runner;

pub use runner::{LaunchContext, LaunchError, LaunchSpec, build_env, resolve_launch, substitute_tokens};

/// Called once from a background thread when the actor's process exits, with its exit code.
pub type ExitHook = Box<dyn FnOnce(Option<u32>) + Send + 'static>;

pub trait Runner: Send + Sync {
  fn kind(&self) -> RunnerKind;

  /// Whether the runner can accept injected text right now.
  fn is_ready(&self) -> bool;

  /// Write `text` into the actor's input and submit it.
  fn inject_text(&self, text: &str) -> anyhow::Result<()>;

  /// Up to `max_bytes` of the most recent output.
  fn read_output(&self, max_bytes: usize) -> Vec<u8>;

  /// Time since the last output, for runners that observe output.
  fn idle_for(&self) -> Option<Duration>;

  /// Kill the process (if any). Must be safe to call more than once.
  fn terminate(&self);
}

pub trait RunnerFactory: Send + Sync {
  /// Spawn a runner for `spec`. Blocking; called off the group task.
  fn spawn(&self, spec: &LaunchSpec, on_exit: ExitHook) -> anyhow::Result<Arc<dyn Runner>>;
}
