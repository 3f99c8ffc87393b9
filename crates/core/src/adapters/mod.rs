use std::sync::Arc;

use tracing::info;

use crate::agent::{ExitHook, LaunchSpec, Runner, RunnerFactory};
use crate::domain::actor::RunnerKind;

pub mod fs;
pub mod headless;
pub mod pty;

pub use headless::HeadlessRunner;
pub use pty::PtyRunner;

/// Spawns real runners: a PTY child for `pty` actors, nothing for `headless` ones.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeRunnerFactory;

impl RunnerFactory for NativeRunnerFactory {
  fn spawn(&self, spec: &LaunchSpec, on_exit: ExitHook) -> anyhow::Result<Arc<dyn Runner>> {
    let runner: Arc<dyn Runner> = match spec.runner {
      RunnerKind::Pty => Arc::new(PtyRunner::spawn(spec, on_exit)?),
      RunnerKind::Headless => Arc::new(HeadlessRunner),
    };
    info!(
      event = "runner_spawned",
      group_id = %spec.group_id,
      actor_id = %spec.actor_id,
      runner = %spec.runner
    );
    Ok(runner)
  }
}
