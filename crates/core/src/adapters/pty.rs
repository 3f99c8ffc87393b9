use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::debug;

mod constants;
mod session;
mod spawn;

use session::{PtySession, encode_submission};

use crate::agent::{ExitHook, LaunchSpec, Runner};
use crate::domain::actor::RunnerKind;

/// Actor process attached to a pseudo-terminal.
pub struct PtyRunner {
  session: Arc<PtySession>,
}

impl PtyRunner {
  pub fn spawn(spec: &LaunchSpec, on_exit: ExitHook) -> anyhow::Result<Self> {
    let session = spawn::spawn_command(spec, on_exit)?;
    Ok(Self { session })
  }
}

impl Runner for PtyRunner {
  fn kind(&self) -> RunnerKind {
    RunnerKind::Pty
  }

  fn is_ready(&self) -> bool {
    !self.session.eof.load(Ordering::SeqCst) && !self.session.exited.load(Ordering::SeqCst)
  }

  fn inject_text(&self, text: &str) -> anyhow::Result<()> {
    if !self.is_ready() {
      anyhow::bail!("pty for {} is closed", self.session.actor_id);
    }
    self.session.write_input(&encode_submission(text))
  }

  fn read_output(&self, max_bytes: usize) -> Vec<u8> {
    self.session.tail(max_bytes)
  }

  fn idle_for(&self) -> Option<Duration> {
    Some(self.session.last_output.lock().elapsed())
  }

  fn terminate(&self) {
    if self.session.exited.load(Ordering::SeqCst) {
      return;
    }
    if let Err(e) = self.session.killer.lock().kill() {
      debug!(
        event = "pty_kill_failed",
        actor_id = %self.session.actor_id,
        error = %e
      );
    }
  }
}
