use std::time::Duration;

use crate::agent::Runner;
use crate::domain::actor::RunnerKind;

/// Actor without a managed process. It reads its inbox over the control surface, so it is
/// always ready and never accepts injected text.
#[derive(Debug, Default)]
pub struct HeadlessRunner;

impl Runner for HeadlessRunner {
  fn kind(&self) -> RunnerKind {
    RunnerKind::Headless
  }

  fn is_ready(&self) -> bool {
    true
  }

  fn inject_text(&self, _text: &str) -> anyhow::Result<()> {
    anyhow::bail!("not injectable: headless actors read their inbox")
  }

  fn read_output(&self, _max_bytes: usize) -> Vec<u8> {
    Vec::new()
  }

  fn idle_for(&self) -> Option<Duration> {
    None
  }

  fn terminate(&self) {}
}
