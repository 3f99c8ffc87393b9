use std::sync::Arc;

use anyhow::Context;
use portable_pty::{CommandBuilder, PtySize, native_pty_system};
use tracing::debug;

use super::constants::{PTY_COLS, PTY_ROWS};
use super::session::{PtySession, spawn_reader_thread, spawn_wait_thread};
use crate::agent::{ExitHook, LaunchSpec};

pub(crate) fn spawn_command(spec: &LaunchSpec, on_exit: ExitHook) -> anyhow::Result<Arc<PtySession>> {
  let (program, args) = spec
    .command
    .split_first()
    .ok_or_else(|| anyhow::anyhow!("empty command for actor {}", spec.actor_id))?;

  debug!(
    event = "pty_spawn_prepare",
    actor_id = %spec.actor_id,
    program = %program,
    args_len = args.len(),
    env_len = spec.env.len(),
    cwd = %spec.cwd.display()
  );

  let pty_system = native_pty_system();
  let pair = pty_system
    .openpty(PtySize {
      rows: PTY_ROWS,
      cols: PTY_COLS,
      pixel_width: 0,
      pixel_height: 0,
    })
    .with_context(|| format!("openpty failed for actor {}", spec.actor_id))?;

  let mut cmd = CommandBuilder::new(program);
  cmd.cwd(spec.cwd.as_os_str());
  for arg in args {
    cmd.arg(arg);
  }
  for (name, value) in &spec.env {
    cmd.env(name, value);
  }
  let child = pair
    .slave
    .spawn_command(cmd)
    .with_context(|| format!("spawn '{}' in {}", program, spec.cwd.display()))?;
  // The slave end belongs to the child now; holding it would keep EOF from arriving.
  drop(pair.slave);
  debug!(
    event = "pty_spawn_child",
    actor_id = %spec.actor_id,
    program = %program,
    pid = ?child.process_id()
  );

  let killer = child.clone_killer();
  let session = Arc::new(PtySession::new(&spec.actor_id, pair.master, killer));
  spawn_reader_thread(Arc::clone(&session));
  spawn_wait_thread(Arc::clone(&session), child, on_exit);
  Ok(session)
}
