use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;
use portable_pty::{Child, ChildKiller, MasterPty};
use tracing::{debug, info};

use super::constants::{MAX_BUFFER_BYTES, PASTE_BEGIN, PASTE_END};
use crate::agent::ExitHook;

pub(crate) struct PtySession {
  pub(crate) actor_id: String,
  pub(crate) master: Mutex<Box<dyn MasterPty + Send>>,
  pub(crate) writer: Mutex<Option<Box<dyn Write + Send>>>,
  pub(crate) history_ring: Mutex<Vec<u8>>,
  pub(crate) last_output: Mutex<Instant>,
  pub(crate) eof: AtomicBool,
  pub(crate) exited: AtomicBool,
  pub(crate) killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
}

impl PtySession {
  pub(crate) fn new(
    actor_id: &str,
    master: Box<dyn MasterPty + Send>,
    killer: Box<dyn ChildKiller + Send + Sync>,
  ) -> Self {
    Self {
      actor_id: actor_id.to_string(),
      master: Mutex::new(master),
      writer: Mutex::new(None),
      history_ring: Mutex::new(Vec::new()),
      last_output: Mutex::new(Instant::now()),
      eof: AtomicBool::new(false),
      exited: AtomicBool::new(false),
      killer: Mutex::new(killer),
    }
  }

  pub(crate) fn write_input(&self, data: &[u8]) -> anyhow::Result<()> {
    let mut opt_writer = self.writer.lock();
    if opt_writer.is_none() {
      *opt_writer = Some(self.master.lock().take_writer()?);
      debug!(
        event = "pty_writer_init",
        actor_id = %self.actor_id,
        "initialized writer for session"
      );
    }
    let writer = opt_writer
      .as_mut()
      .ok_or_else(|| anyhow::anyhow!("no writer for {}", self.actor_id))?;
    debug!(
      event = "pty_input_write",
      actor_id = %self.actor_id,
      bytes = data.len()
    );
    writer.write_all(data)?;
    writer.flush()?;
    Ok(())
  }

  pub(crate) fn tail(&self, max_bytes: usize) -> Vec<u8> {
    let ring = self.history_ring.lock();
    let start = ring.len().saturating_sub(max_bytes);
    ring[start..].to_vec()
  }
}

/// Encode injected text: multi-line text goes through bracketed paste so it arrives as one
/// input, and a carriage return submits it.
pub(crate) fn encode_submission(text: &str) -> Vec<u8> {
  let mut out = Vec::with_capacity(text.len() + PASTE_BEGIN.len() + PASTE_END.len() + 1);
  if text.contains('\n') {
    out.extend_from_slice(PASTE_BEGIN);
    out.extend_from_slice(text.as_bytes());
    out.extend_from_slice(PASTE_END);
  } else {
    out.extend_from_slice(text.as_bytes());
  }
  out.push(b'\r');
  out
}

pub(crate) fn spawn_reader_thread(session: Arc<PtySession>) {
  thread::spawn(move || {
    let reader_res = session.master.lock().try_clone_reader();
    let mut tmp = [0u8; 8192];
    if let Ok(mut reader) = reader_res {
      loop {
        match reader.read(&mut tmp) {
          Ok(0) => {
            session.eof.store(true, Ordering::SeqCst);
            debug!(event = "pty_reader_eof", actor_id = %session.actor_id, "PTY reader reached EOF");
            break;
          }
          Ok(n) => {
            let data = &tmp[..n];
            {
              let mut ring = session.history_ring.lock();
              ring.extend_from_slice(data);
              if ring.len() > MAX_BUFFER_BYTES {
                let excess = ring.len() - MAX_BUFFER_BYTES;
                ring.drain(0..excess);
              }
            }
            *session.last_output.lock() = Instant::now();
          }
          Err(e) => {
            session.eof.store(true, Ordering::SeqCst);
            debug!(event = "pty_reader_error", actor_id = %session.actor_id, error = %e);
            break;
          }
        }
      }
    } else {
      session.eof.store(true, Ordering::SeqCst);
    }
  });
}

/// Wait for the child in the background and report its exit exactly once.
pub(crate) fn spawn_wait_thread(
  session: Arc<PtySession>,
  mut child: Box<dyn Child + Send + Sync>,
  on_exit: ExitHook,
) {
  thread::spawn(move || {
    let exit_code = match child.wait() {
      Ok(status) => Some(status.exit_code()),
      Err(e) => {
        debug!(event = "pty_wait_error", actor_id = %session.actor_id, error = %e);
        None
      }
    };
    session.exited.store(true, Ordering::SeqCst);
    info!(
      event = "pty_child_exited",
      actor_id = %session.actor_id,
      exit_code = ?exit_code,
      "actor process exited"
    );
    on_exit(exit_code);
  });
}
