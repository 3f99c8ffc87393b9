use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use tracing::debug;

use super::{GroupMessage, GroupSender};
use crate::agent::Runner;
use crate::router::Batch;

struct Job {
  runner: Arc<dyn Runner>,
  batch: Batch,
}

/// Writes batches into runners on a dedicated thread, strictly in submission order, and
/// reports each outcome back to the group task.
pub(crate) struct Injector {
  jobs: mpsc::Sender<Job>,
}

impl Injector {
  pub(crate) fn spawn(group_id: &str, reply: GroupSender) -> Self {
    let (jobs, rx) = mpsc::channel::<Job>();
    let group_id = group_id.to_string();
    thread::spawn(move || {
      for job in rx {
        let event_ids = job.batch.event_ids();
        let error = job
          .runner
          .inject_text(&job.batch.text())
          .err()
          .map(|e| format!("{e:#}"));
        debug!(
          event = "delivery_injected",
          group_id = %group_id,
          actor_id = %job.batch.actor_id,
          events = ?event_ids,
          ok = error.is_none()
        );
        let _ = reply.send(GroupMessage::DeliveryFinished {
          actor_id: job.batch.actor_id,
          event_ids,
          error,
        });
      }
    });
    Self { jobs }
  }

  pub(crate) fn submit(&self, runner: Arc<dyn Runner>, batch: Batch) {
    let _ = self.jobs.send(Job { runner, batch });
  }
}
