use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// One message waiting for (or ready for) injection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending {
  pub event_id: u64,
  pub text: String,
}

/// Messages to inject into one recipient in a single write, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
  pub actor_id: String,
  pub items: Vec<Pending>,
}

impl Batch {
  pub fn event_ids(&self) -> Vec<u64> {
    self.items.iter().map(|p| p.event_id).collect()
  }

  pub fn text(&self) -> String {
    self
      .items
      .iter()
      .map(|p| p.text.as_str())
      .collect::<Vec<_>>()
      .join("\n")
  }
}

#[derive(Debug, Default)]
struct Lane {
  last_injection: Option<Instant>,
  queue: VecDeque<Pending>,
}

/// Per-recipient minimum spacing between injections. Never drops or reorders.
#[derive(Debug)]
pub struct Throttle {
  min_interval: Duration,
  lanes: HashMap<String, Lane>,
}

impl Throttle {
  pub fn new(min_interval: Duration) -> Self {
    Self {
      min_interval,
      lanes: HashMap::new(),
    }
  }

  pub fn set_min_interval(&mut self, min_interval: Duration) {
    self.min_interval = min_interval;
  }

  /// Offer a message for `actor_id`. Returns a batch to inject now, or `None` if it was queued.
  pub fn offer(&mut self, actor_id: &str, pending: Pending, now: Instant) -> Option<Batch> {
    let min_interval = self.min_interval;
    let lane = self.lanes.entry(actor_id.to_string()).or_default();
    let open = lane
      .last_injection
      .is_none_or(|last| now.saturating_duration_since(last) >= min_interval);
    if open && lane.queue.is_empty() {
      lane.last_injection = Some(now);
      return Some(Batch {
        actor_id: actor_id.to_string(),
        items: vec![pending],
      });
    }
    lane.queue.push_back(pending);
    None
  }

  /// Drain every lane whose interval has elapsed, one batch per recipient.
  pub fn due(&mut self, now: Instant) -> Vec<Batch> {
    let min_interval = self.min_interval;
    let mut batches = Vec::new();
    for (actor_id, lane) in self.lanes.iter_mut() {
      if lane.queue.is_empty() {
        continue;
      }
      let ready = lane
        .last_injection
        .is_none_or(|last| now.saturating_duration_since(last) >= min_interval);
      if ready {
        lane.last_injection = Some(now);
        batches.push(Batch {
          actor_id: actor_id.clone(),
          items: lane.queue.drain(..).collect(),
        });
      }
    }
    batches.sort_by(|a, b| a.items[0].event_id.cmp(&b.items[0].event_id));
    batches
  }

  /// Earliest instant at which some queued lane becomes due.
  pub fn next_deadline(&self) -> Option<Instant> {
    self
      .lanes
      .values()
      .filter(|lane| !lane.queue.is_empty())
      .map(|lane| match lane.last_injection {
        Some(last) => last + self.min_interval,
        None => Instant::now(),
      })
      .min()
  }

  /// Drop a recipient's lane, returning whatever was still queued.
  pub fn forget(&mut self, actor_id: &str) -> Vec<Pending> {
    self
      .lanes
      .remove(actor_id)
      .map(|lane| lane.queue.into_iter().collect())
      .unwrap_or_default()
  }

  pub fn queued(&self, actor_id: &str) -> usize {
    self.lanes.get(actor_id).map(|l| l.queue.len()).unwrap_or(0)
  }
}
