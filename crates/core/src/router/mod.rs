//! Message routing: recipient resolution, delivery planning and read/ack tracking.
//!
//! The router never writes to the ledger itself. It validates a send and builds the draft, and
//! it folds committed events into its cursor and ack state. The owning group task appends.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::event::{ChatMessage, Event, EventBody, EventDraft, EventKind, Priority};
use crate::domain::group::GroupView;
use crate::error::CoreError;
use crate::ledger::{CursorTable, Ledger};

pub mod envelope;
pub mod target;
pub mod throttle;

pub use envelope::format_envelope;
pub use target::{Resolution, resolve};
pub use throttle::{Batch, Pending, Throttle};

/// Arguments of `message.send` and `message.reply`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageArgs {
  #[serde(default)]
  pub to: Vec<String>,
  pub text: String,
  #[serde(default)]
  pub priority: Priority,
  #[serde(default)]
  pub reply_to: Option<u64>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AckError {
  #[error("event {0} does not require acknowledgement")]
  NotTracked(u64),
  #[error("{who} is not an ack recipient of event {event_id}")]
  NotAddressed { event_id: u64, who: String },
}

impl From<AckError> for CoreError {
  fn from(err: AckError) -> Self {
    CoreError::InvalidRequest(err.to_string())
  }
}

/// Ack maps for attention-priority messages. Entries only ever flip false → true.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AckBook {
  entries: BTreeMap<u64, BTreeMap<String, bool>>,
}

impl AckBook {
  pub fn apply(&mut self, event: &Event) {
    match &event.body {
      EventBody::ChatMessage(msg) if msg.priority == Priority::Attention => {
        if !msg.ack_required.is_empty() {
          let map = msg.ack_required.iter().map(|who| (who.clone(), false)).collect();
          self.entries.insert(event.id, map);
        }
      }
      EventBody::ChatAck(ack) => {
        if let Some(slot) = self
          .entries
          .get_mut(&ack.event_id)
          .and_then(|map| map.get_mut(&event.by))
        {
          *slot = true;
        }
      }
      _ => {}
    }
  }

  /// Validate an ack by `who`. `Ok(true)` means it is already recorded.
  pub fn check(&self, event_id: u64, who: &str) -> Result<bool, AckError> {
    let map = self
      .entries
      .get(&event_id)
      .ok_or(AckError::NotTracked(event_id))?;
    map.get(who).copied().ok_or_else(|| AckError::NotAddressed {
      event_id,
      who: who.to_string(),
    })
  }

  pub fn status(&self, event_id: u64) -> Option<&BTreeMap<String, bool>> {
    self.entries.get(&event_id)
  }

  pub fn is_fully_acked(&self, event_id: u64) -> Option<bool> {
    self.entries.get(&event_id).map(|map| map.values().all(|v| *v))
  }
}

/// Read and ack state for one group plus its delivery throttle.
#[derive(Debug)]
pub struct Router {
  pub cursors: CursorTable,
  pub acks: AckBook,
  pub throttle: Throttle,
}

impl Router {
  pub fn new(cursors: CursorTable, events: &[Event], min_interval: Duration) -> Self {
    let mut acks = AckBook::default();
    for event in events {
      acks.apply(event);
    }
    Self {
      cursors,
      acks,
      throttle: Throttle::new(min_interval),
    }
  }

  /// Fold a freshly committed event.
  pub fn observe(&mut self, event: &Event) {
    self.cursors.apply(event);
    self.acks.apply(event);
  }

  /// Validate a send and build the `chat.message` draft. Nothing is written here.
  pub fn prepare_message(
    view: &GroupView,
    ledger: &Ledger,
    sender: &str,
    args: &MessageArgs,
  ) -> Result<(EventDraft, Resolution), CoreError> {
    if args.text.trim().is_empty() {
      return Err(CoreError::invalid("message text must not be empty"));
    }
    if let Some(reply_to) = args.reply_to
      && ledger.get(reply_to).is_none()
    {
      return Err(CoreError::invalid(format!(
        "reply_to {reply_to} does not exist in group {}",
        view.id
      )));
    }

    let resolution = resolve(view, sender, &args.to);
    let to = resolution.recipients();
    let ack_required = match args.priority {
      Priority::Attention => to.clone(),
      Priority::Normal => Vec::new(),
    };
    let draft = EventDraft::new(
      sender,
      EventBody::ChatMessage(ChatMessage {
        text: args.text.clone(),
        priority: args.priority,
        to,
        tokens: args.to.clone(),
        unresolved: resolution.unresolved.clone(),
        reply_to: args.reply_to,
        ack_required,
      }),
    );
    Ok((draft, resolution))
  }

  /// Unread inbox items for `reader`: messages and notifications addressed to it past its cursor.
  pub fn inbox(&self, ledger: &Ledger, reader: &str, limit: usize) -> Vec<Event> {
    ledger
      .read_from(self.cursors.get(reader), usize::MAX)
      .iter()
      .filter(|e| e.addresses(reader))
      .take(limit)
      .cloned()
      .collect()
  }

  pub fn unread_messages(&self, ledger: &Ledger, reader: &str) -> usize {
    ledger
      .read_from(self.cursors.get(reader), usize::MAX)
      .iter()
      .filter(|e| e.kind() == EventKind::ChatMessage && e.addresses(reader))
      .count()
  }

  /// Timestamp of the oldest unread `chat.message` addressed to `reader`.
  pub fn oldest_unread_ts(&self, ledger: &Ledger, reader: &str) -> Option<DateTime<Utc>> {
    ledger
      .read_from(self.cursors.get(reader), usize::MAX)
      .iter()
      .find(|e| e.kind() == EventKind::ChatMessage && e.addresses(reader))
      .map(|e| e.ts)
  }
}
