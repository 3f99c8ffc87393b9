use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::event::{Event, EventBody};

/// Per-reader watermark: every event with `id <= cursor` counts as read.
///
/// The ledger's `chat.read` events are the source of truth; `cursors.json` only saves a replay
/// when it was written against the exact ledger state found on load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CursorTable {
  cursors: BTreeMap<String, u64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CursorCache {
  ledger_last_id: u64,
  cursors: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStatus {
  Used,
  Rebuilt(&'static str),
}

impl CursorTable {
  pub fn rebuild(events: &[Event]) -> Self {
    let mut table = Self::default();
    for event in events {
      table.apply(event);
    }
    table
  }

  /// Load cursors for a replayed ledger, preferring the cache only when it is provably current.
  pub fn load(cache_path: &Path, events: &[Event]) -> (Self, CacheStatus) {
    let last_id = events.last().map(|e| e.id).unwrap_or(0);
    let status = match fs::read(cache_path) {
      Err(err) if err.kind() == io::ErrorKind::NotFound => CacheStatus::Rebuilt("missing"),
      Err(_) => CacheStatus::Rebuilt("unreadable"),
      Ok(bytes) => match serde_json::from_slice::<CursorCache>(&bytes) {
        Err(_) => CacheStatus::Rebuilt("malformed"),
        Ok(cache) if cache.ledger_last_id != last_id => CacheStatus::Rebuilt("stale"),
        Ok(cache) if cache.cursors.values().any(|c| *c > last_id) => {
          CacheStatus::Rebuilt("ahead_of_ledger")
        }
        Ok(cache) => {
          debug!(
            event = "cursor_cache_used",
            path = %cache_path.display(),
            ledger_last_id = last_id
          );
          return (
            Self {
              cursors: cache.cursors,
            },
            CacheStatus::Used,
          );
        }
      },
    };

    if let CacheStatus::Rebuilt(reason) = &status {
      info!(
        event = "cursor_cache_rebuilt",
        path = %cache_path.display(),
        reason = *reason,
        ledger_last_id = last_id,
        "rebuilding read cursors from ledger"
      );
    }
    (Self::rebuild(events), status)
  }

  /// Fold a committed event into the table.
  pub fn apply(&mut self, event: &Event) {
    if let EventBody::ChatRead(read) = &event.body {
      self.advance(&read.actor_id, read.event_id);
    }
  }

  pub fn get(&self, reader: &str) -> u64 {
    self.cursors.get(reader).copied().unwrap_or(0)
  }

  /// Move `reader` to `max(current, event_id)`. Returns whether the cursor moved.
  pub fn advance(&mut self, reader: &str, event_id: u64) -> bool {
    let slot = self.cursors.entry(reader.to_string()).or_insert(0);
    if event_id > *slot {
      *slot = event_id;
      true
    } else {
      false
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
    self.cursors.iter().map(|(k, v)| (k.as_str(), *v))
  }

  /// Write the cache atomically (temp file then rename).
  pub fn persist(&self, cache_path: &Path, ledger_last_id: u64) -> io::Result<()> {
    let cache = CursorCache {
      ledger_last_id,
      cursors: self.cursors.clone(),
    };
    let bytes = serde_json::to_vec_pretty(&cache).map_err(io::Error::other)?;
    let tmp = cache_path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, cache_path)
  }
}
