//! Append-only, per-group event log.
//!
//! Events are stored one JSON object per line in `ledger.jsonl` and fsynced on every
//! append. Ids start at 1 and are gapless. On open the whole file is replayed into memory;
//! a torn final record (crash during a write) is cut off and reported once, while damage
//! anywhere else is treated as corruption.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::domain::event::{Event, EventDraft};

pub mod cursors;

pub use cursors::CursorTable;

/// Buffered events per live subscriber before it starts lagging.
const SUBSCRIBER_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum LedgerError {
  #[error("ledger io: {0}")]
  Io(#[from] io::Error),
  #[error("ledger encode: {0}")]
  Encode(#[from] serde_json::Error),
  #[error("ledger corrupt at line {line}: {details}")]
  Corrupt { line: usize, details: String },
  #[error("ledger {} refuses writes after a failed rollback; reopen the group", .0.display())]
  Sealed(PathBuf),
}

/// Emitted when a torn tail record was dropped while opening the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
  pub path: PathBuf,
  pub kept_events: usize,
  pub truncated_bytes: u64,
}

pub struct Ledger {
  path: PathBuf,
  file: File,
  events: Vec<Event>,
  live: broadcast::Sender<Event>,
  // Set when a partial record could not be cut off; the file tail is then unknown.
  sealed: bool,
  #[cfg(test)]
  fail_next_write: bool,
  #[cfg(test)]
  fail_next_rollback: bool,
}

impl Ledger {
  /// Open (or create) the ledger at `path`, replaying every committed record.
  pub fn open(path: &Path) -> Result<(Self, Option<RecoveryReport>), LedgerError> {
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
      .create(true)
      .read(true)
      .append(true)
      .open(path)?;

    let mut raw = Vec::new();
    file.read_to_end(&mut raw)?;
    let (events, valid_len) = parse_records(&raw)?;

    let mut report = None;
    if valid_len < raw.len() as u64 {
      let truncated_bytes = raw.len() as u64 - valid_len;
      file.set_len(valid_len)?;
      file.sync_all()?;
      warn!(
        event = "ledger_tail_truncated",
        path = %path.display(),
        kept_events = events.len(),
        truncated_bytes,
        "dropped torn tail record while opening ledger"
      );
      report = Some(RecoveryReport {
        path: path.to_path_buf(),
        kept_events: events.len(),
        truncated_bytes,
      });
    }
    file.seek(SeekFrom::End(0))?;

    let (live, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
    Ok((
      Self {
        path: path.to_path_buf(),
        file,
        events,
        live,
        sealed: false,
        #[cfg(test)]
        fail_next_write: false,
        #[cfg(test)]
        fail_next_rollback: false,
      },
      report,
    ))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Assign the next id, persist durably, publish to subscribers, and return the record.
  /// A failed write leaves neither bytes on disk nor an in-memory event behind.
  pub fn append(&mut self, draft: EventDraft) -> Result<Event, LedgerError> {
    if self.sealed {
      return Err(LedgerError::Sealed(self.path.clone()));
    }
    let event = Event {
      id: self.last_id() + 1,
      ts: Utc::now(),
      by: draft.by,
      body: draft.body,
    };
    let mut line = serde_json::to_vec(&event)?;
    line.push(b'\n');

    let len_before = self.file.metadata()?.len();
    if let Err(err) = self.write_durably(&line) {
      // Roll back whatever part of the record reached the file.
      if let Err(rollback) = self.truncate_to(len_before) {
        self.sealed = true;
        error!(
          event = "ledger_rollback_failed",
          path = %self.path.display(),
          id = event.id,
          error = %err,
          rollback_error = %rollback,
          "could not cut off a failed append; ledger sealed"
        );
        return Err(err.into());
      }
      warn!(
        event = "ledger_append_failed",
        path = %self.path.display(),
        id = event.id,
        error = %err,
        "ledger append failed; rolled back"
      );
      return Err(err.into());
    }

    debug!(
      event = "ledger_appended",
      path = %self.path.display(),
      id = event.id,
      kind = %event.kind(),
      by = %event.by
    );
    self.events.push(event.clone());
    // No receivers is fine: nobody is tailing this group right now.
    let _ = self.live.send(event.clone());
    Ok(event)
  }

  fn write_durably(&mut self, line: &[u8]) -> io::Result<()> {
    #[cfg(test)]
    if std::mem::take(&mut self.fail_next_write) {
      return Err(io::Error::other("injected write failure"));
    }
    self.file.write_all(line)?;
    self.file.sync_data()
  }

  fn truncate_to(&mut self, len: u64) -> io::Result<()> {
    #[cfg(test)]
    if std::mem::take(&mut self.fail_next_rollback) {
      return Err(io::Error::other("injected truncate failure"));
    }
    self.file.set_len(len)?;
    self.file.seek(SeekFrom::End(0))?;
    Ok(())
  }

  /// Last `n` events in ledger order.
  pub fn tail(&self, n: usize) -> &[Event] {
    let start = self.events.len().saturating_sub(n);
    &self.events[start..]
  }

  /// Up to `limit` events with id strictly greater than `cursor`.
  pub fn read_from(&self, cursor: u64, limit: usize) -> &[Event] {
    // Ids are gapless from 1, so event `id` lives at index `id - 1`.
    let start = (cursor as usize).min(self.events.len());
    let end = start.saturating_add(limit).min(self.events.len());
    &self.events[start..end]
  }

  pub fn get(&self, id: u64) -> Option<&Event> {
    if id == 0 {
      return None;
    }
    self.events.get(id as usize - 1)
  }

  pub fn events(&self) -> &[Event] {
    &self.events
  }

  pub fn last_id(&self) -> u64 {
    self.events.len() as u64
  }

  /// Live stream of events appended after this call.
  pub fn subscribe(&self) -> broadcast::Receiver<Event> {
    self.live.subscribe()
  }

  pub fn live_sender(&self) -> broadcast::Sender<Event> {
    self.live.clone()
  }

  #[cfg(test)]
  pub(crate) fn fail_next_write(&mut self) {
    self.fail_next_write = true;
  }

  #[cfg(test)]
  pub(crate) fn fail_next_rollback(&mut self) {
    self.fail_next_rollback = true;
  }
}

/// Parse complete records. Returns the events and the byte length of the valid prefix.
fn parse_records(raw: &[u8]) -> Result<(Vec<Event>, u64), LedgerError> {
  let mut events = Vec::new();
  let mut offset = 0usize;
  let mut line_no = 0usize;

  while offset < raw.len() {
    line_no += 1;
    let Some(nl) = raw[offset..].iter().position(|b| *b == b'\n') else {
      // No terminating newline: the final write never completed.
      break;
    };
    let line = &raw[offset..offset + nl];
    let next = offset + nl + 1;
    let is_last = next >= raw.len();

    match serde_json::from_slice::<Event>(line) {
      Ok(event) => {
        let expected = events.len() as u64 + 1;
        if event.id != expected {
          return Err(LedgerError::Corrupt {
            line: line_no,
            details: format!("expected id {expected}, found {}", event.id),
          });
        }
        events.push(event);
      }
      Err(_) if is_last => break,
      Err(err) => {
        return Err(LedgerError::Corrupt {
          line: line_no,
          details: err.to_string(),
        });
      }
    }
    offset = next;
  }

  Ok((events, offset as u64))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::event::{ChatRead, EventBody, GroupCreated};
  use proptest::prelude::*;

  fn draft(n: u64) -> EventDraft {
    EventDraft::new(
      "peer",
      EventBody::ChatRead(ChatRead {
        actor_id: "peer".into(),
        event_id: n,
      }),
    )
  }

  fn open(path: &Path) -> Ledger {
    Ledger::open(path).expect("open ledger").0
  }

  #[test]
  fn ids_are_gapless_and_tail_reads_work() {
    let td = tempfile::tempdir().unwrap();
    let path = td.path().join("ledger.jsonl");
    let mut ledger = open(&path);
    for n in 0..5 {
      let ev = ledger.append(draft(n)).unwrap();
      assert_eq!(ev.id, n + 1);
    }
    assert_eq!(ledger.last_id(), 5);
    let tail: Vec<u64> = ledger.tail(2).iter().map(|e| e.id).collect();
    assert_eq!(tail, vec![4, 5]);
    let from: Vec<u64> = ledger.read_from(2, 2).iter().map(|e| e.id).collect();
    assert_eq!(from, vec![3, 4]);
    assert!(ledger.read_from(5, 10).is_empty());
    assert!(ledger.read_from(99, 10).is_empty());
    assert!(ledger.get(0).is_none());
    assert_eq!(ledger.get(3).map(|e| e.id), Some(3));
  }

  #[test]
  fn reopen_replays_identical_sequence() {
    let td = tempfile::tempdir().unwrap();
    let path = td.path().join("ledger.jsonl");
    {
      let mut ledger = open(&path);
      ledger
        .append(EventDraft::new(
          "user",
          EventBody::GroupCreated(GroupCreated {
            title: "demo".into(),
            scope: "/tmp/demo".into(),
          }),
        ))
        .unwrap();
      for n in 0..3 {
        ledger.append(draft(n)).unwrap();
      }
    }
    let first = open(&path).events().to_vec();
    let second = open(&path).events().to_vec();
    assert_eq!(first.len(), 4);
    assert_eq!(first, second);
  }

  #[test]
  fn torn_tail_is_truncated_with_report() {
    let td = tempfile::tempdir().unwrap();
    let path = td.path().join("ledger.jsonl");
    {
      let mut ledger = open(&path);
      ledger.append(draft(1)).unwrap();
      ledger.append(draft(2)).unwrap();
    }
    let good_len = fs::metadata(&path).unwrap().len();
    {
      let mut f = OpenOptions::new().append(true).open(&path).unwrap();
      f.write_all(br#"{"id":3,"ts":"2024-01-01T00:00"#).unwrap();
    }

    let (mut ledger, report) = Ledger::open(&path).unwrap();
    let report = report.expect("recovery report");
    assert_eq!(report.kept_events, 2);
    assert!(report.truncated_bytes > 0);
    assert_eq!(fs::metadata(&path).unwrap().len(), good_len);

    // Appending continues from the last good record.
    assert_eq!(ledger.append(draft(3)).unwrap().id, 3);
    drop(ledger);
    let (reopened, report) = Ledger::open(&path).unwrap();
    assert!(report.is_none(), "recovery is reported only once");
    assert_eq!(reopened.last_id(), 3);
  }

  #[test]
  fn garbage_in_the_middle_is_corruption() {
    let td = tempfile::tempdir().unwrap();
    let path = td.path().join("ledger.jsonl");
    {
      let mut ledger = open(&path);
      ledger.append(draft(1)).unwrap();
      ledger.append(draft(2)).unwrap();
    }
    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    fs::write(&path, format!("{}\nnot json\n{}\n", lines[0], lines[1])).unwrap();

    match Ledger::open(&path) {
      Err(LedgerError::Corrupt { line, .. }) => assert_eq!(line, 2),
      other => panic!("expected corruption, got {:?}", other.map(|(l, _)| l.last_id())),
    }
  }

  #[test]
  fn failed_write_leaves_no_event() {
    let td = tempfile::tempdir().unwrap();
    let path = td.path().join("ledger.jsonl");
    let mut ledger = open(&path);
    ledger.append(draft(1)).unwrap();
    let len = fs::metadata(&path).unwrap().len();

    ledger.fail_next_write();
    assert!(ledger.append(draft(2)).is_err());
    assert_eq!(ledger.last_id(), 1);
    assert_eq!(fs::metadata(&path).unwrap().len(), len);

    assert_eq!(ledger.append(draft(2)).unwrap().id, 2);
  }

  #[test]
  fn failed_rollback_seals_until_reopened() {
    let td = tempfile::tempdir().unwrap();
    let path = td.path().join("ledger.jsonl");
    let mut ledger = open(&path);
    ledger.append(draft(1)).unwrap();

    ledger.fail_next_write();
    ledger.fail_next_rollback();
    assert!(matches!(ledger.append(draft(2)), Err(LedgerError::Io(_))));
    assert!(matches!(ledger.append(draft(2)), Err(LedgerError::Sealed(_))));
    assert_eq!(ledger.last_id(), 1);
    drop(ledger);

    let mut reopened = open(&path);
    assert_eq!(reopened.last_id(), 1);
    assert_eq!(reopened.append(draft(2)).unwrap().id, 2);
  }

  #[tokio::test]
  async fn subscribers_see_appends_in_order() {
    let td = tempfile::tempdir().unwrap();
    let mut ledger = open(&td.path().join("ledger.jsonl"));
    ledger.append(draft(0)).unwrap();
    let mut rx = ledger.subscribe();
    ledger.append(draft(1)).unwrap();
    ledger.append(draft(2)).unwrap();
    assert_eq!(rx.recv().await.unwrap().id, 2);
    assert_eq!(rx.recv().await.unwrap().id, 3);
  }

  proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]
    #[test]
    fn appended_ids_strictly_increase(count in 1usize..40) {
      let td = tempfile::tempdir().unwrap();
      let path = td.path().join("ledger.jsonl");
      let mut ledger = open(&path);
      let mut prev = 0u64;
      for n in 0..count {
        let id = ledger.append(draft(n as u64)).unwrap().id;
        prop_assert!(id > prev);
        prev = id;
      }
      drop(ledger);
      let replayed: Vec<u64> = open(&path).events().iter().map(|e| e.id).collect();
      prop_assert_eq!(replayed, (1..=count as u64).collect::<Vec<_>>());
    }
  }
}
