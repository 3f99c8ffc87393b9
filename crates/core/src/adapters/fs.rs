use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Directory holding one subdirectory per group
pub fn groups_dir(home: &Path) -> PathBuf {
  home.join("groups")
}

pub fn group_dir(home: &Path, group_id: &str) -> PathBuf {
  groups_dir(home).join(group_id)
}

pub fn ledger_path(home: &Path, group_id: &str) -> PathBuf {
  group_dir(home, group_id).join("ledger.jsonl")
}

pub fn cursors_path(home: &Path, group_id: &str) -> PathBuf {
  group_dir(home, group_id).join("cursors.json")
}

pub fn logs_path(home: &Path) -> PathBuf {
  home.join("daemon.log.jsonl")
}

/// Ensure the home layout exists (directories are created if missing)
pub fn ensure_layout(home: &Path) -> io::Result<()> {
  fs::create_dir_all(groups_dir(home))
}

/// Ids of every group directory that contains a ledger, sorted.
pub fn list_group_ids(home: &Path) -> io::Result<Vec<String>> {
  let dir = groups_dir(home);
  if !dir.exists() {
    return Ok(Vec::new());
  }
  let mut ids = Vec::new();
  for entry in fs::read_dir(dir)? {
    let entry = entry?;
    if !entry.file_type()?.is_dir() {
      continue;
    }
    let id = entry.file_name().to_string_lossy().into_owned();
    if ledger_path(home, &id).exists() {
      ids.push(id);
    }
  }
  ids.sort();
  Ok(ids)
}
