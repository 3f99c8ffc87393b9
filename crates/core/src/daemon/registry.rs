use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::adapters::fs;
use crate::automation;
use crate::error::CoreError;
use crate::group::{GroupEnv, GroupHandle};
use crate::rpc::{AttachParams, AttachResult, GroupList, GroupSummary};

#[derive(Default)]
struct Inner {
  groups: BTreeMap<String, GroupHandle>,
  schedulers: Vec<JoinHandle<()>>,
}

/// Every group this daemon serves, keyed by group id.
pub struct Groups {
  env: GroupEnv,
  inner: Mutex<Inner>,
  // Serializes attaches so group creation happens outside `inner`.
  attaching: Mutex<()>,
}

impl Groups {
  /// Open every group found under the home directory. Groups whose ledger cannot be
  /// loaded are logged and skipped.
  pub fn load_all(env: GroupEnv) -> io::Result<Self> {
    let groups = Self {
      env,
      inner: Mutex::new(Inner::default()),
      attaching: Mutex::new(()),
    };
    for group_id in fs::list_group_ids(&groups.env.home)? {
      match GroupHandle::open(&groups.env, &group_id) {
        Ok(handle) => groups.register(&mut groups.inner.lock(), handle),
        Err(err) => error!(
          event = "group_load_failed",
          group_id = %group_id,
          error = %err,
          "skipping group"
        ),
      }
    }
    info!(event = "groups_loaded", count = groups.len());
    Ok(groups)
  }

  fn register(&self, inner: &mut Inner, handle: GroupHandle) {
    let interval = Duration::from_millis(self.env.config.automation.sweep_interval_ms);
    inner
      .schedulers
      .push(automation::spawn(handle.clone(), interval));
    inner.groups.insert(handle.id().to_string(), handle);
  }

  /// Attach a directory as a group scope, creating the group on first attach.
  pub fn attach(&self, params: AttachParams) -> Result<AttachResult, CoreError> {
    let path = Path::new(&params.path);
    let scope = path
      .canonicalize()
      .map_err(|e| CoreError::invalid(format!("cannot attach {}: {e}", path.display())))?;
    if !scope.is_dir() {
      return Err(CoreError::invalid(format!(
        "cannot attach {}: not a directory",
        scope.display()
      )));
    }
    let scope = scope.to_string_lossy().into_owned();

    let _attaching = self.attaching.lock();
    if let Some(existing) = self.find_scope(&scope) {
      return Ok(AttachResult {
        group_id: existing,
        created: false,
      });
    }

    let title = params.title.unwrap_or_else(|| {
      Path::new(&scope)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| scope.clone())
    });
    let group_id = format!("g_{}", &Uuid::new_v4().simple().to_string()[..8]);
    let handle = GroupHandle::create(&self.env, &group_id, &title, &scope)?;
    self.register(&mut self.inner.lock(), handle);
    info!(event = "group_attached", group_id = %group_id, scope = %scope);
    Ok(AttachResult {
      group_id,
      created: true,
    })
  }

  fn find_scope(&self, scope: &str) -> Option<String> {
    self
      .inner
      .lock()
      .groups
      .values()
      .find(|g| g.scope() == scope)
      .map(|g| g.id().to_string())
  }

  pub fn get(&self, group_id: &str) -> Result<GroupHandle, CoreError> {
    self
      .inner
      .lock()
      .groups
      .get(group_id)
      .cloned()
      .ok_or_else(|| CoreError::GroupNotFound(group_id.to_string()))
  }

  pub fn list(&self) -> GroupList {
    let groups = self
      .inner
      .lock()
      .groups
      .values()
      .map(|g| GroupSummary {
        group_id: g.id().to_string(),
        title: g.title().to_string(),
        scope: g.scope().to_string(),
      })
      .collect();
    GroupList { groups }
  }

  pub fn len(&self) -> usize {
    self.inner.lock().groups.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Stop schedulers and group workers. Actor processes are terminated.
  pub async fn shutdown_all(&self) {
    let (handles, schedulers) = {
      let mut inner = self.inner.lock();
      let handles: Vec<GroupHandle> = std::mem::take(&mut inner.groups).into_values().collect();
      (handles, std::mem::take(&mut inner.schedulers))
    };
    for scheduler in schedulers {
      scheduler.abort();
    }
    for handle in handles {
      handle.shutdown().await;
    }
    info!(event = "groups_shutdown");
  }
}
