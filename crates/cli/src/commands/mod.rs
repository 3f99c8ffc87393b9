use std::path::{Path, PathBuf};

use cccc_core::rpc::GroupList;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::args::Scope;
use crate::rpc::client::Client;
use crate::util::daemon_proc::{Env, resolve_env, runtime};
use crate::util::errors::fail;

pub mod actor;
pub mod daemon;
pub mod group;
pub mod message;

/// Per-invocation plumbing shared by the group-scoped commands.
pub struct Ctx {
  pub env: Env,
  pub client: Client,
  pub rt: tokio::runtime::Runtime,
  pub json: bool,
}

impl Ctx {
  pub fn new(json: bool) -> Self {
    let env = resolve_env();
    let client = env.client();
    Self {
      env,
      client,
      rt: runtime(),
      json,
    }
  }

  /// Explicit `--group`, else the attached group whose scope contains the current directory.
  pub fn group_id(&self, scope: &Scope) -> String {
    if let Some(id) = &scope.group {
      return id.clone();
    }
    let list = match self.rt.block_on(self.client.group_list()) {
      Ok(list) => list,
      Err(e) => fail("group lookup", &e),
    };
    let cwd = std::env::current_dir()
      .and_then(|p| p.canonicalize())
      .unwrap_or_else(|_| PathBuf::from("."));
    match group_for_dir(&list, &cwd) {
      Some(id) => id,
      None => {
        eprintln!(
          "group lookup failed [GROUP_NOT_FOUND]: no group attached at {}; run `cccc attach` or pass --group",
          cwd.display()
        );
        std::process::exit(1);
      }
    }
  }

  pub fn call<T: DeserializeOwned>(&self, action: &str, scope: &Scope, method: &str, args: Value) -> T {
    let group_id = self.group_id(scope);
    match self
      .rt
      .block_on(self.client.group_call(method, &group_id, &scope.by, args))
    {
      Ok(v) => v,
      Err(e) => fail(action, &e),
    }
  }

  /// Print `value` as JSON in `--json` mode, otherwise through `human`.
  pub fn emit<T: DeserializeOwned>(&self, value: Value, human: impl FnOnce(T)) {
    if self.json {
      println!(
        "{}",
        serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
      );
      return;
    }
    match serde_json::from_value::<T>(value.clone()) {
      Ok(typed) => human(typed),
      Err(_) => println!("{value}"),
    }
  }
}

/// Innermost group whose scope is `dir` or one of its ancestors.
pub fn group_for_dir(list: &GroupList, dir: &Path) -> Option<String> {
  list
    .groups
    .iter()
    .filter(|g| dir.starts_with(&g.scope))
    .max_by_key(|g| g.scope.len())
    .map(|g| g.group_id.clone())
}

#[cfg(test)]
mod tests {
  use super::*;
  use cccc_core::rpc::GroupSummary;

  fn summary(id: &str, scope: &str) -> GroupSummary {
    GroupSummary {
      group_id: id.into(),
      title: id.into(),
      scope: scope.into(),
    }
  }

  #[test]
  fn picks_innermost_enclosing_scope() {
    let list = GroupList {
      groups: vec![
        summary("g_outer", "/work"),
        summary("g_inner", "/work/app"),
        summary("g_other", "/elsewhere"),
      ],
    };
    assert_eq!(
      group_for_dir(&list, Path::new("/work/app/src")).as_deref(),
      Some("g_inner")
    );
    assert_eq!(
      group_for_dir(&list, Path::new("/work/docs")).as_deref(),
      Some("g_outer")
    );
    // Path prefix, not string prefix.
    assert_eq!(group_for_dir(&list, Path::new("/workshop")), None);
  }
}
