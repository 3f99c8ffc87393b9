use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::Config;
use crate::domain::actor::{ActorRecord, RunnerKind};

/// Everything a runner factory needs to bring one actor up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
  pub group_id: String,
  pub actor_id: String,
  pub runner: RunnerKind,
  /// Program followed by its arguments. Empty for headless actors.
  pub command: Vec<String>,
  pub cwd: PathBuf,
  pub env: Vec<(String, String)>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LaunchError {
  #[error("runtime `{0}` is not configured")]
  UnknownRuntime(String),
  #[error("actor `{0}` has an empty launch command")]
  EmptyCommand(String),
}

/// Paths and ids exported to every actor process.
#[derive(Debug, Clone, Copy)]
pub struct LaunchContext<'a> {
  pub home: &'a Path,
  pub socket: &'a Path,
  pub group_id: &'a str,
  /// Working directory used when the actor does not name one (the group scope).
  pub scope: &'a Path,
}

pub fn build_env(ctx: &LaunchContext<'_>, actor_id: &str) -> HashMap<String, String> {
  let mut env = HashMap::new();
  env.insert("CCCC_HOME".to_string(), path_to_string(ctx.home));
  env.insert("CCCC_SOCKET".to_string(), path_to_string(ctx.socket));
  env.insert("CCCC_GROUP_ID".to_string(), ctx.group_id.to_string());
  env.insert("CCCC_ACTOR_ID".to_string(), actor_id.to_string());
  env
}

pub fn substitute_tokens(args: &[String], env: &HashMap<String, String>) -> Vec<String> {
  args
    .iter()
    .map(|arg| {
      let mut substituted = arg.clone();
      for (env_key, env_value) in env {
        let token = format!("${}", env_key);
        if substituted.contains(&token) {
          substituted = substituted.replace(&token, env_value);
        }
      }
      substituted
    })
    .collect()
}

/// Resolve the command, working directory and environment for `actor`.
///
/// A per-actor command overrides the runtime's configured one. Headless actors have no
/// managed process, so only their environment is resolved.
pub fn resolve_launch(
  config: &Config,
  ctx: &LaunchContext<'_>,
  actor: &ActorRecord,
) -> Result<LaunchSpec, LaunchError> {
  let env = build_env(ctx, &actor.id);

  let command = match actor.runner {
    RunnerKind::Headless => Vec::new(),
    RunnerKind::Pty => {
      let template = match &actor.command {
        Some(cmd) => cmd.clone(),
        None => config
          .runtimes
          .get(&actor.runtime)
          .map(|rt| rt.command.clone())
          .ok_or_else(|| LaunchError::UnknownRuntime(actor.runtime.clone()))?,
      };
      if template.first().is_none_or(|p| p.trim().is_empty()) {
        return Err(LaunchError::EmptyCommand(actor.id.clone()));
      }
      substitute_tokens(&template, &env)
    }
  };

  let cwd = match actor.cwd.as_deref() {
    Some(dir) if Path::new(dir).is_absolute() => PathBuf::from(dir),
    Some(dir) => ctx.scope.join(dir),
    None => ctx.scope.to_path_buf(),
  };

  let mut env: Vec<(String, String)> = env.into_iter().collect();
  env.sort();

  Ok(LaunchSpec {
    group_id: ctx.group_id.to_string(),
    actor_id: actor.id.clone(),
    runner: actor.runner,
    command,
    cwd,
    env,
  })
}

fn path_to_string(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn actor(runtime: &str, command: Option<Vec<&str>>) -> ActorRecord {
    ActorRecord {
      id: "peer1".into(),
      runtime: runtime.into(),
      runner: RunnerKind::Pty,
      command: command.map(|c| c.into_iter().map(String::from).collect()),
      cwd: None,
      enabled: true,
      added_at: 1,
    }
  }

  fn ctx() -> LaunchContext<'static> {
    LaunchContext {
      home: Path::new("/h"),
      socket: Path::new("/h/daemon/ccccd.sock"),
      group_id: "g_1",
      scope: Path::new("/work/project"),
    }
  }

  #[test]
  fn build_env_populates_expected_keys() {
    let env = build_env(&ctx(), "peer1");
    assert_eq!(env.get("CCCC_HOME").map(String::as_str), Some("/h"));
    assert_eq!(
      env.get("CCCC_SOCKET").map(String::as_str),
      Some("/h/daemon/ccccd.sock")
    );
    assert_eq!(env.get("CCCC_GROUP_ID").map(String::as_str), Some("g_1"));
    assert_eq!(env.get("CCCC_ACTOR_ID").map(String::as_str), Some("peer1"));
  }

  #[test]
  fn substitute_tokens_replaces_matching_placeholders() {
    let mut env = HashMap::new();
    env.insert("CCCC_ACTOR_ID".to_string(), "peer1".to_string());
    let args = vec![
      "agent".to_string(),
      "--name=$CCCC_ACTOR_ID".to_string(),
      "$UNKNOWN".to_string(),
    ];
    assert_eq!(
      substitute_tokens(&args, &env),
      vec!["agent", "--name=peer1", "$UNKNOWN"]
    );
  }

  #[test]
  fn runtime_command_resolves_from_config() {
    let cfg = Config::default();
    let spec = resolve_launch(&cfg, &ctx(), &actor("shell", None)).unwrap();
    assert_eq!(spec.command, vec!["sh".to_string()]);
    assert_eq!(spec.cwd, PathBuf::from("/work/project"));
    assert!(spec.env.iter().any(|(k, v)| k == "CCCC_GROUP_ID" && v == "g_1"));
  }

  #[test]
  fn actor_override_and_errors() {
    let cfg = Config::default();
    let spec = resolve_launch(
      &cfg,
      &ctx(),
      &actor("shell", Some(vec!["bash", "-c", "echo $CCCC_ACTOR_ID"])),
    )
    .unwrap();
    assert_eq!(spec.command, vec!["bash", "-c", "echo peer1"]);

    assert_eq!(
      resolve_launch(&cfg, &ctx(), &actor("nope", None)),
      Err(LaunchError::UnknownRuntime("nope".into()))
    );
    assert_eq!(
      resolve_launch(&cfg, &ctx(), &actor("shell", Some(vec![]))),
      Err(LaunchError::EmptyCommand("peer1".into()))
    );
  }

  #[test]
  fn headless_has_no_command_and_relative_cwd_joins_scope() {
    let cfg = Config::default();
    let mut a = actor("anything", None);
    a.runner = RunnerKind::Headless;
    a.cwd = Some("sub".into());
    let spec = resolve_launch(&cfg, &ctx(), &a).unwrap();
    assert!(spec.command.is_empty());
    assert_eq!(spec.cwd, PathBuf::from("/work/project/sub"));
  }
}
