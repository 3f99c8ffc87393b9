use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Log level for the daemon and CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
  Off,
  Warn,
  #[default]
  Info,
  Debug,
  Trace,
}

/// PTY delivery settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryConfig {
  /// Minimum seconds between two injections into the same actor's PTY
  pub min_interval_seconds: u64,
}

impl Default for DeliveryConfig {
  fn default() -> Self {
    Self {
      min_interval_seconds: 60,
    }
  }
}

/// Automation thresholds used as defaults for new groups. Zero disables a mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationConfig {
  pub nudge_after_seconds: u64,
  pub nudge_max_repeats: u32,
  pub actor_idle_timeout_seconds: u64,
  pub keepalive_delay_seconds: u64,
  pub silence_timeout_seconds: u64,
  /// Period of the safety-net sweep in milliseconds
  pub sweep_interval_ms: u64,
}

impl Default for AutomationConfig {
  fn default() -> Self {
    Self {
      nudge_after_seconds: 300,
      nudge_max_repeats: 3,
      actor_idle_timeout_seconds: 600,
      keepalive_delay_seconds: 120,
      silence_timeout_seconds: 600,
      sweep_interval_ms: 1000,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionsConfig {
  /// Whether the foreman may remove actors other than itself
  pub foreman_can_remove_others: bool,
}

impl Default for PermissionsConfig {
  fn default() -> Self {
    Self {
      foreman_can_remove_others: true,
    }
  }
}

/// Command used to launch an actor of a given runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub display_name: Option<String>,
  pub command: Vec<String>,
}

/// Effective configuration after merging defaults, global, and home config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
  pub log_level: LogLevel,
  /// Upper bound for a single control-surface request (defaults to 10)
  pub request_timeout_secs: u64,
  pub delivery: DeliveryConfig,
  pub automation: AutomationConfig,
  pub permissions: PermissionsConfig,
  /// Runtime command definitions resolved by the daemon when starting actors.
  pub runtimes: BTreeMap<String, RuntimeConfig>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      log_level: LogLevel::Info,
      request_timeout_secs: 10,
      delivery: DeliveryConfig::default(),
      automation: AutomationConfig::default(),
      permissions: PermissionsConfig::default(),
      runtimes: builtin_runtimes(),
    }
  }
}

impl Config {
  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs.max(1))
  }
}

fn builtin_runtimes() -> BTreeMap<String, RuntimeConfig> {
  let mut runtimes = BTreeMap::new();
  runtimes.insert(
    "claude".to_string(),
    RuntimeConfig {
      display_name: Some("Claude Code".to_string()),
      command: vec!["claude".to_string()],
    },
  );
  runtimes.insert(
    "codex".to_string(),
    RuntimeConfig {
      display_name: Some("Codex CLI".to_string()),
      command: vec!["codex".to_string()],
    },
  );
  runtimes.insert(
    "shell".to_string(),
    RuntimeConfig {
      display_name: Some("Shell".to_string()),
      command: vec!["sh".to_string()],
    },
  );
  runtimes
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
struct PartialDeliveryConfig {
  pub min_interval_seconds: Option<u64>,
}

impl PartialDeliveryConfig {
  fn merge_over(self, base: DeliveryConfig) -> DeliveryConfig {
    DeliveryConfig {
      min_interval_seconds: self.min_interval_seconds.unwrap_or(base.min_interval_seconds),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
struct PartialAutomationConfig {
  pub nudge_after_seconds: Option<u64>,
  pub nudge_max_repeats: Option<u32>,
  pub actor_idle_timeout_seconds: Option<u64>,
  pub keepalive_delay_seconds: Option<u64>,
  pub silence_timeout_seconds: Option<u64>,
  pub sweep_interval_ms: Option<u64>,
}

impl PartialAutomationConfig {
  fn merge_over(self, base: AutomationConfig) -> AutomationConfig {
    AutomationConfig {
      nudge_after_seconds: self.nudge_after_seconds.unwrap_or(base.nudge_after_seconds),
      nudge_max_repeats: self.nudge_max_repeats.unwrap_or(base.nudge_max_repeats),
      actor_idle_timeout_seconds: self
        .actor_idle_timeout_seconds
        .unwrap_or(base.actor_idle_timeout_seconds),
      keepalive_delay_seconds: self
        .keepalive_delay_seconds
        .unwrap_or(base.keepalive_delay_seconds),
      silence_timeout_seconds: self
        .silence_timeout_seconds
        .unwrap_or(base.silence_timeout_seconds),
      sweep_interval_ms: self.sweep_interval_ms.unwrap_or(base.sweep_interval_ms),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
struct PartialPermissionsConfig {
  pub foreman_can_remove_others: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
struct PartialConfig {
  pub log_level: Option<LogLevel>,
  pub request_timeout_secs: Option<u64>,
  pub delivery: Option<PartialDeliveryConfig>,
  pub automation: Option<PartialAutomationConfig>,
  pub permissions: Option<PartialPermissionsConfig>,
  pub runtimes: Option<BTreeMap<String, RuntimeConfig>>,
}

impl PartialConfig {
  fn merge_over(self, base: Config) -> Config {
    let PartialConfig {
      log_level,
      request_timeout_secs,
      delivery,
      automation,
      permissions,
      runtimes,
    } = self;

    let mut merged_runtimes = base.runtimes;
    if let Some(overrides) = runtimes {
      for (name, cfg) in overrides {
        merged_runtimes.insert(name, cfg);
      }
    }

    Config {
      log_level: log_level.unwrap_or(base.log_level),
      request_timeout_secs: request_timeout_secs.unwrap_or(base.request_timeout_secs),
      delivery: delivery.unwrap_or_default().merge_over(base.delivery),
      automation: automation.unwrap_or_default().merge_over(base.automation),
      permissions: PermissionsConfig {
        foreman_can_remove_others: permissions
          .and_then(|p| p.foreman_can_remove_others)
          .unwrap_or(base.permissions.foreman_can_remove_others),
      },
      runtimes: merged_runtimes,
    }
  }
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("io: {0}")]
  Io(#[from] std::io::Error),
  #[error("toml: {0}")]
  Toml(#[from] toml::de::Error),
  #[error("unsupported platform: no home directory available")]
  UnsupportedPlatform,
  #[error("runtime `{runtime}` must have a non-empty command")]
  InvalidRuntimeDefinition { runtime: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Location of the global config file (~/.config/cccc/config.toml)
pub fn global_config_path() -> Option<PathBuf> {
  dirs::config_dir().map(|p| p.join("cccc").join("config.toml"))
}

/// Location of the per-home config file (<home>/config.toml)
pub fn home_config_path(home: &Path) -> PathBuf {
  home.join("config.toml")
}

/// Resolve the collaboration home from CCCC_HOME, falling back to ~/.cccc
pub fn resolve_home() -> Result<PathBuf> {
  if let Some(val) = env::var_os("CCCC_HOME") {
    return Ok(PathBuf::from(val));
  }
  dirs::home_dir()
    .map(|h| h.join(".cccc"))
    .ok_or(ConfigError::UnsupportedPlatform)
}

/// Resolve the socket path using CCCC_SOCKET or `<home>/daemon/ccccd.sock`.
pub fn resolve_socket_path(home: &Path) -> PathBuf {
  match env::var_os("CCCC_SOCKET") {
    Some(val) => PathBuf::from(val),
    None => home.join("daemon").join("ccccd.sock"),
  }
}

/// Load configuration by resolving the default global and home paths.
/// Home config overrides global; both override defaults.
pub fn load(home: Option<&Path>) -> Result<Config> {
  let home_path = home.map(home_config_path);
  load_from_paths(global_config_path().as_deref(), home_path.as_deref())
}

/// Load configuration from explicit file paths (if present).
pub fn load_from_paths(global: Option<&Path>, home: Option<&Path>) -> Result<Config> {
  let mut cfg = Config::default();

  for path in [global, home].into_iter().flatten() {
    if let Ok(s) = fs::read_to_string(path) {
      let partial: PartialConfig = toml::from_str(&s)?;
      cfg = partial.merge_over(cfg);
    }
  }

  validate_runtimes(&cfg)?;

  Ok(cfg)
}

fn validate_runtimes(cfg: &Config) -> Result<()> {
  for (name, runtime) in &cfg.runtimes {
    if runtime.command.is_empty() || runtime.command[0].trim().is_empty() {
      return Err(ConfigError::InvalidRuntimeDefinition {
        runtime: name.to_string(),
      });
    }
  }
  Ok(())
}
