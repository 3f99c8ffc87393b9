use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::OnceLock;

use crate::config::LogLevel;
use tracing::{info, subscriber::set_global_default};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt};

static WORKER_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize structured JSON logging to the given `daemon.log.jsonl` path.
///
/// Subsequent calls are no-ops in practice: `set_global_default` rejects a second
/// subscriber and the error is ignored. A log file that cannot be opened leaves
/// logging disabled rather than failing the caller.
pub fn init(logs_path: &Path, level: LogLevel) {
  if let Some(parent) = logs_path.parent() {
    let _ = fs::create_dir_all(parent);
  }

  let file = match OpenOptions::new().create(true).append(true).open(logs_path) {
    Ok(file) => file,
    Err(err) => {
      eprintln!("cccc: cannot open log file {}: {err}", logs_path.display());
      return;
    }
  };

  // Non-blocking writer to avoid stalling on disk IO. Keep guard alive globally.
  let (nb_writer, guard) = tracing_appender::non_blocking(file);
  if WORKER_GUARD.set(guard).is_err() {
    return;
  }

  let filter = EnvFilter::new(match level {
    LogLevel::Off => "off",
    LogLevel::Warn => "warn",
    LogLevel::Info => "info",
    LogLevel::Debug => "debug",
    LogLevel::Trace => "trace",
  });

  let json_layer = fmt::layer()
    .with_timer(ChronoUtc::rfc_3339())
    .json()
    .with_current_span(true)
    .with_span_list(true)
    .with_level(true)
    .with_target(false)
    .with_thread_ids(false)
    .with_thread_names(false)
    .with_writer(move || nb_writer.clone());

  let subscriber = Registry::default().with(filter).with(json_layer);

  let _ = set_global_default(subscriber);

  info!(
    event = "logging_initialized",
    logs_path = %logs_path.display(),
    level = ?level,
    "logging initialized"
  );
}
