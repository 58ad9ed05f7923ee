use crate::config::LoggingConfig;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const LOG_FILE_NAME: &str = "kmpost.log";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Daily-rolling `kmpost.log` in `log_dir` plus a stderr copy.
pub fn init_file_and_stderr(log_dir: &Path, cfg: &LoggingConfig) -> anyhow::Result<()> {
  fs::create_dir_all(log_dir)?;
  let removed = remove_expired(log_dir, cfg.retention_days, SystemTime::now());

  let (file_writer, guard) =
    tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME));
  let _ = FILE_GUARD.set(guard);

  let filter = EnvFilter::try_new(&cfg.level).unwrap_or_else(|_| EnvFilter::new("info"));

  tracing_subscriber::registry()
    .with(filter)
    .with(
      tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer)
        .with_target(true),
    )
    .with(
      tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .with_target(false),
    )
    .try_init()?;

  if removed > 0 {
    tracing::debug!(removed, "expired log files removed");
  }
  Ok(())
}

/// Deletes rotated log files last modified before `now - retention_days`.
/// A retention of 0 keeps everything.
fn remove_expired(log_dir: &Path, retention_days: u64, now: SystemTime) -> usize {
  if retention_days == 0 {
    return 0;
  }
  let cutoff = now
    .checked_sub(Duration::from_secs(retention_days.saturating_mul(24 * 60 * 60)))
    .unwrap_or(SystemTime::UNIX_EPOCH);

  let Ok(entries) = fs::read_dir(log_dir) else {
    return 0;
  };

  let mut removed = 0;
  for entry in entries.flatten() {
    let path = entry.path();
    if !is_kmpost_log(&path) {
      continue;
    }
    let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
      continue;
    };
    if modified < cutoff && fs::remove_file(&path).is_ok() {
      removed += 1;
    }
  }
  removed
}

fn is_kmpost_log(path: &Path) -> bool {
  path
    .file_name()
    .and_then(|n| n.to_str())
    .map(|n| n == LOG_FILE_NAME || n.starts_with(&format!("{LOG_FILE_NAME}.")))
    .unwrap_or(false)
}
