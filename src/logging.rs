//! Logging to stderr plus a daily-rolling file in the data directory.

use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Environment variable holding the log filter (e.g. "offline_sync=debug")
pub const LOG_ENV: &str = "OFFLINE_SYNC_LOG";

/// Initialize logging. Keep the returned guard alive until exit so the
/// file writer is flushed.
pub fn init(log_dir: &Path, verbose: bool) -> Result<WorkerGuard> {
  std::fs::create_dir_all(log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let default_level = if verbose { "debug" } else { "info" };
  let filter = || EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

  let file_appender = tracing_appender::rolling::daily(log_dir, "offline-sync.log");
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

  tracing_subscriber::registry()
    .with(
      fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter()),
    )
    .with(
      fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_filter(filter()),
    )
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}
