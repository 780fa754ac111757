//! Logging setup: a daily-rolling log file plus stderr.
//!
//! The file receives everything `RUST_LOG` allows (default
//! `info,modsync=debug`). Stderr only shows warnings unless verbose output is
//! requested, so progress bars stay readable.

use std::fs;
use std::path::Path;

use time::format_description::well_known::Rfc3339;
use time::UtcOffset;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{ManagerError, ManagerResult};

pub use tracing_appender::non_blocking::WorkerGuard;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,modsync=debug";

/// Log file name prefix; files are named `modsync.<date>.log`.
pub const LOG_FILE_PREFIX: &str = "modsync";

/// Initialize logging to `log_dir` and stderr.
///
/// The returned guard flushes the file writer when dropped; keep it alive for
/// the life of the process.
pub fn init_logging(log_dir: &Path, verbose: bool) -> ManagerResult<WorkerGuard> {
    fs::create_dir_all(log_dir).map_err(|e| ManagerError::CreateDirFailed {
        path: log_dir.to_path_buf(),
        source: e,
    })?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(log_dir)
        .map_err(|e| {
            ManagerError::InvalidConfig(format!(
                "cannot open log file in {}: {}",
                log_dir.display(),
                e
            ))
        })?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_timer(local_timer())
        .with_filter(env_filter());

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_timer(local_timer())
        .with_filter(stderr_level(verbose));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| ManagerError::InvalidConfig(format!("logging already initialized: {}", e)))?;

    tracing::debug!(dir = %log_dir.display(), "logging initialized");
    Ok(guard)
}

/// Initialize stderr-only logging, for when the log directory is unusable.
pub fn init_logging_stderr(verbose: bool) {
    let filter = if verbose {
        env_filter()
    } else {
        EnvFilter::new("warn")
    };

    // Ignore the error: a subscriber is already installed, which is fine
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_timer(local_timer())
        .try_init();
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn stderr_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    }
}

/// Local RFC 3339 timestamps, falling back to UTC when the local offset
/// cannot be determined.
fn local_timer() -> OffsetTime<Rfc3339> {
    OffsetTime::local_rfc_3339().unwrap_or_else(|_| OffsetTime::new(UtcOffset::UTC, Rfc3339))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_level() {
        assert_eq!(stderr_level(false), LevelFilter::WARN);
        assert_eq!(stderr_level(true), LevelFilter::DEBUG);
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(DEFAULT_FILTER.parse::<EnvFilter>().is_ok());
    }
}
