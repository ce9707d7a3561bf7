//! Logging infrastructure for ugh
//!
//! CLI commands log to `~/.local/state/ugh/ugh.log` following XDG standards.
//! The daemon logs JSON lines to its configured `log_file`, or text to
//! stderr (picked up by journald/launchd) when none is set.

use crate::config::{Config, DaemonConfig, LoggingConfig};
use crate::error::{Error, Result};
use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Initialize logging for CLI commands
///
/// Sets up tracing with:
/// - File output to XDG state directory
/// - Daily log rotation
/// - Configurable log level via config or RUST_LOG env var
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    let log_dir = Config::state_dir();

    // Create log directory if it doesn't exist
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "ugh.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to install log subscriber: {}", e)))?;

    tracing::debug!(
        log_dir = %log_dir.display(),
        level = %config.level,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Initialize logging for `daemon run`
///
/// With `log_file` set, writes one JSON object per line to that file (never
/// rotated here; the OS or service manager rotates it). Otherwise writes
/// plain text to stderr.
pub fn init_daemon(config: &DaemonConfig) -> Result<LoggingGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    let (writer, guard, json) = match config.log_file_path() {
        Some(path) => {
            let dir = path
                .parent()
                .map(PathBuf::from)
                .ok_or_else(|| Error::Config(format!("invalid log file {}", path.display())))?;
            let file_name = path
                .file_name()
                .ok_or_else(|| Error::Config(format!("invalid log file {}", path.display())))?;
            std::fs::create_dir_all(&dir)?;
            let appender = tracing_appender::rolling::never(&dir, file_name);
            let (w, g) = tracing_appender::non_blocking(appender);
            (w, g, true)
        }
        None => {
            let (w, g) = tracing_appender::non_blocking(std::io::stderr());
            (w, g, false)
        }
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_current_span(false)
                    .with_target(true),
            )
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(writer).with_ansi(false).with_target(false))
            .try_init()
    };
    installed.map_err(|e| Error::Config(format!("failed to install log subscriber: {}", e)))?;

    Ok(LoggingGuard { _guard: guard })
}

/// Initialize logging for tests (logs to stdout)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Guard that keeps the logging system alive
///
/// When dropped, flushes any pending log writes.
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Returns the CLI log file path
pub fn log_file_path() -> PathBuf {
    Config::log_path()
}
