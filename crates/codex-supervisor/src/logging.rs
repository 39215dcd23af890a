//! Logging setup for the supervisor's own `client.log`.

use crate::{SupervisorError, SupervisorResult, rotate_log};

use std::panic::Location;
use std::path::{Path, PathBuf};

use error_location::ErrorLocation;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, fmt, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

/// Setup logging with console output and `logs_dir/client_file`.
///
/// # Log Layers
/// - Console: Human-readable, colored output
/// - File: plain text, rotated once per launch (previous file gets a timestamp suffix)
///
/// `RUST_LOG` takes precedence over `level`.
pub fn setup_logging(logs_dir: &Path, client_file: &str, level: &str) -> SupervisorResult<PathBuf> {
    std::fs::create_dir_all(logs_dir).map_err(|e| SupervisorError::DataDirCreation {
        path: logs_dir.to_path_buf(),
        source: e,
        location: ErrorLocation::from(Location::caller()),
    })?;

    let log_path = logs_dir.join(client_file);
    rotate_log(&log_path)?;

    let (prefix, suffix) = split_file_name(client_file);
    let mut builder = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(prefix);
    if let Some(suffix) = suffix {
        builder = builder.filename_suffix(suffix);
    }
    let file_appender = builder
        .build(logs_dir)
        .map_err(|e| SupervisorError::logging(e.to_string()))?;

    // Console layer - human readable for development
    let console_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_ansi(true);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_ansi(false)
        .with_writer(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},codex_supervisor={level}")));

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| SupervisorError::logging(e.to_string()))?;

    Ok(log_path)
}

/// `client.log` -> ("client", Some("log")).
fn split_file_name(file_name: &str) -> (&str, Option<&str>) {
    match file_name.rsplit_once('.') {
        Some((prefix, suffix)) if !prefix.is_empty() && !suffix.is_empty() => {
            (prefix, Some(suffix))
        }
        _ => (file_name, None),
    }
}
