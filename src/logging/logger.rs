// file: src/logging/logger.rs
// version: 2.0.0
// guid: 2e7d9b40-5c1f-4a86-b3e2-71f0c8d4a695

//! Logger initialization and configuration

use crate::error::BootstrapError;
use crate::Result;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Instrument;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Default filter directive when `RUST_LOG` is unset
pub fn default_directive(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "info"
    }
}

fn filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(debug)))
}

/// Path of the log file for a run started now
pub fn log_file_path(log_dir: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    log_dir.join(format!("shell-bootstrap-{}.log", stamp))
}

fn open_log_file(log_dir: &Path) -> io::Result<(PathBuf, fs::File)> {
    fs::create_dir_all(log_dir)?;
    let path = log_file_path(log_dir);
    let file = fs::OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((path, file))
}

/// Initialize console logging on stderr plus a log file under `log_dir`
///
/// Returns the log file path, or `None` when the file could not be opened
/// and only the console layer is active.
pub fn init_logger(debug: bool, log_dir: Option<&Path>) -> Result<Option<PathBuf>> {
    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(io::stderr)
        .compact()
        .with_filter(filter(debug));

    let (file_layer, log_path, open_error) = match log_dir.map(open_log_file) {
        Some(Ok((path, file))) => {
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(filter(debug));
            (Some(layer), Some(path), None)
        }
        Some(Err(e)) => (None, None, Some(e)),
        None => (None, None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| BootstrapError::config(format!("Failed to initialize logger: {}", e)))?;

    if let Some(e) = open_error {
        tracing::warn!("Log file unavailable, logging to console only: {}", e);
    }
    if let Some(path) = &log_path {
        tracing::debug!("Logging to {}", path.display());
    }

    Ok(log_path)
}

/// Run `f` inside an `operation` span
pub async fn with_operation_span<F, Fut, R>(operation: &str, f: F) -> R
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = R>,
{
    let span = tracing::info_span!("operation", name = operation);
    async move { f().await }.instrument(span).await
}
