// file: src/reporter/mod.rs
// version: 2.1.0
// guid: 72285b8a-8351-4997-b36e-4d8a055e5bf4

//! Status reporting for bootstrap progress
//!
//! Components never print directly. They hand a level and a message to a
//! [`Reporter`]; the binary wires in [`TracingReporter`], which feeds the
//! console and log-file layers set up in [`crate::logging`]. A fatal error
//! is not reported here; the binary prints it once when the run ends.

use std::fmt;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Severity of a reported message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Success,
    Warning,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Success => "SUCCESS",
            Level::Warning => "WARNING",
        };
        f.write_str(label)
    }
}

/// Sink for user-facing progress messages
pub trait Reporter: Send + Sync {
    fn report(&self, level: Level, message: &str);

    fn info(&self, message: &str) {
        self.report(Level::Info, message);
    }

    fn success(&self, message: &str) {
        self.report(Level::Success, message);
    }

    fn warning(&self, message: &str) {
        self.report(Level::Warning, message);
    }
}

/// Forwards reports to `tracing`
#[derive(Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, level: Level, message: &str) {
        match level {
            Level::Debug => debug!("{}", message),
            Level::Info => info!("{}", message),
            Level::Success => info!(status = "success", "{}", message),
            Level::Warning => warn!("{}", message),
        }
    }
}

/// Keeps every report in memory
#[derive(Debug, Default)]
pub struct MemoryReporter {
    entries: Mutex<Vec<(Level, String)>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(Level, String)> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Whether any message at `level` contains `needle`
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.entries()
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, level: Level, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((level, message.to_string()));
        }
    }
}
