// file: src/steps/mod.rs
// version: 2.1.0
// guid: 4f6c1a2e-93b0-4d7f-8e5a-2b1c9d0e7f36

//! Per-step records collected for the final summary

use std::fmt;
use std::time::{Duration, Instant};

/// Status of a step execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Step completed successfully
    Completed,

    /// Step was skipped (not applicable, disabled or dry-run)
    Skipped,

    /// Step had a problem that did not stop the run
    Warning,

    /// Step failed and ended the run
    Failed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StepStatus::Completed => "completed",
            StepStatus::Skipped => "skipped",
            StepStatus::Warning => "warning",
            StepStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Result of executing a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub name: String,
    pub status: StepStatus,
    /// Human-readable message describing the result
    pub message: String,
    pub elapsed: Duration,
}

impl StepRecord {
    pub fn new(name: impl Into<String>, status: StepStatus, message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            name: name.into(),
            status,
            message: message.into(),
            elapsed,
        }
    }
}

/// Measures one step; finish it with a status to get its record
pub struct StepTimer {
    name: &'static str,
    started: Instant,
}

impl StepTimer {
    pub fn start(name: &'static str) -> Self {
        Self {
            name,
            started: Instant::now(),
        }
    }

    pub fn finish(self, status: StepStatus, message: impl Into<String>) -> StepRecord {
        StepRecord::new(self.name, status, message, self.started.elapsed())
    }

    pub fn completed(self, message: impl Into<String>) -> StepRecord {
        self.finish(StepStatus::Completed, message)
    }

    pub fn warning(self, message: impl Into<String>) -> StepRecord {
        self.finish(StepStatus::Warning, message)
    }

    pub fn failed(self, message: impl Into<String>) -> StepRecord {
        self.finish(StepStatus::Failed, message)
    }

    pub fn skipped(self, message: impl Into<String>) -> StepRecord {
        self.finish(StepStatus::Skipped, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_records_status() {
        let record = StepTimer::start("packages").warning("cleanup failed");
        assert_eq!(record.name, "packages");
        assert_eq!(record.status, StepStatus::Warning);
        assert_eq!(record.message, "cleanup failed");

        let skipped = StepTimer::start("backup").skipped("disabled by --no-backup");
        assert_eq!(skipped.status, StepStatus::Skipped);
        assert_eq!(skipped.status.to_string(), "skipped");
        assert!(skipped.elapsed < Duration::from_secs(5));
    }
}
