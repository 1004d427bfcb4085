// file: src/error.rs
// version: 3.0.0
// guid: 57b83a63-07b6-4534-aa6c-51e8797254e0

use crate::security::validator::IdentifierKind;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, BootstrapError>;

/// Error types for the bootstrap agent
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Administrative privileges are required (re-run with sudo)")]
    NotPrivileged,

    #[error("Invalid {kind} '{value}': {reason}")]
    InvalidIdentifier {
        kind: IdentifierKind,
        value: String,
        reason: String,
    },

    #[error("Cannot resolve home directory for '{user}': {reason}")]
    HomeUnresolvable { user: String, reason: String },

    #[error("Unsupported distribution: {0}")]
    UnsupportedDistro(String),

    #[error("Package manager not installed: {0}")]
    PackageManagerMissing(String),

    #[error("Package {action} failed via {manager}: {detail}")]
    PackageOperationFailed {
        action: String,
        manager: String,
        detail: String,
    },

    #[error("Download failed for {url}: {detail}")]
    DownloadFailed { url: String, detail: String },

    #[error("Checksum file is empty or unreadable: {0}")]
    ChecksumUnreadable(String),

    #[error("Checksum is not a 64-character hex digest: '{0}'")]
    ChecksumMalformed(String),

    #[error("No SHA-256 tool available")]
    NoHashTool,

    #[error("Integrity check failed: expected {expected}, computed {computed}")]
    IntegrityMismatch { expected: String, computed: String },

    #[error("Downloaded artifact is empty: {0}")]
    EmptyArtifact(String),

    #[error("Downloaded artifact failed content sanity check: {0}")]
    ContentSanityFailed(String),

    #[error("Path escapes its base directory: {0}")]
    PathEscape(PathBuf),

    #[error("Shell not found: {0}")]
    ShellNotFound(String),

    #[error("Shell is not executable: {0}")]
    ShellNotExecutable(PathBuf),

    #[error("Verification failed: {}", .0.join("; "))]
    VerificationFailed(Vec<String>),

    #[error("Another bootstrap run holds the lock on {0}")]
    AlreadyRunning(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Command '{command}' failed (exit code {exit_code:?}): {stderr}")]
    Process {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl BootstrapError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a new invalid identifier error
    pub fn invalid(kind: IdentifierKind, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            kind,
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a new home resolution error
    pub fn home(user: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::HomeUnresolvable {
            user: user.into(),
            reason: reason.into(),
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        1
    }
}
