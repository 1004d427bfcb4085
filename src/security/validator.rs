// file: src/security/validator.rs
// version: 2.0.0
// guid: 93910215-bd99-4a56-bcd7-57cd706f08ea

//! Identifier validation
//!
//! Every externally-influenced string (the delegated account name, the
//! distribution id read from os-release, package names from configuration
//! and discovered binary paths) passes through this module before it is
//! placed into an argument vector that runs with elevated privileges.

use crate::error::{BootstrapError, Result};
use crate::utils::system::{AccountRecord, UserDirectory};
use regex::Regex;
use std::fmt;
use std::path::{Component, Path};
use std::sync::OnceLock;
use tracing::debug;

/// What an identifier is used for; selects the extra checks applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Account,
    Distro,
    Package,
    BinaryPath,
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IdentifierKind::Account => "account name",
            IdentifierKind::Distro => "distribution id",
            IdentifierKind::Package => "package name",
            IdentifierKind::BinaryPath => "binary path",
        };
        f.write_str(label)
    }
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("identifier pattern is valid"))
}

fn binary_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^/[A-Za-z0-9._/+-]+$").expect("binary path pattern is valid"))
}

/// Validate a bare identifier against the strict allow-list
pub fn validate_identifier(value: &str, kind: IdentifierKind) -> Result<()> {
    if value.is_empty() {
        return Err(BootstrapError::invalid(kind, value, "must not be empty"));
    }

    if value.contains("..") {
        return Err(BootstrapError::invalid(kind, value, "must not contain '..'"));
    }

    if value.contains('/') || value.contains('\\') {
        return Err(BootstrapError::invalid(
            kind,
            value,
            "must not contain a path separator",
        ));
    }

    if value.starts_with('.') || value.ends_with('.') {
        return Err(BootstrapError::invalid(
            kind,
            value,
            "must not start or end with '.'",
        ));
    }

    if !identifier_pattern().is_match(value) {
        return Err(BootstrapError::invalid(
            kind,
            value,
            "only letters, digits, '.', '_' and '-' are allowed",
        ));
    }

    Ok(())
}

/// Validate an account name and confirm it is a known system account
pub async fn validate_account(name: &str, users: &dyn UserDirectory) -> Result<AccountRecord> {
    validate_identifier(name, IdentifierKind::Account)?;

    match users.lookup(name).await? {
        Some(record) => {
            debug!("Account '{}' resolved (uid {})", name, record.uid);
            Ok(record)
        }
        None => Err(BootstrapError::invalid(
            IdentifierKind::Account,
            name,
            "no such system account",
        )),
    }
}

/// Validate every package name before it is joined into a command
pub fn validate_package_list(packages: &[String]) -> Result<()> {
    for package in packages {
        validate_identifier(package, IdentifierKind::Package)?;
    }
    Ok(())
}

/// Validate a discovered absolute path to an executable
pub fn validate_binary_path(path: &Path) -> Result<()> {
    let display = path.to_string_lossy();

    if !path.is_absolute() {
        return Err(BootstrapError::invalid(
            IdentifierKind::BinaryPath,
            display,
            "must be absolute",
        ));
    }

    if path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::CurDir))
    {
        return Err(BootstrapError::invalid(
            IdentifierKind::BinaryPath,
            display,
            "must not contain relative components",
        ));
    }

    if !binary_path_pattern().is_match(&display) {
        return Err(BootstrapError::invalid(
            IdentifierKind::BinaryPath,
            display,
            "contains characters outside the allow-list",
        ));
    }

    Ok(())
}
