// file: src/config/mod.rs
// version: 2.0.0
// guid: 0abb61b8-6a6d-42a3-85cb-b32fe09df89d

//! Configuration module for the bootstrap agent
//!
//! Every field has a default, so an empty (or absent) configuration file
//! yields the stock behaviour: install git, zsh, curl and wget, fetch the
//! published `.zshrc` and switch the login shell to zsh.

pub mod loader;

use crate::error::{BootstrapError, Result};
use crate::security::validator::validate_package_list;
use crate::utils::crypto::HashTool;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootstrapConfig {
    /// Packages installed through the detected package manager
    pub packages: Vec<String>,

    /// Login shell to activate (an executable name looked up on PATH)
    pub shell: String,

    /// Environment variable naming the delegated account
    pub delegate_env: String,

    /// Directory-name prefix for dotfile backups inside the home directory
    pub backup_prefix: String,

    /// File name of the resume marker inside the home directory
    pub resume_marker: String,

    /// Upper bound for any single package-manager or helper command
    pub command_timeout_secs: u64,

    pub remote: RemoteConfig,

    pub paths: PathsConfig,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            packages: ["git", "zsh", "curl", "wget"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
            shell: "zsh".to_string(),
            delegate_env: "SUDO_USER".to_string(),
            backup_prefix: ".shell-backup".to_string(),
            resume_marker: ".shell-bootstrap-resume".to_string(),
            command_timeout_secs: 900,
            remote: RemoteConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

/// Where the shell configuration is published and how it is fetched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteConfig {
    pub base_url: String,

    /// Remote file name; also the file name written into the home directory
    pub config_file: String,

    pub checksum_file: String,

    /// At least one of these must appear in a downloaded artifact
    pub content_markers: Vec<String>,

    /// SHA-256 tools in order of preference
    pub hash_tools: Vec<HashTool>,

    pub timeout_secs: u64,

    /// Attempts per transport
    pub retries: u32,

    pub retry_delay_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://raw.githubusercontent.com/jdfalk/dotfiles/main/zsh".to_string(),
            config_file: ".zshrc".to_string(),
            checksum_file: ".zshrc.sha256".to_string(),
            content_markers: ["zsh", "ZSH", "autoload", "setopt", "p10k"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            hash_tools: vec![HashTool::Native, HashTool::Sha256sum, HashTool::Shasum],
            timeout_secs: 30,
            retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl RemoteConfig {
    pub fn config_url(&self) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), self.config_file)
    }

    pub fn checksum_url(&self) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), self.checksum_file)
    }
}

/// System locations, overridable for tests and unusual hosts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Home directory of the super-user account
    pub root_home: PathBuf,

    /// Registry of permitted login shells
    pub shell_registry: PathBuf,

    pub os_release: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root_home: PathBuf::from("/root"),
            shell_registry: PathBuf::from("/etc/shells"),
            os_release: PathBuf::from("/etc/os-release"),
        }
    }
}

impl BootstrapConfig {
    /// Check the configuration for values that must never reach a command
    pub fn validate(&self) -> Result<()> {
        validate_package_list(&self.packages)?;

        if self.shell.is_empty() || self.shell.contains('/') {
            return Err(BootstrapError::config(format!(
                "shell must be a bare executable name, got '{}'",
                self.shell
            )));
        }

        let base = url::Url::parse(&self.remote.base_url)
            .map_err(|e| BootstrapError::config(format!("invalid remote.base_url: {}", e)))?;
        if base.scheme() != "https" {
            return Err(BootstrapError::config(format!(
                "remote.base_url must use https, got '{}'",
                base.scheme()
            )));
        }

        for name in [
            &self.remote.config_file,
            &self.remote.checksum_file,
            &self.resume_marker,
            &self.backup_prefix,
        ] {
            if name.is_empty() || name.contains('/') || name.contains("..") {
                return Err(BootstrapError::config(format!(
                    "'{}' must be a plain file name",
                    name
                )));
            }
        }

        if self.remote.content_markers.iter().all(|m| m.is_empty()) {
            return Err(BootstrapError::config(
                "remote.content_markers must contain at least one marker",
            ));
        }

        if self.remote.hash_tools.is_empty() {
            return Err(BootstrapError::config("remote.hash_tools must not be empty"));
        }

        if self.remote.retries == 0 {
            return Err(BootstrapError::config("remote.retries must be at least 1"));
        }

        if self.remote.timeout_secs == 0 || self.command_timeout_secs == 0 {
            return Err(BootstrapError::config("timeouts must be greater than zero"));
        }

        Ok(())
    }
}
