// file: src/utils/system.rs
// version: 2.1.0
// guid: e78a1011-d2b7-4745-8da9-385629066f14

//! System utility functions: account lookup, tool discovery, ownership

use crate::executor::{CommandRunner, CommandSpec, LocalRunner};
use crate::Result;
use std::os::fd::AsFd;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Supported operating system families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Linux,
    MacOs,
}

impl OsFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            OsFamily::Linux => "linux",
            OsFamily::MacOs => "macos",
        }
    }
}

/// A resolved system account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
    pub shell: String,
}

/// Account database lookups
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    /// Effective uid of this process
    fn effective_uid(&self) -> u32;

    /// Look an account up by name
    async fn lookup(&self, name: &str) -> Result<Option<AccountRecord>>;

    /// Look an account up by numeric uid
    async fn lookup_uid(&self, uid: u32) -> Result<Option<AccountRecord>>;
}

/// Resolves executable names to absolute paths
pub trait ToolLocator: Send + Sync {
    fn locate(&self, name: &str) -> Option<PathBuf>;
}

/// [`ToolLocator`] backed by a `PATH` search
#[derive(Debug, Default)]
pub struct WhichLocator;

impl ToolLocator for WhichLocator {
    fn locate(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }
}

/// [`UserDirectory`] backed by the host account database
///
/// Linux queries `getent passwd` and falls back to reading `/etc/passwd`;
/// macOS reads Directory Services through `dscl`.
pub struct SystemUserDirectory {
    os: OsFamily,
    runner: LocalRunner,
    passwd_path: PathBuf,
}

impl SystemUserDirectory {
    pub fn new(os: OsFamily) -> Self {
        Self {
            os,
            runner: LocalRunner::new(Duration::from_secs(30)),
            passwd_path: PathBuf::from("/etc/passwd"),
        }
    }

    async fn lookup_linux(&self, key: &str) -> Result<Option<AccountRecord>> {
        let output = self
            .runner
            .run(&CommandSpec::new("getent").args(["passwd", key]))
            .await;

        match output {
            Ok(output) if output.success() => Ok(output.stdout.lines().find_map(parse_passwd_line)),
            // exit 2 means "key not found"; anything else falls back to the file
            Ok(output) if output.exit_code == Some(2) => Ok(None),
            _ => {
                debug!("getent unavailable, reading {}", self.passwd_path.display());
                let content = tokio::fs::read_to_string(&self.passwd_path).await?;
                Ok(content
                    .lines()
                    .filter_map(parse_passwd_line)
                    .find(|r| r.name == key || r.uid.to_string() == key))
            }
        }
    }

    async fn lookup_macos(&self, name: &str) -> Result<Option<AccountRecord>> {
        let record_path = format!("/Users/{}", name);
        let output = self
            .runner
            .run(&CommandSpec::new("dscl").args([
                ".",
                "-read",
                record_path.as_str(),
                "NFSHomeDirectory",
                "UserShell",
                "UniqueID",
                "PrimaryGroupID",
            ]))
            .await?;

        if !output.success() {
            return Ok(None);
        }
        Ok(parse_dscl_record(name, &output.stdout))
    }
}

#[async_trait::async_trait]
impl UserDirectory for SystemUserDirectory {
    fn effective_uid(&self) -> u32 {
        // SAFETY: geteuid has no preconditions and cannot fail
        unsafe { libc::geteuid() }
    }

    async fn lookup(&self, name: &str) -> Result<Option<AccountRecord>> {
        match self.os {
            OsFamily::Linux => self.lookup_linux(name).await,
            OsFamily::MacOs => self.lookup_macos(name).await,
        }
    }

    async fn lookup_uid(&self, uid: u32) -> Result<Option<AccountRecord>> {
        match self.os {
            OsFamily::Linux => self.lookup_linux(&uid.to_string()).await,
            OsFamily::MacOs => {
                let output = self
                    .runner
                    .run(&CommandSpec::new("id").arg("-nu").arg(uid.to_string()))
                    .await?;
                let name = output.stdout.trim();
                if !output.success() || name.is_empty() {
                    return Ok(None);
                }
                self.lookup_macos(name).await
            }
        }
    }
}

/// Parse one `name:password:uid:gid:gecos:home:shell` line
pub fn parse_passwd_line(line: &str) -> Option<AccountRecord> {
    let parts: Vec<&str> = line.trim().split(':').collect();
    if parts.len() < 7 || parts[0].is_empty() {
        return None;
    }

    Some(AccountRecord {
        name: parts[0].to_string(),
        uid: parts[2].parse().ok()?,
        gid: parts[3].parse().ok()?,
        home: PathBuf::from(parts[5]),
        shell: parts[6].to_string(),
    })
}

/// Parse `dscl . -read` output; values may wrap onto the following line
pub fn parse_dscl_record(name: &str, output: &str) -> Option<AccountRecord> {
    let mut home = None;
    let mut shell = String::new();
    let mut uid = None;
    let mut gid = None;
    let mut pending: Option<&str> = None;

    for line in output.lines() {
        let (key, value) = match pending.take() {
            Some(key) if line.starts_with(' ') => (key, line.trim()),
            _ => match line.split_once(':') {
                Some((key, value)) if value.trim().is_empty() => {
                    pending = Some(key.trim());
                    continue;
                }
                Some((key, value)) => (key.trim(), value.trim()),
                None => continue,
            },
        };

        match key {
            "NFSHomeDirectory" => home = Some(PathBuf::from(value)),
            "UserShell" => shell = value.to_string(),
            "UniqueID" => uid = value.parse().ok(),
            "PrimaryGroupID" => gid = value.parse().ok(),
            _ => {}
        }
    }

    Some(AccountRecord {
        name: name.to_string(),
        uid: uid?,
        gid: gid?,
        home: home?,
        shell,
    })
}

/// System utility functions
pub struct SystemUtils;

impl SystemUtils {
    /// Operating system family of this build
    pub fn current_os() -> Option<OsFamily> {
        match std::env::consts::OS {
            "linux" => Some(OsFamily::Linux),
            "macos" => Some(OsFamily::MacOs),
            _ => None,
        }
    }

    /// Whether any execute bit is set on a regular file
    pub fn is_executable(path: &Path) -> bool {
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    /// Hand an open file or directory over to `account`
    ///
    /// Works on the handle, never a path, so the entry cannot be swapped in between.
    pub fn set_owner(handle: impl AsFd, account: &AccountRecord) -> Result<()> {
        std::os::unix::fs::fchown(handle, Some(account.uid), Some(account.gid))?;
        debug!("Ownership handed to {}", account.name);
        Ok(())
    }
}
