// file: src/installer/shell.rs
// version: 1.0.0
// guid: 8e4b2c1d-6f3a-4e59-a0b7-3d9c5e1f2a84

//! Login shell activation

use crate::error::{BootstrapError, Result};
use crate::executor::{run_checked, CommandRunner, CommandSpec};
use crate::security::identity::Identity;
use crate::security::validator::validate_binary_path;
use crate::utils::system::{OsFamily, SystemUtils, ToolLocator, UserDirectory};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Searched when the shell is not on `PATH`
pub const FALLBACK_DIRS: [&str; 4] = ["/bin", "/usr/bin", "/usr/local/bin", "/opt/homebrew/bin"];

/// What the shell change did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellChange {
    pub shell: PathBuf,
    /// The shell was appended to the registry during this run
    pub registered: bool,
    pub changed: Vec<String>,
    pub unchanged: Vec<String>,
}

/// Find the shell binary by name
pub fn resolve_shell(name: &str, tools: &dyn ToolLocator, fallback_dirs: &[PathBuf]) -> Result<PathBuf> {
    let path = tools
        .locate(name)
        .or_else(|| fallback_dirs.iter().map(|dir| dir.join(name)).find(|p| p.exists()))
        .ok_or_else(|| BootstrapError::ShellNotFound(name.to_string()))?;

    validate_binary_path(&path)?;
    if !SystemUtils::is_executable(&path) {
        return Err(BootstrapError::ShellNotExecutable(path));
    }
    Ok(path)
}

/// Whether `shell` is listed in the registry content
pub fn is_registered(content: &str, shell: &Path) -> bool {
    let wanted = shell.to_string_lossy();
    content
        .lines()
        .map(str::trim)
        .any(|line| !line.starts_with('#') && line == wanted)
}

/// Append `shell` to the registry unless listed; returns whether it was added
pub fn register_shell(registry: &Path, shell: &Path, dry_run: bool) -> Result<bool> {
    let content = match std::fs::read_to_string(registry) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    if is_registered(&content, shell) {
        debug!("{} already listed in {}", shell.display(), registry.display());
        return Ok(false);
    }

    if dry_run {
        info!("[dry-run] would add {} to {}", shell.display(), registry.display());
        return Ok(true);
    }

    let mut file = OpenOptions::new().create(true).append(true).open(registry)?;
    if !content.is_empty() && !content.ends_with('\n') {
        file.write_all(b"\n")?;
    }
    writeln!(file, "{}", shell.display())?;
    file.sync_all()?;

    info!("Added {} to {}", shell.display(), registry.display());
    Ok(true)
}

pub struct ShellChanger<'a> {
    users: &'a dyn UserDirectory,
    runner: &'a dyn CommandRunner,
    tools: &'a dyn ToolLocator,
    os: Option<OsFamily>,
    registry: &'a Path,
    fallback_dirs: Vec<PathBuf>,
}

impl<'a> ShellChanger<'a> {
    pub fn new(
        users: &'a dyn UserDirectory,
        runner: &'a dyn CommandRunner,
        tools: &'a dyn ToolLocator,
        os: Option<OsFamily>,
        registry: &'a Path,
    ) -> Self {
        Self {
            users,
            runner,
            tools,
            os,
            registry,
            fallback_dirs: FALLBACK_DIRS.iter().map(PathBuf::from).collect(),
        }
    }

    pub fn with_fallback_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.fallback_dirs = dirs;
        self
    }

    /// Make `shell_name` the login shell of the real user (and root on Linux)
    pub async fn apply(&self, identity: &Identity, shell_name: &str) -> Result<ShellChange> {
        let shell = resolve_shell(shell_name, self.tools, &self.fallback_dirs)?;
        let registered = register_shell(self.registry, &shell, self.runner.is_dry_run())?;

        let mut accounts = vec![identity.real_user.clone()];
        if self.os == Some(OsFamily::Linux) && identity.real_user != "root" {
            accounts.push("root".to_string());
        }

        let mut change = ShellChange {
            shell: shell.clone(),
            registered,
            changed: Vec::new(),
            unchanged: Vec::new(),
        };

        for account in accounts {
            let current = match self.users.lookup(&account).await? {
                Some(record) => record.shell,
                None if account == identity.real_user => identity.login_shell().to_string(),
                None => {
                    debug!("No '{}' account on this host, skipping", account);
                    continue;
                }
            };

            if Path::new(&current) == shell {
                debug!("Login shell of {} is already {}", account, shell.display());
                change.unchanged.push(account);
                continue;
            }

            let spec = CommandSpec::new("chsh")
                .arg("-s")
                .arg(shell.to_string_lossy())
                .arg(account.as_str());
            run_checked(self.runner, &spec).await?;
            info!("Login shell of {} changed from {} to {}", account, current, shell.display());
            change.changed.push(account);
        }

        Ok(change)
    }
}
