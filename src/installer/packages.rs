// file: src/installer/packages.rs
// version: 2.1.0
// guid: de2a7e06-b63b-4d97-9708-fd6aca66a669

//! Platform detection and the package manager adapter

use crate::error::{BootstrapError, Result};
use crate::executor::{CommandRunner, CommandSpec};
use crate::security::validator::{validate_identifier, validate_package_list, IdentifierKind};
use crate::utils::system::{OsFamily, ToolLocator};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Supported package manager backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageManagerKind {
    Apt,
    Dnf,
    Yum,
    Pacman,
    Zypper,
    Brew,
}

impl PackageManagerKind {
    pub const ALL: [PackageManagerKind; 6] = [
        PackageManagerKind::Apt,
        PackageManagerKind::Dnf,
        PackageManagerKind::Yum,
        PackageManagerKind::Pacman,
        PackageManagerKind::Zypper,
        PackageManagerKind::Brew,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PackageManagerKind::Apt => "apt",
            PackageManagerKind::Dnf => "dnf",
            PackageManagerKind::Yum => "yum",
            PackageManagerKind::Pacman => "pacman",
            PackageManagerKind::Zypper => "zypper",
            PackageManagerKind::Brew => "brew",
        }
    }
}

impl fmt::Display for PackageManagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Abstract package operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageAction {
    Update,
    Install,
    Cleanup,
}

impl PackageAction {
    pub const ALL: [PackageAction; 3] = [
        PackageAction::Update,
        PackageAction::Install,
        PackageAction::Cleanup,
    ];
}

impl fmt::Display for PackageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PackageAction::Update => "update",
            PackageAction::Install => "install",
            PackageAction::Cleanup => "cleanup",
        })
    }
}

/// Host platform, resolved once per run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformProfile {
    pub os: OsFamily,
    pub distro: String,
    pub package_manager: PackageManagerKind,
    /// Absolute path of the manager binary, used instead of the bare name
    pub manager_path: Option<PathBuf>,
}

/// A fixed command; only `Install` receives the package list appended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTemplate {
    pub program: &'static str,
    pub args: &'static [&'static str],
    pub env: &'static [(&'static str, &'static str)],
}

const APT_ENV: &[(&str, &str)] = &[("DEBIAN_FRONTEND", "noninteractive")];

const fn template(
    program: &'static str,
    args: &'static [&'static str],
    env: &'static [(&'static str, &'static str)],
) -> CommandTemplate {
    CommandTemplate { program, args, env }
}

/// The `(action, manager)` dispatch table
pub fn command_template(action: PackageAction, manager: PackageManagerKind) -> CommandTemplate {
    use PackageAction::*;
    use PackageManagerKind::*;

    match (manager, action) {
        (Apt, Update) => template("apt-get", &["update"], APT_ENV),
        (Apt, Install) => template("apt-get", &["install", "-y"], APT_ENV),
        (Apt, Cleanup) => template("apt-get", &["autoremove", "-y"], APT_ENV),
        (Dnf, Update) => template("dnf", &["makecache", "-y"], &[]),
        (Dnf, Install) => template("dnf", &["install", "-y"], &[]),
        (Dnf, Cleanup) => template("dnf", &["autoremove", "-y"], &[]),
        (Yum, Update) => template("yum", &["makecache", "-y"], &[]),
        (Yum, Install) => template("yum", &["install", "-y"], &[]),
        (Yum, Cleanup) => template("yum", &["autoremove", "-y"], &[]),
        (Pacman, Update) => template("pacman", &["-Sy", "--noconfirm"], &[]),
        (Pacman, Install) => template("pacman", &["-S", "--needed", "--noconfirm"], &[]),
        (Pacman, Cleanup) => template("pacman", &["-Sc", "--noconfirm"], &[]),
        (Zypper, Update) => template("zypper", &["--non-interactive", "refresh"], &[]),
        (Zypper, Install) => template("zypper", &["--non-interactive", "install"], &[]),
        (Zypper, Cleanup) => template("zypper", &["--non-interactive", "clean", "--all"], &[]),
        (Brew, Update) => template("brew", &["update"], &[]),
        (Brew, Install) => template("brew", &["install"], &[]),
        (Brew, Cleanup) => template("brew", &["cleanup"], &[]),
    }
}

/// Parse `ID` and `ID_LIKE` from os-release content
pub fn parse_os_release(content: &str) -> (Option<String>, Vec<String>) {
    let mut id = None;
    let mut id_like = Vec::new();

    for line in content.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        match key {
            "ID" => id = Some(value.to_lowercase()),
            "ID_LIKE" => id_like = value.split_whitespace().map(|v| v.to_lowercase()).collect(),
            _ => {}
        }
    }

    (id, id_like)
}

fn linux_family(id: &str) -> Option<PackageManagerKind> {
    match id {
        "debian" | "ubuntu" | "linuxmint" | "pop" | "elementary" | "raspbian" | "kali" | "zorin" | "neon" => {
            Some(PackageManagerKind::Apt)
        }
        "fedora" | "rhel" | "centos" | "rocky" | "almalinux" | "ol" | "amzn" => Some(PackageManagerKind::Dnf),
        "arch" | "manjaro" | "endeavouros" | "garuda" | "artix" => Some(PackageManagerKind::Pacman),
        "opensuse" | "opensuse-leap" | "opensuse-tumbleweed" | "sles" | "suse" => Some(PackageManagerKind::Zypper),
        _ => None,
    }
}

const BREW_LOCATIONS: [&str; 2] = ["/opt/homebrew/bin/brew", "/usr/local/bin/brew"];

/// Resolve the platform profile for this host
pub async fn detect(os: Option<OsFamily>, os_release: &Path, tools: &dyn ToolLocator) -> Result<PlatformProfile> {
    match os {
        Some(OsFamily::Linux) => {
            let content = tokio::fs::read_to_string(os_release).await.map_err(|e| {
                BootstrapError::UnsupportedDistro(format!("cannot read {}: {}", os_release.display(), e))
            })?;
            detect_linux(&content, tools)
        }
        Some(OsFamily::MacOs) => {
            let locations: Vec<&Path> = BREW_LOCATIONS.iter().map(|p| Path::new(*p)).collect();
            detect_macos(tools, &locations)
        }
        None => Err(BootstrapError::UnsupportedDistro(format!(
            "operating system '{}' is not supported",
            std::env::consts::OS
        ))),
    }
}

/// Homebrew from `PATH`, else the first standard install location that exists
pub fn detect_macos(tools: &dyn ToolLocator, locations: &[&Path]) -> Result<PlatformProfile> {
    let brew = tools
        .locate("brew")
        .or_else(|| locations.iter().find(|p| p.is_file()).map(|p| p.to_path_buf()))
        .ok_or_else(|| BootstrapError::PackageManagerMissing("Homebrew (brew) is required on macOS".to_string()))?;

    debug!("Using Homebrew at {}", brew.display());
    Ok(PlatformProfile {
        os: OsFamily::MacOs,
        distro: "macos".to_string(),
        package_manager: PackageManagerKind::Brew,
        manager_path: Some(brew),
    })
}

/// Map os-release content to a Linux profile; unknown families fail closed
pub fn detect_linux(content: &str, tools: &dyn ToolLocator) -> Result<PlatformProfile> {
    let (id, id_like) = parse_os_release(content);
    let id = id.ok_or_else(|| BootstrapError::UnsupportedDistro("os-release has no ID".to_string()))?;
    validate_identifier(&id, IdentifierKind::Distro)?;

    let manager = std::iter::once(&id)
        .chain(id_like.iter())
        .find_map(|candidate| linux_family(candidate))
        .ok_or_else(|| BootstrapError::UnsupportedDistro(id.clone()))?;

    let manager = match manager {
        PackageManagerKind::Dnf if tools.locate("dnf").is_none() && tools.locate("yum").is_some() => {
            PackageManagerKind::Yum
        }
        other => other,
    };

    debug!("Distribution '{}' maps to {}", id, manager);
    Ok(PlatformProfile {
        os: OsFamily::Linux,
        distro: id,
        package_manager: manager,
        manager_path: None,
    })
}

/// Runs package operations for one platform profile
pub struct PackageAdapter<'a> {
    profile: &'a PlatformProfile,
    runner: &'a dyn CommandRunner,
    brew_user: Option<String>,
}

impl<'a> PackageAdapter<'a> {
    pub fn new(profile: &'a PlatformProfile, runner: &'a dyn CommandRunner) -> Self {
        Self {
            profile,
            runner,
            brew_user: None,
        }
    }

    /// Homebrew refuses to run as root; run it as this account instead
    pub fn with_brew_user(mut self, user: Option<&str>) -> Self {
        self.brew_user = user.map(str::to_string);
        self
    }

    /// Build the argument vector for `action`
    pub fn command(&self, action: PackageAction, packages: &[String]) -> Result<CommandSpec> {
        validate_package_list(packages)?;

        let template = command_template(action, self.profile.package_manager);
        let mut args: Vec<String> = template.args.iter().map(|a| a.to_string()).collect();
        if action == PackageAction::Install {
            args.extend(packages.iter().cloned());
        }

        let program = match &self.profile.manager_path {
            Some(path) => path.to_string_lossy().to_string(),
            None => template.program.to_string(),
        };

        let mut spec = match (&self.brew_user, self.profile.package_manager) {
            (Some(user), PackageManagerKind::Brew) => {
                validate_identifier(user, IdentifierKind::Account)?;
                CommandSpec::new("sudo")
                    .args(["-u", user.as_str(), "-H", program.as_str()])
                    .args(args)
            }
            _ => CommandSpec::new(program).args(args),
        };
        for (key, value) in template.env {
            spec = spec.env(*key, *value);
        }
        Ok(spec)
    }

    pub async fn run(&self, action: PackageAction, packages: &[String]) -> Result<()> {
        let spec = self.command(action, packages)?;
        info!("Package {} via {}", action, self.profile.package_manager);

        let output = self.runner.run(&spec).await.map_err(|e| self.failure(action, e.to_string()))?;
        if !output.success() {
            let detail = if output.stderr.trim().is_empty() {
                format!("exit code {:?}", output.exit_code)
            } else {
                format!("exit code {:?}: {}", output.exit_code, output.stderr.trim())
            };
            return Err(self.failure(action, detail));
        }
        Ok(())
    }

    fn failure(&self, action: PackageAction, detail: String) -> BootstrapError {
        BootstrapError::PackageOperationFailed {
            action: action.to_string(),
            manager: self.profile.package_manager.to_string(),
            detail,
        }
    }
}
