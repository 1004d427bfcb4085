// file: src/installer/links.rs
// version: 1.0.0
// guid: 5d0f7a51-2b90-4d3c-8f3e-9c21e6a4b7d2

//! Root-link: share the real user's shell files with the super-user account
//!
//! On Linux a delegated run also links the user's configuration into the
//! root home, so `sudo -s` gets the same prompt. Sources are accepted only
//! when they resolve inside the real home and belong to the real user.

use crate::error::BootstrapError;
use crate::security::identity::Identity;
use crate::utils::system::OsFamily;
use std::fmt;
use std::fs;
use std::io;
use std::os::unix::fs::{symlink, MetadataExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Files linked from the real home into the root home
pub const LINKED_FILES: [&str; 3] = [".zshrc", ".p10k.zsh", ".nanorc"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked,
    AlreadyLinked,
    /// Dry-run: the link would have been created
    WouldLink,
    NotFound,
    WrongOwner,
    PathEscape,
    Failed(String),
}

impl LinkOutcome {
    /// Linked, already linked, or would be linked in dry-run
    pub fn satisfied(&self) -> bool {
        matches!(self, LinkOutcome::Linked | LinkOutcome::AlreadyLinked | LinkOutcome::WouldLink)
    }
}

impl fmt::Display for LinkOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkOutcome::Linked => write!(f, "linked"),
            LinkOutcome::AlreadyLinked => write!(f, "already linked"),
            LinkOutcome::WouldLink => write!(f, "would link"),
            LinkOutcome::NotFound => write!(f, "source not found"),
            LinkOutcome::WrongOwner => write!(f, "source not owned by the real user"),
            LinkOutcome::PathEscape => write!(f, "source resolves outside the home directory"),
            LinkOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRecord {
    pub name: String,
    pub source: PathBuf,
    pub target: PathBuf,
    pub outcome: LinkOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSummary {
    FullySatisfied,
    /// At least one source does not exist yet
    NeedsRetry,
    Partial,
}

impl LinkSummary {
    pub fn from_records(records: &[LinkRecord]) -> Self {
        if records.iter().all(|r| r.outcome.satisfied()) {
            LinkSummary::FullySatisfied
        } else if records.iter().any(|r| r.outcome == LinkOutcome::NotFound) {
            LinkSummary::NeedsRetry
        } else {
            LinkSummary::Partial
        }
    }
}

/// Why root-link does not apply to this run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotLinux,
    NotDelegated,
    NoRootHome,
    SameHome,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::NotLinux => "not a Linux host",
            SkipReason::NotDelegated => "run is not delegated",
            SkipReason::NoRootHome => "root home does not exist",
            SkipReason::SameHome => "real home is the root home",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootLinkResult {
    Skipped(SkipReason),
    Ran {
        records: Vec<LinkRecord>,
        summary: LinkSummary,
    },
}

impl RootLinkResult {
    /// Names whose source was missing
    pub fn missing(&self) -> Vec<String> {
        match self {
            RootLinkResult::Skipped(_) => Vec::new(),
            RootLinkResult::Ran { records, .. } => records
                .iter()
                .filter(|r| r.outcome == LinkOutcome::NotFound)
                .map(|r| r.name.clone())
                .collect(),
        }
    }
}

pub struct RootLinker<'a> {
    identity: &'a Identity,
    os: Option<OsFamily>,
    root_home: &'a Path,
    dry_run: bool,
}

impl<'a> RootLinker<'a> {
    pub fn new(identity: &'a Identity, os: Option<OsFamily>, root_home: &'a Path, dry_run: bool) -> Self {
        Self {
            identity,
            os,
            root_home,
            dry_run,
        }
    }

    /// `Some` when root-link does not apply
    pub fn skip_reason(&self) -> Option<SkipReason> {
        if self.os != Some(OsFamily::Linux) {
            return Some(SkipReason::NotLinux);
        }
        if !self.identity.delegated {
            return Some(SkipReason::NotDelegated);
        }
        if !self.root_home.is_dir() {
            return Some(SkipReason::NoRootHome);
        }
        if same_directory(&self.identity.real_home, self.root_home) {
            return Some(SkipReason::SameHome);
        }
        None
    }

    fn source(&self, name: &str) -> PathBuf {
        self.identity.real_home.join(name)
    }

    fn target(&self, name: &str) -> PathBuf {
        self.root_home.join(name)
    }

    fn is_linked(&self, name: &str) -> bool {
        fs::read_link(self.target(name))
            .map(|dest| dest == self.source(name))
            .unwrap_or(false)
    }

    /// Every link already points at its source
    pub fn all_in_place(&self) -> bool {
        LINKED_FILES.iter().all(|name| self.is_linked(name))
    }

    /// Names whose source is not yet a regular file
    pub fn missing_sources(&self) -> Vec<String> {
        LINKED_FILES
            .iter()
            .filter(|name| !self.source(name).is_file())
            .map(|name| name.to_string())
            .collect()
    }

    pub fn run(&self) -> RootLinkResult {
        if let Some(reason) = self.skip_reason() {
            info!("Skipping root links: {}", reason);
            return RootLinkResult::Skipped(reason);
        }

        let records: Vec<LinkRecord> = LINKED_FILES.iter().map(|name| self.link_one(name)).collect();
        let summary = LinkSummary::from_records(&records);
        debug!("Root link summary: {:?}", summary);
        RootLinkResult::Ran { records, summary }
    }

    fn link_one(&self, name: &str) -> LinkRecord {
        let source = self.source(name);
        let target = self.target(name);
        let outcome = self.evaluate(name, &source, &target);

        match &outcome {
            LinkOutcome::Linked => info!("Linked {} -> {}", target.display(), source.display()),
            LinkOutcome::NotFound => debug!("{} does not exist yet", source.display()),
            LinkOutcome::Failed(_) | LinkOutcome::WrongOwner => {
                warn!("Not linking {}: {}", target.display(), outcome)
            }
            _ => debug!("{}: {}", target.display(), outcome),
        }

        LinkRecord {
            name: name.to_string(),
            source,
            target,
            outcome,
        }
    }

    fn evaluate(&self, name: &str, source: &Path, target: &Path) -> LinkOutcome {
        let resolved = match fs::canonicalize(source) {
            Ok(path) => path,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return LinkOutcome::NotFound,
            Err(e) => return LinkOutcome::Failed(e.to_string()),
        };

        let home = fs::canonicalize(&self.identity.real_home).unwrap_or_else(|_| self.identity.real_home.clone());
        if !resolved.starts_with(&home) || resolved == home {
            warn!("{}", BootstrapError::PathEscape(resolved));
            return LinkOutcome::PathEscape;
        }

        let metadata = match fs::metadata(&resolved) {
            Ok(m) if m.is_file() => m,
            Ok(_) => return LinkOutcome::NotFound,
            Err(e) => return LinkOutcome::Failed(e.to_string()),
        };
        if metadata.uid() != self.identity.account.uid {
            return LinkOutcome::WrongOwner;
        }

        if self.is_linked(name) {
            return LinkOutcome::AlreadyLinked;
        }
        if self.dry_run {
            info!("[dry-run] would link {} -> {}", target.display(), source.display());
            return LinkOutcome::WouldLink;
        }

        match replace_symlink(source, target, name) {
            Ok(()) => LinkOutcome::Linked,
            Err(e) => LinkOutcome::Failed(e.to_string()),
        }
    }
}

fn same_directory(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Create `target -> source`, replacing whatever is at `target` in one rename
fn replace_symlink(source: &Path, target: &Path, name: &str) -> io::Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "link target has no parent"))?;
    let staging = parent.join(format!(".{}.link-{}", name.trim_start_matches('.'), std::process::id()));

    if fs::symlink_metadata(&staging).is_ok() {
        fs::remove_file(&staging)?;
    }
    symlink(source, &staging)?;

    if let Err(e) = fs::rename(&staging, target) {
        let _ = fs::remove_file(&staging);
        return Err(e);
    }
    Ok(())
}
