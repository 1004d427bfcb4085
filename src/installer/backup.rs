// file: src/installer/backup.rs
// version: 1.1.0
// guid: 1b95bf33-84c9-47a4-ae60-8c450c4383fd

//! Dotfile backup
//!
//! Runs before anything in the home directory is replaced. Failures are
//! reported and swallowed by the caller; the original files are untouched
//! at this point, so a failed backup never blocks installation.

use crate::security::identity::Identity;
use crate::utils::fs::{self, Entry};
use crate::utils::system::SystemUtils;
use crate::Result;
use chrono::{DateTime, Local};
use flate2::write::GzEncoder;
use flate2::Compression;
use rustix::fd::OwnedFd;
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Legacy shell startup files considered for backup
pub const LEGACY_DOTFILES: [&str; 7] = [
    ".bashrc",
    ".bash_profile",
    ".bash_login",
    ".profile",
    ".zshrc",
    ".zprofile",
    ".zshenv",
];

pub const ARCHIVE_NAME: &str = "dotfiles.tar.gz";

/// A backup written during this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArchive {
    pub path: PathBuf,
    pub created_at: DateTime<Local>,
    pub contained_files: BTreeSet<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    Created(BackupArchive),
    NothingToBackup,
    /// Dry-run: these files would have been archived
    WouldArchive(Vec<String>),
    /// Downgraded failure; the message says what went wrong
    Failed(String),
}

/// Dotfiles from the allow-list that currently exist in `home`
pub fn present_dotfiles(home: &Path) -> Vec<&'static str> {
    LEGACY_DOTFILES
        .iter()
        .copied()
        .filter(|name| {
            std::fs::symlink_metadata(home.join(name))
                .map(|m| m.is_file() || m.file_type().is_symlink())
                .unwrap_or(false)
        })
        .collect()
}

/// Archive the legacy dotfiles of the real user
pub fn backup_dotfiles(identity: &Identity, prefix: &str, dry_run: bool) -> BackupOutcome {
    let home = &identity.real_home;
    let present = present_dotfiles(home);

    if present.is_empty() {
        info!("No existing dotfiles in {}, skipping backup", home.display());
        return BackupOutcome::NothingToBackup;
    }

    if dry_run {
        return BackupOutcome::WouldArchive(present.iter().map(|s| s.to_string()).collect());
    }

    let home_dir = match fs::open_dir_nofollow(home) {
        Ok(dir) => dir,
        Err(e) => {
            warn!("Could not open {}: {}", home.display(), e);
            return BackupOutcome::Failed(format!("cannot open home directory: {}", e));
        }
    };

    let now = Local::now();
    let name = match create_unique_dir(&home_dir, prefix, &now) {
        Ok(name) => name,
        Err(e) => {
            warn!("Could not create backup directory in {}: {}", home.display(), e);
            return BackupOutcome::Failed(format!("cannot create backup directory: {}", e));
        }
    };

    match write_archive(identity, &home_dir, &name, &present) {
        Ok(archived) => {
            let path = home.join(&name).join(ARCHIVE_NAME);
            info!("Backed up {} dotfile(s) to {}", archived.len(), path.display());
            BackupOutcome::Created(BackupArchive {
                path,
                created_at: now,
                contained_files: archived,
            })
        }
        Err(e) => {
            warn!("Dotfile backup failed: {}", e);
            remove_partial(&home_dir, &name);
            BackupOutcome::Failed(e.to_string())
        }
    }
}

/// Create `<prefix>-<stamp>[-N]` inside the home and return its name
fn create_unique_dir(home_dir: &OwnedFd, prefix: &str, now: &DateTime<Local>) -> io::Result<String> {
    let base = format!("{}-{}", prefix, now.format("%Y%m%d_%H%M%S"));

    for attempt in 0..100 {
        let name = if attempt == 0 {
            base.clone()
        } else {
            format!("{}-{}", base, attempt)
        };
        match fs::create_dir_at(home_dir, &name) {
            Ok(()) => return Ok(name),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free backup directory name for {}", base),
    ))
}

fn write_archive(identity: &Identity, home_dir: &OwnedFd, name: &str, names: &[&str]) -> Result<BTreeSet<PathBuf>> {
    let dir = fs::open_subdir_at(home_dir, name)?;
    let file = fs::create_file_at(&dir, ARCHIVE_NAME)?;
    let mut archived = BTreeSet::new();

    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    for dotfile in names {
        match fs::open_entry_at(home_dir, dotfile)? {
            Entry::File(mut source) => {
                let meta = source.metadata()?;
                if !meta.is_file() {
                    warn!("Skipping {}: not a regular file", dotfile);
                    continue;
                }
                let mut header = tar::Header::new_gnu();
                header.set_metadata(&meta);
                builder.append_data(&mut header, dotfile, &mut source)?;
            }
            Entry::Symlink(target) => {
                let mut header = tar::Header::new_gnu();
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_size(0);
                header.set_mode(0o777);
                builder.append_link(&mut header, dotfile, &target)?;
            }
        }
        archived.insert(PathBuf::from(dotfile));
    }
    let file = builder.into_inner()?.finish()?;
    file.sync_all()?;

    if identity.delegated {
        SystemUtils::set_owner(&file, &identity.account)?;
        SystemUtils::set_owner(&dir, &identity.account)?;
    }

    Ok(archived)
}

fn remove_partial(home_dir: &OwnedFd, name: &str) {
    let removed = fs::open_subdir_at(home_dir, name)
        .and_then(|dir| fs::remove_at(&dir, ARCHIVE_NAME, false))
        .and_then(|()| fs::remove_at(home_dir, name, true));
    if let Err(e) = removed {
        debug!("Could not remove partial backup {}: {}", name, e);
    }
}
