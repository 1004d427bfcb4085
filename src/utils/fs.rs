// file: src/utils/fs.rs
// version: 1.0.0
// guid: 3c8f5a21-6d94-4b7e-a0c2-9e1d7b4f6a58

//! Directory-handle file operations
//!
//! Everything here resolves names relative to an already-open directory
//! with `O_NOFOLLOW`, so a user who owns the directory cannot redirect a
//! privileged write by swapping an entry for a symlink.

use rustix::fd::OwnedFd;
use rustix::fs::{mkdirat, openat, readlinkat, unlinkat, AtFlags, Mode, OFlags, CWD};
use rustix::io::Errno;
use std::ffi::OsString;
use std::fs::File;
use std::io;
use std::os::unix::ffi::OsStringExt;
use std::path::{Path, PathBuf};

/// A directory entry opened without following symlinks
#[derive(Debug)]
pub enum Entry {
    File(File),
    Symlink(PathBuf),
}

/// Open `dir` itself, refusing a symlink in its final component
pub fn open_dir_nofollow(dir: &Path) -> io::Result<OwnedFd> {
    Ok(openat(
        CWD,
        dir,
        OFlags::RDONLY | OFlags::DIRECTORY | OFlags::CLOEXEC | OFlags::NOFOLLOW,
        Mode::empty(),
    )?)
}

/// Create a private (0700) directory named `name` inside `dir`
pub fn create_dir_at(dir: &OwnedFd, name: &str) -> io::Result<()> {
    Ok(mkdirat(dir, name, Mode::RWXU)?)
}

/// Open the subdirectory `name` of `dir`
pub fn open_subdir_at(dir: &OwnedFd, name: &str) -> io::Result<OwnedFd> {
    Ok(openat(
        dir,
        name,
        OFlags::RDONLY | OFlags::DIRECTORY | OFlags::CLOEXEC | OFlags::NOFOLLOW,
        Mode::empty(),
    )?)
}

/// Create a new private (0600) file; fails if anything already has the name
pub fn create_file_at(dir: &OwnedFd, name: &str) -> io::Result<File> {
    let fd = openat(
        dir,
        name,
        OFlags::WRONLY | OFlags::CREATE | OFlags::EXCL | OFlags::NOFOLLOW | OFlags::CLOEXEC,
        Mode::RUSR | Mode::WUSR,
    )?;
    Ok(File::from(fd))
}

/// Open `name` for reading, or read its link target when it is a symlink
///
/// Opens are non-blocking so a FIFO planted under the name cannot stall the run.
pub fn open_entry_at(dir: &OwnedFd, name: &str) -> io::Result<Entry> {
    match openat(
        dir,
        name,
        OFlags::RDONLY | OFlags::NOFOLLOW | OFlags::NONBLOCK | OFlags::CLOEXEC,
        Mode::empty(),
    ) {
        Ok(fd) => Ok(Entry::File(File::from(fd))),
        Err(e) if e == Errno::LOOP => {
            let target = readlinkat(dir, name, Vec::new())?;
            Ok(Entry::Symlink(PathBuf::from(OsString::from_vec(target.into_bytes()))))
        }
        Err(e) => Err(e.into()),
    }
}

/// Remove the file (or empty directory, when `is_dir`) `name` from `dir`
///
/// A name that is already gone is not an error.
pub fn remove_at(dir: &OwnedFd, name: &str, is_dir: bool) -> io::Result<()> {
    let flags = if is_dir { AtFlags::REMOVEDIR } else { AtFlags::empty() };
    match unlinkat(dir, name, flags) {
        Ok(()) => Ok(()),
        Err(e) if e == Errno::NOENT => Ok(()),
        Err(e) => Err(e.into()),
    }
}
