// file: src/installer/resume.rs
// version: 1.1.0
// guid: c3a9e0f4-71d2-4b8e-9a56-0f2d8b7c4e13

//! Two-phase resume
//!
//! Some linked files (`.p10k.zsh`) only exist after the user has run an
//! interactive step in the new shell. A marker in the real home carries the
//! run over to the next invocation, which then only finishes the links.

use crate::error::Result;
use crate::installer::links::{LinkSummary, RootLinker};
use crate::utils::system::{AccountRecord, SystemUtils};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum ResumeState {
    /// No marker
    Fresh,
    AwaitingResume {
        missing: Vec<String>,
        recorded_at: DateTime<Utc>,
    },
    /// Nothing left to do; the marker is removed
    Complete,
}

impl ResumeState {
    pub fn awaiting(missing: Vec<String>) -> Self {
        ResumeState::AwaitingResume {
            missing,
            recorded_at: Utc::now(),
        }
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self, ResumeState::AwaitingResume { .. })
    }

    /// State after the root links of a full run
    pub fn after_full_run(summary: LinkSummary, missing: Vec<String>) -> Self {
        match summary {
            LinkSummary::NeedsRetry => Self::awaiting(missing),
            LinkSummary::FullySatisfied | LinkSummary::Partial => ResumeState::Complete,
        }
    }

    /// State after the root links were re-run by a resumed invocation
    pub fn after_resumed_links(summary: LinkSummary, missing: Vec<String>) -> Self {
        match summary {
            LinkSummary::FullySatisfied => ResumeState::Complete,
            LinkSummary::NeedsRetry | LinkSummary::Partial => Self::awaiting(missing),
        }
    }
}

/// What a resumed invocation finds on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeClass {
    /// Links in place or no longer applicable
    Complete,
    StillMissingSources(Vec<String>),
    SourcesNowPresent,
}

pub fn classify(linker: &RootLinker<'_>) -> ResumeClass {
    if let Some(reason) = linker.skip_reason() {
        debug!("Root links no longer apply: {}", reason);
        return ResumeClass::Complete;
    }
    if linker.all_in_place() {
        return ResumeClass::Complete;
    }

    let missing = linker.missing_sources();
    if missing.is_empty() {
        ResumeClass::SourcesNowPresent
    } else {
        ResumeClass::StillMissingSources(missing)
    }
}

/// The marker file in the real home
#[derive(Debug, Clone)]
pub struct ResumeMarker {
    path: PathBuf,
}

impl ResumeMarker {
    pub fn new(home: &Path, name: &str) -> Self {
        Self { path: home.join(name) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current state; an unreadable marker still means a resume is pending
    pub fn load(&self) -> Result<ResumeState> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ResumeState::Fresh),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => String::new(),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<ResumeState>(&content) {
            Ok(state @ ResumeState::AwaitingResume { .. }) => Ok(state),
            Ok(other) => {
                warn!("Resume marker {} holds {:?}, treating it as pending", self.path.display(), other);
                Ok(ResumeState::awaiting(Vec::new()))
            }
            Err(e) => {
                warn!("Resume marker {} is unreadable ({}), treating it as pending", self.path.display(), e);
                Ok(ResumeState::awaiting(Vec::new()))
            }
        }
    }

    /// Persist `state`: awaiting writes the marker, anything else removes it
    pub fn store(&self, state: &ResumeState, owner: Option<&AccountRecord>) -> Result<()> {
        if !state.is_awaiting() {
            if self.clear()? {
                info!("Removed resume marker {}", self.path.display());
            }
            return Ok(());
        }

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut staging = tempfile::Builder::new().prefix(".shell-bootstrap-marker-").tempfile_in(dir)?;
        serde_json::to_writer_pretty(staging.as_file_mut(), state)?;
        staging.as_file_mut().write_all(b"\n")?;
        if let Some(owner) = owner {
            SystemUtils::set_owner(staging.as_file(), owner)?;
        }
        staging.persist(&self.path).map_err(|e| e.error)?;

        info!("Recorded resume marker {}", self.path.display());
        Ok(())
    }

    /// Remove the marker; returns whether one existed
    pub fn clear(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
