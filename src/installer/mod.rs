// file: src/installer/mod.rs
// version: 2.1.0
// guid: 7b2e4d90-1a6c-4f38-9e05-d3c8a1f6b247

//! Installation orchestrator
//!
//! A full run goes identity → lock → packages → backup → fetch → root links
//! → login shell → verification → package cleanup. When a resume marker is
//! present only the root links are revisited.

pub mod backup;
pub mod links;
pub mod packages;
pub mod resume;
pub mod shell;

use crate::config::BootstrapConfig;
use crate::error::{BootstrapError, Result};
use crate::executor::CommandRunner;
use crate::logging::with_operation_span;
use crate::network::download::Transport;
use crate::network::fetch::TrustedFetch;
use crate::reporter::Reporter;
use crate::security::identity::{resolve_identity, Identity};
use crate::steps::{StepRecord, StepTimer};
use crate::utils::system::{OsFamily, ToolLocator, UserDirectory};
use backup::BackupOutcome;
use fs2::FileExt;
use links::{LinkSummary, RootLinkResult, RootLinker};
use packages::{PackageAction, PackageAdapter, PlatformProfile};
use resume::{ResumeClass, ResumeMarker, ResumeState};
use shell::{resolve_shell, ShellChanger, FALLBACK_DIRS};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Collaborators of a run
#[derive(Clone)]
pub struct Host {
    pub users: Arc<dyn UserDirectory>,
    /// Runs mutating commands; a dry-run runner only reports them
    pub runner: Arc<dyn CommandRunner>,
    /// Runs read-only helpers, executed even in dry-run
    pub query_runner: Arc<dyn CommandRunner>,
    pub tools: Arc<dyn ToolLocator>,
    pub transports: Vec<Arc<dyn Transport>>,
    pub reporter: Arc<dyn Reporter>,
    pub os: Option<OsFamily>,
    /// Raw value of the delegation variable
    pub delegate: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallOptions {
    pub dry_run: bool,
    pub no_backup: bool,
    pub no_shell: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Full,
    Resume,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub phase: Phase,
    pub real_user: String,
    pub real_home: PathBuf,
    pub steps: Vec<StepRecord>,
    /// Resume state left behind by this run
    pub resume: ResumeState,
}

/// Main installer orchestrator
pub struct Installer {
    config: BootstrapConfig,
    host: Host,
    options: InstallOptions,
    steps: Mutex<Vec<StepRecord>>,
}

impl Installer {
    pub fn new(config: BootstrapConfig, host: Host, options: InstallOptions) -> Self {
        Self {
            config,
            host,
            options,
            steps: Mutex::new(Vec::new()),
        }
    }

    /// Steps recorded so far, including the one that failed
    pub fn steps(&self) -> Vec<StepRecord> {
        self.steps.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn record(&self, record: StepRecord) {
        debug!("Step {} {}: {}", record.name, record.status, record.message);
        if let Ok(mut steps) = self.steps.lock() {
            steps.push(record);
        }
    }

    fn fail(&self, timer: StepTimer, err: BootstrapError) -> BootstrapError {
        self.record(timer.failed(err.to_string()));
        err
    }

    fn reporter(&self) -> &dyn Reporter {
        self.host.reporter.as_ref()
    }

    /// Execute the run
    pub async fn run(&self) -> Result<InstallReport> {
        let timer = StepTimer::start("identity");
        let identity = match self.resolve().await {
            Ok(identity) => identity,
            Err(e) => return Err(self.fail(timer, e)),
        };
        self.record(timer.completed(format!(
            "acting as {} for {} ({})",
            identity.acting_user,
            identity.real_user,
            identity.real_home.display()
        )));

        let timer = StepTimer::start("lock");
        let _lock = match acquire_lock(&identity.real_home) {
            Ok(lock) => lock,
            Err(e) => return Err(self.fail(timer, e)),
        };
        self.record(timer.completed(format!("locked {}", identity.real_home.display())));

        let marker = ResumeMarker::new(&identity.real_home, &self.config.resume_marker);
        let state = marker.load()?;

        let (phase, resume) = if state.is_awaiting() {
            self.reporter().info("Resuming a previous run: finishing root links");
            (Phase::Resume, self.run_resume(&identity, &marker).await?)
        } else {
            (Phase::Full, self.run_full(&identity, &marker).await?)
        };

        Ok(InstallReport {
            phase,
            real_user: identity.real_user.clone(),
            real_home: identity.real_home.clone(),
            steps: self.steps(),
            resume,
        })
    }

    async fn resolve(&self) -> Result<Identity> {
        self.config.validate()?;
        resolve_identity(self.host.users.as_ref(), self.host.delegate.as_deref()).await
    }

    async fn run_full(&self, identity: &Identity, marker: &ResumeMarker) -> Result<ResumeState> {
        let profile = self.detect_platform().await?;
        let adapter = PackageAdapter::new(&profile, self.host.runner.as_ref())
            .with_brew_user(identity.delegated.then_some(identity.real_user.as_str()));

        self.package_step(&adapter, PackageAction::Update, "update").await?;
        self.package_step(&adapter, PackageAction::Install, "install").await?;

        self.backup_step(identity);
        self.fetch_step(identity).await?;

        let links = self.linker(identity).run();
        let state = match &links {
            RootLinkResult::Skipped(_) => ResumeState::Complete,
            RootLinkResult::Ran { summary, .. } => ResumeState::after_full_run(*summary, links.missing()),
        };
        self.record_links(&links);

        self.shell_step(identity).await;
        self.verify_step(identity)?;
        self.package_step(&adapter, PackageAction::Cleanup, "cleanup").await?;

        // Only a verified run may hand over to the links-only resume path
        self.store_marker(marker, &state, identity)?;

        if state.is_awaiting() {
            self.reporter().warning(&format!(
                "Some files are not in place yet ({}). Start a zsh session, run `p10k configure`, then run this tool again",
                links.missing().join(", ")
            ));
        } else {
            self.reporter().success("Shell bootstrap complete");
        }
        Ok(state)
    }

    async fn run_resume(&self, identity: &Identity, marker: &ResumeMarker) -> Result<ResumeState> {
        let timer = StepTimer::start("resume");
        let linker = self.linker(identity);

        let state = match resume::classify(&linker) {
            ResumeClass::Complete => {
                self.record(timer.completed("root links already in place"));
                ResumeState::Complete
            }
            ResumeClass::StillMissingSources(missing) => {
                self.reporter().warning(&format!(
                    "Still missing {}. Start a zsh session, run `p10k configure`, then run this tool again",
                    missing.join(", ")
                ));
                self.record(timer.warning(format!("still missing: {}", missing.join(", "))));
                ResumeState::awaiting(missing)
            }
            ResumeClass::SourcesNowPresent => {
                self.record(timer.completed("sources now present, linking"));
                let links = linker.run();
                self.record_links(&links);
                match &links {
                    RootLinkResult::Skipped(_) => ResumeState::Complete,
                    RootLinkResult::Ran { summary, .. } => {
                        ResumeState::after_resumed_links(*summary, links.missing())
                    }
                }
            }
        };

        self.store_marker(marker, &state, identity)?;
        if !state.is_awaiting() {
            self.reporter().success("Shell bootstrap complete");
        }
        Ok(state)
    }

    async fn detect_platform(&self) -> Result<PlatformProfile> {
        let timer = StepTimer::start("detect");
        let detected = packages::detect(self.host.os, &self.config.paths.os_release, self.host.tools.as_ref()).await;
        match detected {
            Ok(profile) => {
                self.record(timer.completed(format!(
                    "{} on {} via {}",
                    profile.distro,
                    profile.os.as_str(),
                    profile.package_manager
                )));
                Ok(profile)
            }
            Err(e) => Err(self.fail(timer, e)),
        }
    }

    async fn package_step(&self, adapter: &PackageAdapter<'_>, action: PackageAction, name: &'static str) -> Result<()> {
        let timer = StepTimer::start(name);
        self.reporter().info(&format!("Package {}", action));

        let result = with_operation_span(name, || adapter.run(action, &self.config.packages)).await;
        match result {
            Ok(()) => {
                self.record(timer.completed(format!("package {} finished", action)));
                Ok(())
            }
            Err(e) => Err(self.fail(timer, e)),
        }
    }

    fn backup_step(&self, identity: &Identity) {
        let timer = StepTimer::start("backup");
        if self.options.no_backup {
            self.record(timer.skipped("disabled by --no-backup"));
            return;
        }

        let record = match backup::backup_dotfiles(identity, &self.config.backup_prefix, self.options.dry_run) {
            BackupOutcome::Created(archive) => {
                self.reporter().success(&format!("Backed up dotfiles to {}", archive.path.display()));
                timer.completed(format!(
                    "{} file(s) archived to {}",
                    archive.contained_files.len(),
                    archive.path.display()
                ))
            }
            BackupOutcome::NothingToBackup => timer.skipped("no existing dotfiles"),
            BackupOutcome::WouldArchive(names) => {
                timer.skipped(format!("dry-run, would archive {}", names.join(", ")))
            }
            BackupOutcome::Failed(reason) => {
                self.reporter().warning(&format!("Dotfile backup failed: {}", reason));
                timer.warning(reason)
            }
        };
        self.record(record);
    }

    async fn fetch_step(&self, identity: &Identity) -> Result<()> {
        let timer = StepTimer::start("fetch");
        self.reporter().info(&format!("Fetching {}", self.config.remote.config_url()));

        let fetch = TrustedFetch::new(
            &self.config.remote,
            &self.host.transports,
            self.host.tools.as_ref(),
            self.host.query_runner.as_ref(),
        );
        let result = with_operation_span("fetch", || fetch.fetch_and_install(identity, self.options.dry_run)).await;

        match result {
            Ok(fetched) if fetched.installed => {
                self.reporter()
                    .success(&format!("Installed verified {}", fetched.final_path.display()));
                self.record(timer.completed(format!(
                    "{} via {} (sha256 {})",
                    fetched.final_path.display(),
                    fetched.transport,
                    fetched.computed_hash
                )));
                Ok(())
            }
            Ok(fetched) => {
                self.record(timer.skipped(format!(
                    "dry-run, verified but not installed to {}",
                    fetched.final_path.display()
                )));
                Ok(())
            }
            Err(e) => Err(self.fail(timer, e)),
        }
    }

    fn linker<'a>(&'a self, identity: &'a Identity) -> RootLinker<'a> {
        RootLinker::new(identity, self.host.os, &self.config.paths.root_home, self.options.dry_run)
    }

    fn record_links(&self, links: &RootLinkResult) {
        let timer = StepTimer::start("root-link");
        let record = match links {
            RootLinkResult::Skipped(reason) => timer.skipped(reason.to_string()),
            RootLinkResult::Ran { summary, records } => {
                let problems: Vec<String> = records
                    .iter()
                    .filter(|r| !r.outcome.satisfied())
                    .map(|r| format!("{} {}", r.name, r.outcome))
                    .collect();
                match summary {
                    LinkSummary::FullySatisfied => timer.completed(format!("{} link(s) in place", records.len())),
                    LinkSummary::NeedsRetry | LinkSummary::Partial => {
                        for problem in &problems {
                            self.reporter().warning(&format!("Root link: {}", problem));
                        }
                        timer.warning(problems.join("; "))
                    }
                }
            }
        };
        self.record(record);
    }

    fn store_marker(&self, marker: &ResumeMarker, state: &ResumeState, identity: &Identity) -> Result<()> {
        if self.options.dry_run {
            info!("[dry-run] would leave resume state {:?}", state);
            return Ok(());
        }
        let owner = identity.delegated.then_some(&identity.account);
        marker.store(state, owner)
    }

    async fn shell_step(&self, identity: &Identity) {
        let timer = StepTimer::start("shell");
        if self.options.no_shell {
            self.record(timer.skipped("disabled by --no-shell"));
            return;
        }

        let changer = ShellChanger::new(
            self.host.users.as_ref(),
            self.host.runner.as_ref(),
            self.host.tools.as_ref(),
            self.host.os,
            &self.config.paths.shell_registry,
        );
        let record = match changer.apply(identity, &self.config.shell).await {
            Ok(change) if change.changed.is_empty() => {
                timer.completed(format!("login shell already {}", change.shell.display()))
            }
            Ok(change) => {
                self.reporter().success(&format!(
                    "Login shell set to {} for {}",
                    change.shell.display(),
                    change.changed.join(", ")
                ));
                timer.completed(format!("{} for {}", change.shell.display(), change.changed.join(", ")))
            }
            Err(e) => {
                self.reporter().warning(&format!("Could not change login shell: {}", e));
                timer.warning(e.to_string())
            }
        };
        self.record(record);
    }

    fn verify_step(&self, identity: &Identity) -> Result<()> {
        let timer = StepTimer::start("verify");
        if self.options.dry_run {
            self.record(timer.skipped("dry-run, nothing was installed"));
            return Ok(());
        }

        let problems = self.verification_problems(identity);
        if problems.is_empty() {
            self.record(timer.completed("git, shell and shell config present"));
            return Ok(());
        }

        Err(self.fail(timer, BootstrapError::VerificationFailed(problems)))
    }

    fn verification_problems(&self, identity: &Identity) -> Vec<String> {
        let mut problems = Vec::new();

        if self.host.tools.locate("git").is_none() {
            problems.push("git is not installed".to_string());
        }

        let fallback: Vec<PathBuf> = FALLBACK_DIRS.iter().map(PathBuf::from).collect();
        if let Err(e) = resolve_shell(&self.config.shell, self.host.tools.as_ref(), &fallback) {
            problems.push(e.to_string());
        }

        let config_path = identity.real_home.join(&self.config.remote.config_file);
        match std::fs::metadata(&config_path) {
            Ok(m) if m.len() > 0 => {}
            Ok(_) => problems.push(format!("{} is empty", config_path.display())),
            Err(_) => problems.push(format!("{} is missing", config_path.display())),
        }

        problems
    }
}

/// Exclusive advisory lock on the home directory, held while the handle lives
fn acquire_lock(home: &Path) -> Result<File> {
    let handle = File::open(home)?;
    match handle.try_lock_exclusive() {
        Ok(()) => Ok(handle),
        Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
            Err(BootstrapError::AlreadyRunning(home.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}
