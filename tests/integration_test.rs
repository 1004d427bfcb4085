// file: tests/integration_test.rs
// version: 2.1.0
// guid: 2f9c4e7a-1b8d-4a63-9e05-c6d3a8f1b274

//! Integration tests for the shell bootstrap agent

use shell_bootstrap_agent::{
    config::BootstrapConfig,
    executor::CommandRunner,
    installer::{resume::ResumeState, Host, InstallOptions, Installer, Phase},
    network::download::Transport,
    reporter::{Level, MemoryReporter, Reporter},
    steps::StepStatus,
    testing::{FakeUsers, FixedTools, RecordingRunner, StaticTransport},
    utils::{crypto::sha256_bytes, system::OsFamily},
    BootstrapError,
};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const BASE_URL: &str = "https://dotfiles.test/zsh";
const ZSHRC: &[u8] = b"# shell config\nautoload -Uz compinit\nsetopt share_history\n";
const OS_RELEASE: &str = "NAME=\"Ubuntu\"\nID=ubuntu\nID_LIKE=debian\nVERSION_ID=\"24.04\"\n";

/// A scratch host: a user home, a root home and the system files
struct Sandbox {
    _dir: TempDir,
    home: PathBuf,
    root_home: PathBuf,
    registry: PathBuf,
    os_release: PathBuf,
    zsh: PathBuf,
    git: PathBuf,
}

impl Sandbox {
    fn new(with_root_home: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("home/alice");
        let root_home = dir.path().join("root");
        let etc = dir.path().join("etc");
        let bin = dir.path().join("bin");
        fs::create_dir_all(&home).unwrap();
        fs::create_dir_all(&etc).unwrap();
        fs::create_dir_all(&bin).unwrap();
        if with_root_home {
            fs::create_dir_all(&root_home).unwrap();
        }

        let registry = etc.join("shells");
        fs::write(&registry, "/bin/sh\n/bin/bash\n").unwrap();
        let os_release = etc.join("os-release");
        fs::write(&os_release, OS_RELEASE).unwrap();

        let zsh = executable(&bin, "zsh");
        let git = executable(&bin, "git");

        Self {
            _dir: dir,
            home,
            root_home,
            registry,
            os_release,
            zsh,
            git,
        }
    }

    fn config(&self) -> BootstrapConfig {
        let mut config = BootstrapConfig::default();
        config.remote.base_url = BASE_URL.to_string();
        config.remote.retries = 1;
        config.remote.retry_delay_ms = 0;
        config.paths.root_home = self.root_home.clone();
        config.paths.shell_registry = self.registry.clone();
        config.paths.os_release = self.os_release.clone();
        config
    }

    fn users(&self) -> Arc<FakeUsers> {
        Arc::new(
            FakeUsers::new()
                .with_account("root", self.root_home.clone(), "/bin/bash")
                .with_account("alice", self.home.clone(), "/bin/bash"),
        )
    }

    fn tools(&self) -> Arc<FixedTools> {
        Arc::new(FixedTools::new().with("zsh", &self.zsh).with("git", &self.git))
    }

    fn marker(&self) -> PathBuf {
        self.home.join(".shell-bootstrap-resume")
    }
}

fn executable(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, "#!/bin/sh\n").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn remote(payload: &[u8], checksum: &str) -> Vec<Arc<dyn Transport>> {
    vec![Arc::new(
        StaticTransport::new("static")
            .with_file(&format!("{}/.zshrc", BASE_URL), payload)
            .with_file(&format!("{}/.zshrc.sha256", BASE_URL), checksum.as_bytes()),
    ) as Arc<dyn Transport>]
}

fn valid_remote() -> Vec<Arc<dyn Transport>> {
    remote(ZSHRC, &format!("{}  .zshrc\n", sha256_bytes(ZSHRC)))
}

struct Harness {
    users: Arc<FakeUsers>,
    runner: Arc<RecordingRunner>,
    reporter: Arc<MemoryReporter>,
    host: Host,
}

fn harness(sandbox: &Sandbox, runner: RecordingRunner, transports: Vec<Arc<dyn Transport>>) -> Harness {
    let users = sandbox.users();
    let runner = Arc::new(runner);
    let reporter = Arc::new(MemoryReporter::new());
    let host = Host {
        users: users.clone(),
        runner: runner.clone() as Arc<dyn CommandRunner>,
        query_runner: Arc::new(RecordingRunner::new()),
        tools: sandbox.tools(),
        transports,
        reporter: reporter.clone() as Arc<dyn Reporter>,
        os: Some(OsFamily::Linux),
        delegate: Some("alice".to_string()),
    };
    Harness {
        users,
        runner,
        reporter,
        host,
    }
}

fn status_of(steps: &[shell_bootstrap_agent::steps::StepRecord], name: &str) -> Option<StepStatus> {
    steps.iter().find(|s| s.name == name).map(|s| s.status)
}

#[tokio::test]
async fn test_fresh_account_without_root_home() {
    let sandbox = Sandbox::new(false);
    let h = harness(&sandbox, RecordingRunner::new(), valid_remote());
    let installer = Installer::new(sandbox.config(), h.host.clone(), InstallOptions::default());

    let report = installer.run().await.unwrap();

    assert_eq!(report.phase, Phase::Full);
    assert_eq!(report.real_user, "alice");
    assert_eq!(report.resume, ResumeState::Complete);
    assert_eq!(status_of(&report.steps, "backup"), Some(StepStatus::Skipped));
    assert_eq!(status_of(&report.steps, "root-link"), Some(StepStatus::Skipped));
    assert_eq!(status_of(&report.steps, "shell"), Some(StepStatus::Completed));
    assert_eq!(status_of(&report.steps, "verify"), Some(StepStatus::Completed));

    assert_eq!(fs::read(sandbox.home.join(".zshrc")).unwrap(), ZSHRC);
    assert!(!sandbox.marker().exists());

    let zsh = sandbox.zsh.display().to_string();
    assert_eq!(
        h.runner.rendered(),
        vec![
            "DEBIAN_FRONTEND=noninteractive apt-get update".to_string(),
            "DEBIAN_FRONTEND=noninteractive apt-get install -y git zsh curl wget".to_string(),
            format!("chsh -s {} alice", zsh),
            format!("chsh -s {} root", zsh),
            "DEBIAN_FRONTEND=noninteractive apt-get autoremove -y".to_string(),
        ]
    );

    let registry = fs::read_to_string(&sandbox.registry).unwrap();
    assert!(registry.lines().any(|l| l == zsh));
    assert!(h.reporter.contains(Level::Success, "Shell bootstrap complete"));
}

#[tokio::test]
async fn test_existing_dotfiles_are_backed_up() {
    let sandbox = Sandbox::new(false);
    fs::write(sandbox.home.join(".bashrc"), "alias l=ls\n").unwrap();
    fs::write(sandbox.home.join(".zshrc"), "old\n").unwrap();
    let h = harness(&sandbox, RecordingRunner::new(), valid_remote());

    let report = Installer::new(sandbox.config(), h.host, InstallOptions::default())
        .run()
        .await
        .unwrap();

    assert_eq!(status_of(&report.steps, "backup"), Some(StepStatus::Completed));
    let backups: Vec<PathBuf> = fs::read_dir(&sandbox.home)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.file_name().unwrap().to_string_lossy().starts_with(".shell-backup-"))
        .collect();
    assert_eq!(backups.len(), 1);
    assert!(backups[0].join("dotfiles.tar.gz").is_file());
    assert_eq!(fs::read(sandbox.home.join(".zshrc")).unwrap(), ZSHRC);
}

#[tokio::test]
async fn test_two_phase_resume() {
    let sandbox = Sandbox::new(true);
    let h = harness(&sandbox, RecordingRunner::new(), valid_remote());
    let config = sandbox.config();

    // phase 1: only .zshrc exists after the fetch
    let first = Installer::new(config.clone(), h.host.clone(), InstallOptions::default())
        .run()
        .await
        .unwrap();
    assert_eq!(first.phase, Phase::Full);
    assert!(first.resume.is_awaiting());
    assert_eq!(status_of(&first.steps, "root-link"), Some(StepStatus::Warning));
    assert!(sandbox.marker().exists());
    assert_eq!(
        fs::read_link(sandbox.root_home.join(".zshrc")).unwrap(),
        sandbox.home.join(".zshrc")
    );

    // still missing: the marker stays and nothing is reinstalled
    let commands_after_first = h.runner.commands().len();
    let waiting = Installer::new(config.clone(), h.host.clone(), InstallOptions::default())
        .run()
        .await
        .unwrap();
    assert_eq!(waiting.phase, Phase::Resume);
    assert!(waiting.resume.is_awaiting());
    assert!(sandbox.marker().exists());
    assert!(h.reporter.contains(Level::Warning, "p10k configure"));

    // the interactive step created the remaining files
    fs::write(sandbox.home.join(".p10k.zsh"), "# p10k\n").unwrap();
    fs::write(sandbox.home.join(".nanorc"), "set autoindent\n").unwrap();

    let second = Installer::new(config, h.host.clone(), InstallOptions::default())
        .run()
        .await
        .unwrap();
    assert_eq!(second.phase, Phase::Resume);
    assert_eq!(second.resume, ResumeState::Complete);
    assert!(!sandbox.marker().exists());
    for name in [".zshrc", ".p10k.zsh", ".nanorc"] {
        assert_eq!(
            fs::read_link(sandbox.root_home.join(name)).unwrap(),
            sandbox.home.join(name)
        );
    }

    // resumed runs bypass packages, fetch and shell change
    assert_eq!(h.runner.commands().len(), commands_after_first);
}

#[tokio::test]
async fn test_corrupted_payload_aborts_run() {
    let sandbox = Sandbox::new(true);
    fs::write(sandbox.home.join(".zshrc"), "old\n").unwrap();
    let mut corrupted = ZSHRC.to_vec();
    corrupted[0] = b'X';
    let h = harness(
        &sandbox,
        RecordingRunner::new(),
        remote(&corrupted, &sha256_bytes(ZSHRC)),
    );
    let installer = Installer::new(sandbox.config(), h.host.clone(), InstallOptions::default());

    let err = installer.run().await.unwrap_err();

    assert!(matches!(err, BootstrapError::IntegrityMismatch { .. }));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(fs::read(sandbox.home.join(".zshrc")).unwrap(), b"old\n");
    assert_eq!(h.runner.count("chsh"), 0);
    assert_eq!(h.runner.count("apt-get"), 2);
    assert!(fs::read_dir(&sandbox.root_home).unwrap().next().is_none());

    let steps = installer.steps();
    assert_eq!(steps.last().map(|s| s.name.as_str()), Some("fetch"));
    assert_eq!(steps.last().map(|s| s.status), Some(StepStatus::Failed));

    let leftovers = fs::read_dir(&sandbox.home)
        .unwrap()
        .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().contains(".shell-bootstrap-download-"))
        .count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_dry_run_changes_nothing() {
    let sandbox = Sandbox::new(true);
    fs::write(sandbox.home.join(".profile"), "export PATH\n").unwrap();
    let h = harness(&sandbox, RecordingRunner::new().dry_run(), valid_remote());
    let options = InstallOptions {
        dry_run: true,
        ..InstallOptions::default()
    };

    let report = Installer::new(sandbox.config(), h.host, options).run().await.unwrap();

    assert_eq!(status_of(&report.steps, "fetch"), Some(StepStatus::Skipped));
    assert_eq!(status_of(&report.steps, "verify"), Some(StepStatus::Skipped));
    assert!(!sandbox.home.join(".zshrc").exists());
    assert!(!sandbox.marker().exists());
    assert_eq!(fs::read_to_string(&sandbox.registry).unwrap(), "/bin/sh\n/bin/bash\n");
    assert!(fs::read_dir(&sandbox.root_home).unwrap().next().is_none());

    let entries: Vec<String> = fs::read_dir(&sandbox.home)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(entries, vec![".profile".to_string()]);
}

#[tokio::test]
async fn test_opt_out_flags() {
    let sandbox = Sandbox::new(false);
    fs::write(sandbox.home.join(".bashrc"), "alias l=ls\n").unwrap();
    let h = harness(&sandbox, RecordingRunner::new(), valid_remote());
    let options = InstallOptions {
        no_backup: true,
        no_shell: true,
        ..InstallOptions::default()
    };

    let report = Installer::new(sandbox.config(), h.host, options).run().await.unwrap();

    assert_eq!(status_of(&report.steps, "backup"), Some(StepStatus::Skipped));
    assert_eq!(status_of(&report.steps, "shell"), Some(StepStatus::Skipped));
    assert_eq!(h.runner.count("chsh"), 0);
    assert_eq!(fs::read_to_string(&sandbox.registry).unwrap(), "/bin/sh\n/bin/bash\n");
}

#[tokio::test]
async fn test_second_full_run_does_not_touch_shell_registry() {
    let sandbox = Sandbox::new(false);
    let h = harness(&sandbox, RecordingRunner::new(), valid_remote());
    let config = sandbox.config();

    Installer::new(config.clone(), h.host.clone(), InstallOptions::default())
        .run()
        .await
        .unwrap();
    let registry = fs::read_to_string(&sandbox.registry).unwrap();

    let zsh = sandbox.zsh.display().to_string();
    h.users.set_shell("alice", &zsh);
    h.users.set_shell("root", &zsh);

    let report = Installer::new(config, h.host.clone(), InstallOptions::default())
        .run()
        .await
        .unwrap();

    assert_eq!(status_of(&report.steps, "shell"), Some(StepStatus::Completed));
    assert_eq!(fs::read_to_string(&sandbox.registry).unwrap(), registry);
    assert_eq!(h.runner.count("chsh"), 2);
}

#[tokio::test]
async fn test_unprivileged_run_is_refused() {
    let sandbox = Sandbox::new(false);
    let mut h = harness(&sandbox, RecordingRunner::new(), valid_remote());
    h.host.users = Arc::new(
        FakeUsers::new()
            .unprivileged()
            .with_account("alice", sandbox.home.clone(), "/bin/bash"),
    );

    let err = Installer::new(sandbox.config(), h.host, InstallOptions::default())
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, BootstrapError::NotPrivileged));
    assert!(h.runner.commands().is_empty());
}

#[tokio::test]
async fn test_hostile_delegate_is_refused() {
    let sandbox = Sandbox::new(false);
    for delegate in ["../alice", "alice/..", ".alice", "al ice"] {
        let mut h = harness(&sandbox, RecordingRunner::new(), valid_remote());
        h.host.delegate = Some(delegate.to_string());

        let err = Installer::new(sandbox.config(), h.host, InstallOptions::default())
            .run()
            .await
            .unwrap_err();

        assert!(
            matches!(err, BootstrapError::InvalidIdentifier { .. }),
            "{delegate}: {err}"
        );
        assert!(h.runner.commands().is_empty());
    }
}

#[tokio::test]
async fn test_bad_package_name_is_refused_before_any_command() {
    let sandbox = Sandbox::new(false);
    let h = harness(&sandbox, RecordingRunner::new(), valid_remote());
    let mut config = sandbox.config();
    config.packages.push("zsh;reboot".to_string());

    let err = Installer::new(config, h.host, InstallOptions::default())
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, BootstrapError::InvalidIdentifier { .. }));
    assert!(h.runner.commands().is_empty());
}

#[tokio::test]
async fn test_package_failure_is_fatal() {
    let sandbox = Sandbox::new(false);
    let h = harness(&sandbox, RecordingRunner::new().fail_on("install", 100), valid_remote());

    let err = Installer::new(sandbox.config(), h.host, InstallOptions::default())
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, BootstrapError::PackageOperationFailed { .. }));
    assert!(!sandbox.home.join(".zshrc").exists());
}

#[tokio::test]
async fn test_concurrent_run_is_rejected() {
    use fs2::FileExt;

    let sandbox = Sandbox::new(false);
    let held = fs::File::open(&sandbox.home).unwrap();
    held.try_lock_exclusive().unwrap();
    let h = harness(&sandbox, RecordingRunner::new(), valid_remote());

    let err = Installer::new(sandbox.config(), h.host, InstallOptions::default())
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, BootstrapError::AlreadyRunning(_)));
    assert!(h.runner.commands().is_empty());
}

#[tokio::test]
async fn test_backup_failure_is_a_warning() {
    let sandbox = Sandbox::new(false);
    fs::write(sandbox.home.join(".bashrc"), "alias l=ls\n").unwrap();
    let h = harness(&sandbox, RecordingRunner::new(), valid_remote());
    let mut config = sandbox.config();
    // too long for a directory name, so the backup directory cannot be created
    config.backup_prefix = "b".repeat(250);

    let report = Installer::new(config, h.host, InstallOptions::default())
        .run()
        .await
        .unwrap();

    assert_eq!(status_of(&report.steps, "backup"), Some(StepStatus::Warning));
    assert_eq!(status_of(&report.steps, "fetch"), Some(StepStatus::Completed));
    assert_eq!(status_of(&report.steps, "verify"), Some(StepStatus::Completed));
    assert!(h.reporter.contains(Level::Warning, "Dotfile backup failed"));
    assert_eq!(fs::read(sandbox.home.join(".zshrc")).unwrap(), ZSHRC);
    assert_eq!(fs::read_to_string(sandbox.home.join(".bashrc")).unwrap(), "alias l=ls\n");
}

#[tokio::test]
async fn test_verification_failure_is_fatal() {
    let sandbox = Sandbox::new(false);
    let mut h = harness(&sandbox, RecordingRunner::new(), valid_remote());
    h.host.tools = Arc::new(FixedTools::new().with("zsh", &sandbox.zsh));
    let installer = Installer::new(sandbox.config(), h.host.clone(), InstallOptions::default());

    let err = installer.run().await.unwrap_err();

    match &err {
        BootstrapError::VerificationFailed(problems) => {
            assert_eq!(problems, &vec!["git is not installed".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.exit_code(), 1);

    let steps = installer.steps();
    assert_eq!(steps.last().map(|s| s.name.as_str()), Some("verify"));
    assert_eq!(steps.last().map(|s| s.status), Some(StepStatus::Failed));
    assert_eq!(h.runner.count("autoremove"), 0);

    // the binary prints the final error; the reporter never repeats it
    let message = err.to_string();
    assert!(!h.reporter.entries().iter().any(|(_, m)| m.contains(&message)));
}

#[tokio::test]
async fn test_failed_verification_does_not_arm_resume() {
    let sandbox = Sandbox::new(true);
    let mut h = harness(&sandbox, RecordingRunner::new(), valid_remote());
    let config = sandbox.config();

    h.host.tools = Arc::new(FixedTools::new().with("zsh", &sandbox.zsh));
    let err = Installer::new(config.clone(), h.host.clone(), InstallOptions::default())
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, BootstrapError::VerificationFailed(_)));
    assert!(!sandbox.marker().exists());

    // git is still missing: the rerun repeats the full run and fails again
    let err = Installer::new(config.clone(), h.host.clone(), InstallOptions::default())
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, BootstrapError::VerificationFailed(_)));
    assert!(!sandbox.marker().exists());

    h.host.tools = sandbox.tools();
    let fixed = Installer::new(config, h.host.clone(), InstallOptions::default())
        .run()
        .await
        .unwrap();
    assert_eq!(fixed.phase, Phase::Full);
    assert_eq!(status_of(&fixed.steps, "verify"), Some(StepStatus::Completed));
    assert!(fixed.resume.is_awaiting());
    assert!(sandbox.marker().exists());
}
