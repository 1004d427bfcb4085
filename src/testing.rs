// file: src/testing.rs
// version: 1.0.0
// guid: 051588bf-9fdc-49e7-976e-31a7ac326d9e

//! In-memory collaborators for driving the installer without touching the host

use crate::error::BootstrapError;
use crate::executor::{CommandOutput, CommandRunner, CommandSpec};
use crate::network::download::Transport;
use crate::utils::system::{AccountRecord, ToolLocator, UserDirectory};
use crate::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

fn current_ids() -> (u32, u32) {
    // SAFETY: getuid/getgid have no preconditions and cannot fail
    unsafe { (libc::getuid(), libc::getgid()) }
}

/// Account database held in memory; reports euid 0 unless told otherwise
pub struct FakeUsers {
    euid: u32,
    accounts: Mutex<Vec<AccountRecord>>,
}

impl FakeUsers {
    pub fn new() -> Self {
        Self {
            euid: 0,
            accounts: Mutex::new(Vec::new()),
        }
    }

    pub fn unprivileged(mut self) -> Self {
        self.euid = 1000;
        self
    }

    /// Add an account; `root` gets uid 0, everyone else the uid of this process
    /// so that files created by a test are owned by the account
    pub fn with_account(self, name: &str, home: PathBuf, shell: &str) -> Self {
        let (uid, gid) = if name == "root" { (0, 0) } else { current_ids() };
        self.with_account_uid(name, home, shell, uid, gid)
    }

    pub fn with_account_uid(self, name: &str, home: PathBuf, shell: &str, uid: u32, gid: u32) -> Self {
        if let Ok(mut accounts) = self.accounts.lock() {
            accounts.push(AccountRecord {
                name: name.to_string(),
                uid,
                gid,
                home,
                shell: shell.to_string(),
            });
        }
        self
    }

    pub fn set_shell(&self, name: &str, shell: &str) {
        if let Ok(mut accounts) = self.accounts.lock() {
            for account in accounts.iter_mut().filter(|a| a.name == name) {
                account.shell = shell.to_string();
            }
        }
    }
}

impl Default for FakeUsers {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl UserDirectory for FakeUsers {
    fn effective_uid(&self) -> u32 {
        self.euid
    }

    async fn lookup(&self, name: &str) -> Result<Option<AccountRecord>> {
        let accounts = self.accounts.lock().map_err(|_| BootstrapError::config("poisoned"))?;
        Ok(accounts.iter().find(|a| a.name == name).cloned())
    }

    async fn lookup_uid(&self, uid: u32) -> Result<Option<AccountRecord>> {
        let accounts = self.accounts.lock().map_err(|_| BootstrapError::config("poisoned"))?;
        if uid == 0 {
            if let Some(root) = accounts.iter().find(|a| a.name == "root") {
                return Ok(Some(root.clone()));
            }
        }
        Ok(accounts.iter().find(|a| a.uid == uid).cloned())
    }
}

/// Records every command; succeeds unless a failure rule matches
#[derive(Default)]
pub struct RecordingRunner {
    commands: Mutex<Vec<CommandSpec>>,
    failures: Mutex<Vec<(String, i32)>>,
    dry_run: bool,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Fail every command whose rendered form contains `needle`
    pub fn fail_on(self, needle: &str, exit_code: i32) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push((needle.to_string(), exit_code));
        }
        self
    }

    pub fn commands(&self) -> Vec<CommandSpec> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Rendered commands, one string per invocation
    pub fn rendered(&self) -> Vec<String> {
        self.commands().iter().map(|c| c.to_string()).collect()
    }

    pub fn count(&self, program: &str) -> usize {
        self.commands().iter().filter(|c| c.program == program).count()
    }
}

#[async_trait::async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(spec.clone());
        }

        let rendered = spec.to_string();
        let failure = self
            .failures
            .lock()
            .ok()
            .and_then(|f| f.iter().find(|(needle, _)| rendered.contains(needle.as_str())).cloned());

        Ok(match failure {
            Some((_, code)) => CommandOutput::failed(code, format!("{} failed", spec.program)),
            None => CommandOutput::ok(""),
        })
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

/// Serves fixed bytes per URL
pub struct StaticTransport {
    name: String,
    files: HashMap<String, Vec<u8>>,
    failing: bool,
    available: bool,
    calls: AtomicUsize,
}

impl StaticTransport {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            files: HashMap::new(),
            failing: false,
            available: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_file(mut self, url: &str, content: &[u8]) -> Self {
        self.files.insert(url.to_string(), content.to_vec());
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Transport for StaticTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn download(&self, url: &str, dest: &Path, _timeout: Duration) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.failing {
            return Err(BootstrapError::network(format!("{}: connection refused", self.name)));
        }

        match self.files.get(url) {
            Some(content) => {
                tokio::fs::write(dest, content).await?;
                Ok(())
            }
            None => Err(BootstrapError::network(format!("{}: 404 for {}", self.name, url))),
        }
    }
}

/// Tool lookup answered from a fixed table
#[derive(Debug, Default, Clone)]
pub struct FixedTools {
    tools: HashMap<String, PathBuf>,
}

impl FixedTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, path: impl Into<PathBuf>) -> Self {
        self.tools.insert(name.to_string(), path.into());
        self
    }
}

impl ToolLocator for FixedTools {
    fn locate(&self, name: &str) -> Option<PathBuf> {
        self.tools.get(name).cloned()
    }
}
