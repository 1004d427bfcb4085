// file: src/network/download.rs
// version: 2.0.0
// guid: 4b7e0a2d-9c63-4f15-8a1e-6d3f9b2c7e40

//! Download transports with bounded retry and fallback

use crate::error::BootstrapError;
use crate::executor::{CommandRunner, CommandSpec, LocalRunner};
use crate::utils::system::ToolLocator;
use crate::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A way of fetching a URL into a local file
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this transport can be used on this host
    async fn is_available(&self) -> bool;

    /// Fetch `url` into `dest`, overwriting its content
    async fn download(&self, url: &str, dest: &Path, timeout: Duration) -> Result<()>;
}

/// Native HTTP client
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Client that refuses plain-http URLs, including redirect targets
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder().https_only(true).build()?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn download(&self, url: &str, dest: &Path, timeout: Duration) -> Result<()> {
        debug!("Downloading (http): {}", url);

        let response = self.client.get(url).timeout(timeout).send().await?;

        if !response.status().is_success() {
            return Err(BootstrapError::network(format!(
                "Download failed with status: {}",
                response.status()
            )));
        }

        let bytes = response.bytes().await?;
        tokio::fs::write(dest, &bytes).await?;

        debug!("Downloaded {} bytes to: {}", bytes.len(), dest.display());
        Ok(())
    }
}

/// External `curl`, or `wget` when curl is not installed
pub struct CommandTransport {
    runner: LocalRunner,
    tools: Arc<dyn ToolLocator>,
}

impl CommandTransport {
    pub fn new(tools: Arc<dyn ToolLocator>) -> Self {
        Self {
            runner: LocalRunner::default(),
            tools,
        }
    }

    fn command_for(&self, url: &str, dest: &Path, timeout: Duration) -> Option<CommandSpec> {
        let secs = timeout.as_secs().max(1).to_string();
        let dest = dest.to_string_lossy().to_string();

        if self.tools.locate("curl").is_some() {
            return Some(CommandSpec::new("curl").args([
                "-fsSL",
                "--proto",
                "=https",
                "--max-time",
                secs.as_str(),
                "-o",
                dest.as_str(),
                url,
            ]));
        }

        if self.tools.locate("wget").is_some() {
            return Some(CommandSpec::new("wget").args([
                "-q",
                "--https-only",
                "-T",
                secs.as_str(),
                "-O",
                dest.as_str(),
                url,
            ]));
        }

        None
    }
}

#[async_trait::async_trait]
impl Transport for CommandTransport {
    fn name(&self) -> &str {
        "command"
    }

    async fn is_available(&self) -> bool {
        self.tools.locate("curl").is_some() || self.tools.locate("wget").is_some()
    }

    async fn download(&self, url: &str, dest: &Path, timeout: Duration) -> Result<()> {
        let spec = self
            .command_for(url, dest, timeout)
            .ok_or_else(|| BootstrapError::network("neither curl nor wget is installed"))?;

        // Outer bound in case the tool ignores its own timeout
        let output = tokio::time::timeout(timeout + Duration::from_secs(5), self.runner.run(&spec))
            .await
            .map_err(|_| BootstrapError::network(format!("{} timed out", spec.program)))??;

        if !output.success() {
            return Err(BootstrapError::network(format!(
                "{} exited with {:?}: {}",
                spec.program,
                output.exit_code,
                output.stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Bounds applied to every download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub attempts: u32,
    pub delay: Duration,
}

/// Try each available transport in order, retrying each up to the policy
///
/// Returns the name of the transport that succeeded.
pub async fn download_with_fallback(
    transports: &[Arc<dyn Transport>],
    url: &str,
    dest: &Path,
    policy: RetryPolicy,
) -> Result<String> {
    let mut last_error = String::from("no download transport available");

    for transport in transports {
        if !transport.is_available().await {
            debug!("Transport '{}' unavailable, skipping", transport.name());
            continue;
        }

        for attempt in 1..=policy.attempts {
            match transport.download(url, dest, policy.timeout).await {
                Ok(()) => {
                    info!("Downloaded {} via {}", url, transport.name());
                    return Ok(transport.name().to_string());
                }
                Err(e) => {
                    warn!(
                        "Download of {} via {} failed (attempt {}/{}): {}",
                        url,
                        transport.name(),
                        attempt,
                        policy.attempts,
                        e
                    );
                    last_error = e.to_string();
                    if attempt < policy.attempts && !policy.delay.is_zero() {
                        tokio::time::sleep(policy.delay).await;
                    }
                }
            }
        }
    }

    Err(BootstrapError::DownloadFailed {
        url: url.to_string(),
        detail: last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixedTools, StaticTransport};

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(5),
            attempts,
            delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_falls_back_to_second_transport() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out");

        let broken: Arc<dyn Transport> = Arc::new(StaticTransport::new("primary").failing());
        let working: Arc<dyn Transport> =
            Arc::new(StaticTransport::new("secondary").with_file("https://x.test/a", b"payload"));

        let used = download_with_fallback(&[broken.clone(), working], "https://x.test/a", &dest, policy(2))
            .await
            .unwrap();

        assert_eq!(used, "secondary");
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let failing = Arc::new(StaticTransport::new("primary").failing());
        let transports: Vec<Arc<dyn Transport>> = vec![failing.clone() as Arc<dyn Transport>];

        let err = download_with_fallback(&transports, "https://x.test/a", &dir.path().join("out"), policy(3))
            .await
            .unwrap_err();

        assert!(matches!(err, BootstrapError::DownloadFailed { .. }));
        assert_eq!(failing.calls(), 3);
    }

    #[tokio::test]
    async fn test_skips_unavailable_transport() {
        let dir = tempfile::tempdir().unwrap();
        let offline = Arc::new(StaticTransport::new("offline").unavailable());
        let transports: Vec<Arc<dyn Transport>> = vec![offline.clone() as Arc<dyn Transport>];

        let err = download_with_fallback(&transports, "https://x.test/a", &dir.path().join("out"), policy(3))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("no download transport available"));
        assert_eq!(offline.calls(), 0);
    }

    #[test]
    fn test_command_transport_prefers_curl() {
        let tools = Arc::new(FixedTools::new().with("curl", "/usr/bin/curl").with("wget", "/usr/bin/wget"));
        let transport = CommandTransport::new(tools);
        let spec = transport
            .command_for("https://x.test/a", Path::new("/tmp/out"), Duration::from_secs(30))
            .unwrap();
        assert_eq!(spec.program, "curl");
        assert!(spec.args.contains(&"--max-time".to_string()));
        assert_eq!(spec.args.last().unwrap(), "https://x.test/a");
    }

    #[test]
    fn test_command_transport_falls_back_to_wget() {
        let tools = Arc::new(FixedTools::new().with("wget", "/usr/bin/wget"));
        let transport = CommandTransport::new(tools);
        let spec = transport
            .command_for("https://x.test/a", Path::new("/tmp/out"), Duration::from_secs(30))
            .unwrap();
        assert_eq!(spec.program, "wget");

        let none = CommandTransport::new(Arc::new(FixedTools::new()));
        assert!(none.command_for("https://x.test/a", Path::new("/tmp/out"), Duration::from_secs(1)).is_none());
    }
}
