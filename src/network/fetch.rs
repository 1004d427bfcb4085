// file: src/network/fetch.rs
// version: 1.1.0
// guid: a68ea005-0181-4fa4-bd0d-62578fa7f2a7

//! Trusted fetch of the shell configuration
//!
//! download → parse checksum → hash → compare → sanity check → atomic
//! install. The downloaded file is sourced by every future interactive
//! shell, so every check is fatal. Downloads land in a private staging
//! directory outside the user's home; only the verified bytes are written
//! into the home, through a `NamedTempFile` handle that is renamed into
//! place. Staging files are removed when dropped, whether the run
//! succeeds, fails or is cancelled.

use crate::config::RemoteConfig;
use crate::error::{BootstrapError, Result};
use crate::executor::CommandRunner;
use crate::network::download::{download_with_fallback, RetryPolicy, Transport};
use crate::security::identity::Identity;
use crate::utils::crypto::{digests_match, parse_checksum, HashTool};
use crate::utils::system::{SystemUtils, ToolLocator};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Prefix of the temporary files created during a fetch
pub const TEMP_PREFIX: &str = ".shell-bootstrap-download-";

/// Mode of the installed configuration file
pub const INSTALLED_MODE: u32 = 0o644;

/// Result of a successful fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedConfig {
    pub remote_url: String,
    pub checksum_url: String,
    pub expected_hash: String,
    pub computed_hash: String,
    pub final_path: PathBuf,
    /// Transport that delivered the payload
    pub transport: String,
    /// False in dry-run: verified but not moved into place
    pub installed: bool,
}

pub struct TrustedFetch<'a> {
    remote: &'a RemoteConfig,
    transports: &'a [Arc<dyn Transport>],
    tools: &'a dyn ToolLocator,
    runner: &'a dyn CommandRunner,
}

impl<'a> TrustedFetch<'a> {
    /// `runner` is used for external hash tools only
    pub fn new(
        remote: &'a RemoteConfig,
        transports: &'a [Arc<dyn Transport>],
        tools: &'a dyn ToolLocator,
        runner: &'a dyn CommandRunner,
    ) -> Self {
        Self {
            remote,
            transports,
            tools,
            runner,
        }
    }

    fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(self.remote.timeout_secs),
            attempts: self.remote.retries,
            delay: Duration::from_millis(self.remote.retry_delay_ms),
        }
    }

    /// Download, verify and install the configuration into the real home
    pub async fn fetch_and_install(&self, identity: &Identity, dry_run: bool) -> Result<FetchedConfig> {
        let final_path = identity.real_home.join(&self.remote.config_file);
        let remote_url = self.remote.config_url();
        let checksum_url = self.remote.checksum_url();

        let staging = tempfile::Builder::new().prefix(TEMP_PREFIX).tempdir()?;
        let payload = staging.path().join("payload");
        let checksum = staging.path().join("checksum");
        debug!("Staging downloads in {}", staging.path().display());

        let transport = download_with_fallback(self.transports, &remote_url, &payload, self.policy()).await?;
        download_with_fallback(self.transports, &checksum_url, &checksum, self.policy()).await?;

        let checksum_content = tokio::fs::read(&checksum).await?;
        let checksum_text = String::from_utf8(checksum_content)
            .map_err(|_| BootstrapError::ChecksumUnreadable(format!("{} is not text", checksum_url)))?;
        let expected_hash = parse_checksum(&checksum_text)?;

        let tool = HashTool::select(&self.remote.hash_tools, self.tools)?;
        let computed_hash = tool.digest_file(&payload, self.runner).await?;

        if !digests_match(&expected_hash, &computed_hash) {
            return Err(BootstrapError::IntegrityMismatch {
                expected: expected_hash,
                computed: computed_hash,
            });
        }
        info!("Checksum verified for {}", remote_url);

        let content = tokio::fs::read(&payload).await?;
        check_content(&content, &self.remote.content_markers, &remote_url)?;

        let fetched = FetchedConfig {
            remote_url,
            checksum_url,
            expected_hash,
            computed_hash,
            final_path: final_path.clone(),
            transport,
            installed: !dry_run,
        };

        if dry_run {
            info!("[dry-run] would install verified config to {}", final_path.display());
            return Ok(fetched);
        }

        let mut installed = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&identity.real_home)?;
        installed.as_file_mut().write_all(&content)?;
        installed.as_file().sync_all()?;
        installed
            .as_file()
            .set_permissions(std::fs::Permissions::from_mode(INSTALLED_MODE))?;
        if identity.delegated {
            SystemUtils::set_owner(installed.as_file(), &identity.account)?;
        }
        installed.persist(&final_path).map_err(|e| e.error)?;

        info!("Installed {}", final_path.display());
        Ok(fetched)
    }
}

/// Reject empty artifacts and ones carrying none of the expected markers
pub fn check_content(content: &[u8], markers: &[String], source: &str) -> Result<()> {
    if content.is_empty() {
        return Err(BootstrapError::EmptyArtifact(source.to_string()));
    }

    let text = String::from_utf8_lossy(content);
    if !markers.iter().filter(|m| !m.is_empty()).any(|m| text.contains(m.as_str())) {
        return Err(BootstrapError::ContentSanityFailed(format!(
            "{} contains none of: {}",
            source,
            markers.join(", ")
        )));
    }

    Ok(())
}
