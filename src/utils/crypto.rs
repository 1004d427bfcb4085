// file: src/utils/crypto.rs
// version: 2.0.0
// guid: b4b65407-7a76-4927-93ac-8909ef396d1c

//! SHA-256 digests and checksum-file parsing

use crate::error::{BootstrapError, Result};
use crate::executor::{run_checked, CommandRunner, CommandSpec};
use crate::utils::system::ToolLocator;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Tools able to produce a SHA-256 digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HashTool {
    /// In-process `sha2`
    Native,
    /// GNU coreutils `sha256sum`
    Sha256sum,
    /// Perl `shasum -a 256` (BSD/macOS)
    Shasum,
}

impl HashTool {
    fn program(&self) -> Option<&'static str> {
        match self {
            HashTool::Native => None,
            HashTool::Sha256sum => Some("sha256sum"),
            HashTool::Shasum => Some("shasum"),
        }
    }

    /// Pick the first tool from `preferred` that is usable on this system
    pub fn select(preferred: &[HashTool], tools: &dyn ToolLocator) -> Result<HashTool> {
        preferred
            .iter()
            .copied()
            .find(|tool| match tool.program() {
                None => true,
                Some(program) => tools.locate(program).is_some(),
            })
            .ok_or(BootstrapError::NoHashTool)
    }

    /// Hex-encoded SHA-256 digest of the file at `path`
    pub async fn digest_file(&self, path: &Path, runner: &dyn CommandRunner) -> Result<String> {
        let digest = match self {
            HashTool::Native => sha256_file(path).await?,
            HashTool::Sha256sum | HashTool::Shasum => {
                let mut spec = CommandSpec::new(self.program().unwrap_or("sha256sum"));
                if *self == HashTool::Shasum {
                    spec = spec.args(["-a", "256"]);
                }
                let spec = spec.arg(path.to_string_lossy());
                let output = run_checked(runner, &spec).await?;
                output
                    .stdout
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_lowercase()
            }
        };

        debug!("{:?} digest of {}: {}", self, path.display(), digest);
        Ok(digest)
    }
}

/// Stream a file through SHA-256
pub async fn sha256_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 of an in-memory buffer
pub fn sha256_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Extract the expected digest from checksum-file content
///
/// The digest is the first whitespace-delimited token, as written by
/// `sha256sum` and `shasum`.
pub fn parse_checksum(content: &str) -> Result<String> {
    let token = content
        .split_whitespace()
        .next()
        .ok_or_else(|| BootstrapError::ChecksumUnreadable("no digest token".to_string()))?;

    if token.len() != 64 || !token.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(BootstrapError::ChecksumMalformed(token.to_string()));
    }

    Ok(token.to_lowercase())
}

/// Case-insensitive digest comparison
pub fn digests_match(expected: &str, computed: &str) -> bool {
    expected.eq_ignore_ascii_case(computed)
}
