// file: src/security/identity.rs
// version: 1.0.0
// guid: 01126123-9437-413e-be73-85de61015333

//! Privilege gate and identity resolution
//!
//! The tool runs as root but acts on behalf of the account that invoked
//! `sudo`. Every later component trusts `real_home`, so it is checked here
//! before anything is written.

use crate::error::{BootstrapError, Result};
use crate::security::validator::validate_account;
use crate::utils::system::{AccountRecord, UserDirectory};
use std::path::PathBuf;
use tracing::{debug, info};

/// Who the run acts as and on behalf of
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub privileged: bool,
    pub acting_user: String,
    pub real_user: String,
    pub real_home: PathBuf,
    /// Set when the run was delegated from another account
    pub delegated: bool,
    /// Account record of `real_user`
    pub account: AccountRecord,
}

impl Identity {
    /// Current login shell of the real user
    pub fn login_shell(&self) -> &str {
        &self.account.shell
    }
}

/// Resolve the invoking identity
///
/// `delegate` is the raw value of the delegation variable (normally
/// `SUDO_USER`); an empty value or the acting account itself means the run
/// is not delegated.
pub async fn resolve_identity(users: &dyn UserDirectory, delegate: Option<&str>) -> Result<Identity> {
    let euid = users.effective_uid();
    if euid != 0 {
        return Err(BootstrapError::NotPrivileged);
    }

    let acting = users.lookup_uid(euid).await?;
    let acting_user = acting
        .as_ref()
        .map(|r| r.name.clone())
        .unwrap_or_else(|| "root".to_string());

    let delegate = delegate
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != acting_user);

    let (account, delegated) = match delegate {
        Some(name) => {
            debug!("Run delegated from '{}'", name);
            (validate_account(name, users).await?, true)
        }
        None => {
            let record = acting.ok_or_else(|| {
                BootstrapError::home(&acting_user, "acting account not found in account database")
            })?;
            (record, false)
        }
    };

    if account.home.as_os_str().is_empty() {
        return Err(BootstrapError::home(&account.name, "home directory is empty"));
    }

    if !account.home.is_dir() {
        return Err(BootstrapError::home(
            &account.name,
            format!("{} is not an existing directory", account.home.display()),
        ));
    }

    info!(
        "Acting as '{}' on behalf of '{}' (home {})",
        acting_user,
        account.name,
        account.home.display()
    );

    Ok(Identity {
        privileged: true,
        acting_user,
        real_user: account.name.clone(),
        real_home: account.home.clone(),
        delegated,
        account,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeUsers;

    fn users_with_home(home: PathBuf) -> FakeUsers {
        FakeUsers::new()
            .with_account("root", PathBuf::from("/"), "/bin/bash")
            .with_account("alice", home, "/bin/bash")
    }

    #[tokio::test]
    async fn test_requires_privilege() {
        let users = FakeUsers::new().unprivileged();
        let err = resolve_identity(&users, Some("alice")).await.unwrap_err();
        assert!(matches!(err, BootstrapError::NotPrivileged));
    }

    #[tokio::test]
    async fn test_resolves_delegated_account() {
        let home = tempfile::tempdir().unwrap();
        let users = users_with_home(home.path().to_path_buf());

        let identity = resolve_identity(&users, Some("alice")).await.unwrap();
        assert!(identity.privileged);
        assert!(identity.delegated);
        assert_eq!(identity.acting_user, "root");
        assert_eq!(identity.real_user, "alice");
        assert_eq!(identity.real_home, home.path());
        assert_eq!(identity.login_shell(), "/bin/bash");
    }

    #[tokio::test]
    async fn test_without_delegation_uses_acting_account() {
        let home = tempfile::tempdir().unwrap();
        let users = users_with_home(home.path().to_path_buf());

        for delegate in [None, Some(""), Some("root")] {
            let identity = resolve_identity(&users, delegate).await.unwrap();
            assert!(!identity.delegated);
            assert_eq!(identity.real_user, "root");
        }
    }

    #[tokio::test]
    async fn test_rejects_injected_delegate() {
        let home = tempfile::tempdir().unwrap();
        let users = users_with_home(home.path().to_path_buf());

        let err = resolve_identity(&users, Some("alice;id")).await.unwrap_err();
        assert!(matches!(err, BootstrapError::InvalidIdentifier { .. }));

        let err = resolve_identity(&users, Some("ghost")).await.unwrap_err();
        assert!(matches!(err, BootstrapError::InvalidIdentifier { .. }));
    }

    #[tokio::test]
    async fn test_missing_home_is_fatal() {
        let home = tempfile::tempdir().unwrap();
        let gone = home.path().join("does-not-exist");
        let users = users_with_home(gone);

        let err = resolve_identity(&users, Some("alice")).await.unwrap_err();
        assert!(matches!(err, BootstrapError::HomeUnresolvable { .. }));

        let users = users_with_home(PathBuf::new());
        let err = resolve_identity(&users, Some("alice")).await.unwrap_err();
        assert!(matches!(err, BootstrapError::HomeUnresolvable { .. }));
    }
}
