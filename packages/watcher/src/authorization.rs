//! Authorization Set
//!
//! Only accounts followed by the master account may publish podpings. The set
//! is fetched from a `Directory` and replaced wholesale on every refresh.

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::error::WatcherError;

/// Account whose follow list authorizes podping publishers
pub const DEFAULT_MASTER_ACCOUNT: &str = "podping";

/// Lookup failure reported by a directory
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct DirectoryError(pub String);

/// Resolves the accounts an account follows
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Directory: Send + Sync {
    async fn following(&self, account: &str) -> Result<Vec<String>, DirectoryError>;
}

/// Accounts allowed to publish watched operations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationSet {
    accounts: HashSet<String>,
}

impl AuthorizationSet {
    pub fn new<I, S>(accounts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            accounts: accounts.into_iter().map(Into::into).collect(),
        }
    }

    /// Resolve the follow list of `master_account`
    ///
    /// # Arguments
    /// * `directory` - Lookup backend
    /// * `master_account` - Account whose follows are authorized
    ///
    /// # Returns
    /// The authorization set, or `WatcherError::DirectoryUnavailable`
    pub async fn fetch(
        directory: &dyn Directory,
        master_account: &str,
    ) -> Result<Self, WatcherError> {
        let following = directory
            .following(master_account)
            .await
            .map_err(|e| WatcherError::DirectoryUnavailable {
                account: master_account.to_string(),
                reason: e.0,
            })?;

        let set = Self::new(following);
        info!("Authorized {} accounts followed by {}", set.len(), master_account);
        Ok(set)
    }

    /// Check if any publisher is authorized
    pub fn intersects<S: AsRef<str>>(&self, publishers: &[S]) -> bool {
        publishers.iter().any(|p| self.accounts.contains(p.as_ref()))
    }

    pub fn contains(&self, account: &str) -> bool {
        self.accounts.contains(account)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
