//! Source checkout collaborator.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use gantry_core::{Result, ScopedCredentials};

use crate::exec::ExternalCommand;

/// Default bound on a checkout, per the pipeline definition.
pub const DEFAULT_CHECKOUT_TIMEOUT: Duration = Duration::from_secs(60);

/// Fetches a workspace snapshot of the source repository.
#[async_trait]
pub trait SourceCheckout: Send + Sync {
    /// Check out `branch` of `repository_url` into `workspace`, returning
    /// the snapshot path. Bounded by the implementation's timeout.
    async fn checkout(
        &self,
        repository_url: &str,
        branch: &str,
        workspace: &Path,
        credentials: &ScopedCredentials,
    ) -> Result<PathBuf>;
}

/// Git-based checkout: a shallow clone of the requested branch.
pub struct GitCheckout {
    timeout: Duration,
}

impl GitCheckout {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_CHECKOUT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for GitCheckout {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceCheckout for GitCheckout {
    async fn checkout(
        &self,
        repository_url: &str,
        branch: &str,
        workspace: &Path,
        credentials: &ScopedCredentials,
    ) -> Result<PathBuf> {
        let snapshot = workspace.join("source");
        ExternalCommand::new("checkout", "git")
            .args([
                "clone",
                "--depth",
                "1",
                "--branch",
                branch,
                repository_url,
            ])
            .arg(snapshot.to_string_lossy().to_string())
            .credentials(credentials)
            .timeout(self.timeout)
            .run_checked()
            .await?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeout_is_one_minute() {
        let checkout = GitCheckout::new();
        assert_eq!(checkout.timeout, Duration::from_secs(60));
    }
}
