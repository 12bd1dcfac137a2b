//! Deployment accounts and the fail-fast resolver.
//!
//! The account list is an externally supplied allow-list of deployment
//! targets. Resolution happens at most once per run, before any build or
//! publish stage executes: no account means no valid target.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::credentials::ScopedCredentials;
use crate::error::{PipelineError, Result};

/// A named deployment target (cloud tenant).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    /// Human-readable account name, matched exactly.
    pub name: String,

    /// Cloud account identifier (e.g. a 12-digit AWS account id).
    pub id: String,
}

impl Account {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }
}

/// Collaborator that lists the known deployment accounts.
///
/// Listing requires an authenticated, region-aware principal; callers must
/// invoke this inside an active credential scope.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn list_accounts(&self, credentials: &ScopedCredentials) -> Result<Vec<Account>>;
}

/// Exact-match lookup by account name.
///
/// Order-independent; the first match wins if duplicates exist (duplicates
/// are not expected and not deduplicated). Fails with
/// [`PipelineError::AccountNotFound`] so the run aborts before any stage.
pub fn resolve_account(accounts: &[Account], name: &str) -> Result<Account> {
    accounts
        .iter()
        .find(|account| account.name == name)
        .cloned()
        .ok_or_else(|| PipelineError::AccountNotFound {
            name: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_accounts() -> Vec<Account> {
        vec![
            Account::new("Matter Software Ltd", "123456789012"),
            Account::new("Matter Staging", "210987654321"),
        ]
    }

    #[test]
    fn test_resolve_exact_match() {
        let account = resolve_account(&sample_accounts(), "Matter Software Ltd").unwrap();
        assert_eq!(account.id, "123456789012");
    }

    #[test]
    fn test_resolve_unknown_name_fails() {
        let err = resolve_account(&sample_accounts(), "Other Corp").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::AccountNotFound { name } if name == "Other Corp"
        ));
    }

    #[test]
    fn test_resolve_first_match_wins_on_duplicates() {
        let accounts = vec![
            Account::new("Matter Software Ltd", "111111111111"),
            Account::new("Matter Software Ltd", "222222222222"),
        ];
        let account = resolve_account(&accounts, "Matter Software Ltd").unwrap();
        assert_eq!(account.id, "111111111111");
    }

    #[test]
    fn test_resolve_empty_list_fails() {
        let err = resolve_account(&[], "Matter Software Ltd").unwrap_err();
        assert!(matches!(err, PipelineError::AccountNotFound { .. }));
    }
}
