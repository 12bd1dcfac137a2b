//! Organization account directory backed by the cloud CLI.

use async_trait::async_trait;
use gantry_core::{Account, AccountDirectory, PipelineError, Result, ScopedCredentials};
use serde::Deserialize;

use crate::exec::ExternalCommand;

#[derive(Debug, Deserialize)]
struct ListAccountsResponse {
    #[serde(rename = "Accounts")]
    accounts: Vec<AccountRecord>,
}

#[derive(Debug, Deserialize)]
struct AccountRecord {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
}

/// Lists organization accounts with `aws organizations list-accounts`.
///
/// The listing runs under the caller's credential scope; the directory
/// itself holds no credential material.
pub struct AwsAccountDirectory {
    region: String,
}

impl AwsAccountDirectory {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
        }
    }
}

#[async_trait]
impl AccountDirectory for AwsAccountDirectory {
    async fn list_accounts(&self, credentials: &ScopedCredentials) -> Result<Vec<Account>> {
        let output = ExternalCommand::new("resolve_account", "aws")
            .args(["organizations", "list-accounts", "--output", "json"])
            .env_var("AWS_DEFAULT_REGION", &self.region)
            .credentials(credentials)
            .run_checked()
            .await?;

        let response: ListAccountsResponse = serde_json::from_str(&output.stdout)
            .map_err(|err| PipelineError::InvalidConfig(format!("account listing: {err}")))?;

        Ok(response
            .accounts
            .into_iter()
            .map(|record| Account::new(record.name, record.id))
            .collect())
    }
}
