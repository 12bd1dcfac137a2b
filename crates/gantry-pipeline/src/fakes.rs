//! In-memory fakes for collaborator traits (testing only).
//!
//! Satisfy the trait contracts without subprocesses or network access.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use gantry_core::{
    Account, AccountDirectory, CredentialBinding, CredentialStore, PipelineError,
    ResolvedCredential, Result, ScopedCredentials, SecretValue,
};

use crate::checkout::SourceCheckout;
use crate::hooks::CleanupHook;
use crate::notify::{Notifier, Severity};

// ---------------------------------------------------------------------------
// MemoryCredentialStore
// ---------------------------------------------------------------------------

/// Credential store backed by a `HashMap<binding id, vars>`.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, Vec<(String, String)>>>,
}

impl MemoryCredentialStore {
    pub fn insert_key_pair(&self, id: &str, access_key: &str, secret_key: &str) {
        self.entries.lock().unwrap().insert(
            id.to_string(),
            vec![
                ("AWS_ACCESS_KEY_ID".to_string(), access_key.to_string()),
                ("AWS_SECRET_ACCESS_KEY".to_string(), secret_key.to_string()),
            ],
        );
    }

    pub fn insert_username_password(&self, id: &str, username: &str, password: &str) {
        self.entries.lock().unwrap().insert(
            id.to_string(),
            vec![
                ("REGISTRY_USERNAME".to_string(), username.to_string()),
                ("REGISTRY_PASSWORD".to_string(), password.to_string()),
            ],
        );
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn resolve(&self, binding: &CredentialBinding) -> Result<ResolvedCredential> {
        let entries = self.entries.lock().unwrap();
        let vars = entries
            .get(&binding.id)
            .ok_or_else(|| PipelineError::CredentialResolution {
                id: binding.id.clone(),
            })?;
        Ok(ResolvedCredential::new(
            binding.clone(),
            vars.iter()
                .map(|(k, v)| (k.clone(), SecretValue::new(v.clone())))
                .collect(),
        ))
    }
}

// ---------------------------------------------------------------------------
// MemoryAccountDirectory
// ---------------------------------------------------------------------------

/// Account directory serving a fixed allow-list.
#[derive(Debug, Default)]
pub struct MemoryAccountDirectory {
    accounts: Vec<Account>,
    calls: AtomicUsize,
}

impl MemoryAccountDirectory {
    pub fn new(accounts: Vec<Account>) -> Self {
        Self {
            accounts,
            calls: AtomicUsize::new(0),
        }
    }

    /// How many times the directory was listed.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountDirectory for MemoryAccountDirectory {
    async fn list_accounts(&self, _credentials: &ScopedCredentials) -> Result<Vec<Account>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.accounts.clone())
    }
}

// ---------------------------------------------------------------------------
// MemoryNotifier
// ---------------------------------------------------------------------------

/// A message captured by [`MemoryNotifier`].
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub channel: String,
    pub message: String,
    pub severity: Severity,
}

/// Notifier that records messages instead of delivering them.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<SentMessage>>,
    fail: bool,
}

impl MemoryNotifier {
    /// Make every send fail, for best-effort delivery tests.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send(&self, channel: &str, message: &str, severity: Severity) -> Result<()> {
        if self.fail {
            return Err(PipelineError::Notification("delivery refused".to_string()));
        }
        self.sent.lock().unwrap().push(SentMessage {
            channel: channel.to_string(),
            message: message.to_string(),
            severity,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Cleanup hooks
// ---------------------------------------------------------------------------

/// Cleanup hook that only counts invocations.
#[derive(Debug, Default)]
pub struct RecordingCleanup {
    calls: AtomicUsize,
}

impl RecordingCleanup {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CleanupHook for RecordingCleanup {
    async fn clean(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Cleanup hook that always fails.
#[derive(Debug, Default)]
pub struct FailingCleanup;

#[async_trait]
impl CleanupHook for FailingCleanup {
    async fn clean(&self) -> Result<()> {
        Err(PipelineError::InvalidConfig(
            "workspace reset refused".to_string(),
        ))
    }
}

// ---------------------------------------------------------------------------
// FakeCheckout
// ---------------------------------------------------------------------------

/// Checkout that creates an empty snapshot directory.
#[derive(Debug, Default)]
pub struct FakeCheckout {
    calls: AtomicUsize,
}

impl FakeCheckout {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceCheckout for FakeCheckout {
    async fn checkout(
        &self,
        _repository_url: &str,
        _branch: &str,
        workspace: &std::path::Path,
        _credentials: &ScopedCredentials,
    ) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let snapshot = workspace.join("source");
        tokio::fs::create_dir_all(&snapshot).await?;
        Ok(snapshot)
    }
}
