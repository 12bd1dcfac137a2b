//! Scoped credential bindings.
//!
//! A [`CredentialBinding`] is an opaque handle; the concrete secret material
//! only exists inside a [`ScopedCredentials`] value resolved from a
//! [`CredentialStore`]. Dropping the scope wipes the material, so secrets
//! cannot outlive the block of work they were resolved for — on normal
//! return, error, and cancellation alike.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Shape of the secret material behind a binding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// Access-key / secret-key pair for a cloud principal.
    KeyPair,

    /// Username and password, e.g. for a registry login.
    UsernamePassword,
}

/// Opaque handle to a credential in the external store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CredentialBinding {
    /// Store-assigned identifier.
    pub id: String,

    /// Material shape.
    pub kind: CredentialKind,
}

impl CredentialBinding {
    pub fn key_pair(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: CredentialKind::KeyPair,
        }
    }

    pub fn username_password(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: CredentialKind::UsernamePassword,
        }
    }
}

/// Secret material. Never logged, never serialized; wiped on drop.
#[derive(Clone)]
pub struct SecretValue {
    bytes: Vec<u8>,
}

impl SecretValue {
    pub fn new(material: impl Into<String>) -> Self {
        Self {
            bytes: material.into().into_bytes(),
        }
    }

    /// Borrow the material. Only valid while the owning scope is alive.
    pub fn expose(&self) -> &str {
        std::str::from_utf8(&self.bytes).unwrap_or("")
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue(<redacted>)")
    }
}

impl Drop for SecretValue {
    fn drop(&mut self) {
        for byte in self.bytes.iter_mut() {
            *byte = 0;
        }
        self.bytes.clear();
    }
}

/// Secret environment variables resolved for one binding.
#[derive(Debug, Clone)]
pub struct ResolvedCredential {
    pub binding: CredentialBinding,
    vars: Vec<(String, SecretValue)>,
}

impl ResolvedCredential {
    pub fn new(binding: CredentialBinding, vars: Vec<(String, SecretValue)>) -> Self {
        Self { binding, vars }
    }
}

/// External credential store. Resolution fails with
/// [`PipelineError::CredentialResolution`] for unknown binding ids.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn resolve(&self, binding: &CredentialBinding) -> Result<ResolvedCredential>;
}

/// An active credential scope: an ordered stack of resolved bindings.
///
/// Later layers shadow earlier ones that export the same variable name.
/// The environment view is only reachable through a live scope value;
/// dropping it wipes every secret.
#[derive(Debug, Default)]
pub struct ScopedCredentials {
    layers: Vec<ResolvedCredential>,
}

impl ScopedCredentials {
    /// A scope with no bindings, for stages that need none.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Resolve `bindings` in order and enter the scope.
    pub async fn enter(
        store: &dyn CredentialStore,
        bindings: &[CredentialBinding],
    ) -> Result<Self> {
        let mut layers = Vec::with_capacity(bindings.len());
        for binding in bindings {
            layers.push(store.resolve(binding).await?);
        }
        Ok(Self { layers })
    }

    /// Enter a nested scope: this scope's layers plus `bindings` on top.
    pub async fn nested(
        &self,
        store: &dyn CredentialStore,
        bindings: &[CredentialBinding],
    ) -> Result<Self> {
        let mut layers = self.layers.clone();
        for binding in bindings {
            layers.push(store.resolve(binding).await?);
        }
        Ok(Self { layers })
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Look up a single variable, innermost binding first.
    pub fn get(&self, var: &str) -> Option<&str> {
        self.layers.iter().rev().find_map(|layer| {
            layer
                .vars
                .iter()
                .find(|(name, _)| name == var)
                .map(|(_, value)| value.expose())
        })
    }

    /// Materialize the environment for a child process. Inner layers shadow
    /// outer ones sharing a variable name.
    pub fn env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        for layer in &self.layers {
            for (name, value) in &layer.vars {
                env.insert(name.clone(), value.expose().to_string());
            }
        }
        env
    }
}

/// Run `body` with the given bindings resolved into a scope.
///
/// The scope is handed to `body` by value and dropped (wiped) when the
/// returned future completes or is cancelled.
pub async fn with_credentials<F, Fut, T>(
    store: &dyn CredentialStore,
    bindings: &[CredentialBinding],
    body: F,
) -> Result<T>
where
    F: FnOnce(ScopedCredentials) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let scope = ScopedCredentials::enter(store, bindings).await?;
    body(scope).await
}

/// Credential store backed by process environment variables.
///
/// A binding `deploy-key` of kind `KeyPair` resolves from
/// `<PREFIX>_DEPLOY_KEY_ACCESS_KEY_ID` / `<PREFIX>_DEPLOY_KEY_SECRET_ACCESS_KEY`
/// and exports the standard `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`
/// pair into the scope. `UsernamePassword` bindings resolve `_USERNAME` /
/// `_PASSWORD` and export `REGISTRY_USERNAME` / `REGISTRY_PASSWORD`.
pub struct EnvCredentialStore {
    prefix: String,
}

impl EnvCredentialStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Default prefix used by the `gantry` binary.
    pub fn from_env() -> Self {
        Self::new("GANTRY")
    }

    fn lookup(&self, binding_id: &str, suffix: &str) -> Result<SecretValue> {
        let key = format!(
            "{}_{}_{}",
            self.prefix,
            binding_id.to_uppercase().replace('-', "_"),
            suffix
        );
        std::env::var(&key)
            .map(SecretValue::new)
            .map_err(|_| PipelineError::CredentialResolution {
                id: binding_id.to_string(),
            })
    }
}

#[async_trait]
impl CredentialStore for EnvCredentialStore {
    async fn resolve(&self, binding: &CredentialBinding) -> Result<ResolvedCredential> {
        let vars = match binding.kind {
            CredentialKind::KeyPair => vec![
                (
                    "AWS_ACCESS_KEY_ID".to_string(),
                    self.lookup(&binding.id, "ACCESS_KEY_ID")?,
                ),
                (
                    "AWS_SECRET_ACCESS_KEY".to_string(),
                    self.lookup(&binding.id, "SECRET_ACCESS_KEY")?,
                ),
            ],
            CredentialKind::UsernamePassword => vec![
                (
                    "REGISTRY_USERNAME".to_string(),
                    self.lookup(&binding.id, "USERNAME")?,
                ),
                (
                    "REGISTRY_PASSWORD".to_string(),
                    self.lookup(&binding.id, "PASSWORD")?,
                ),
            ],
        };
        Ok(ResolvedCredential::new(binding.clone(), vars))
    }
}
