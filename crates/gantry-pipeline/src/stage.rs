//! Stage definitions.
//!
//! A [`Stage`] is a named, ordered unit of work: zero or more credential
//! scopes, an optional timeout, and an action. Stages are defined statically
//! before the run starts and never change during it.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gantry_core::{
    CredentialBinding, PipelineParameters, ResolvedContext, Result, ScopedCredentials,
};

use crate::exec::ExternalCommand;

/// Result of a stage body. `Unstable` completes the stage but may halt the
/// remaining sequence depending on the sequencer policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Passed,
    Unstable,
}

/// Read-only view handed to a stage body.
///
/// Credential material is only reachable through `credentials`, which is
/// alive exactly as long as the stage executes.
pub struct StageContext<'a> {
    pub params: &'a PipelineParameters,
    pub resolved: &'a ResolvedContext,
    pub credentials: &'a ScopedCredentials,
    pub workspace: &'a Path,
}

/// Body of a stage. Implementations invoke external commands and propagate
/// their exit status as errors.
#[async_trait]
pub trait StageAction: Send + Sync {
    async fn run(&self, ctx: &StageContext<'_>) -> Result<StageStatus>;
}

/// A named, ordered unit of pipeline work.
#[derive(Clone)]
pub struct Stage {
    /// Human-readable stage name.
    pub name: String,

    /// Credential scopes entered for the duration of the body, in order;
    /// later bindings shadow earlier ones sharing a variable.
    pub scopes: Vec<CredentialBinding>,

    /// Optional execution bound. Exceeding it fails the stage and the run.
    pub timeout: Option<Duration>,

    /// The stage body.
    pub action: Arc<dyn StageAction>,
}

impl Stage {
    pub fn new(name: impl Into<String>, action: Arc<dyn StageAction>) -> Self {
        Self {
            name: name.into(),
            scopes: Vec::new(),
            timeout: None,
            action,
        }
    }

    pub fn with_scope(mut self, binding: CredentialBinding) -> Self {
        self.scopes.push(binding);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("scopes", &self.scopes)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Stage action that runs a single external command in the workspace, with
/// the stage's scoped credentials injected into the child environment.
pub struct CommandStage {
    program: String,
    args: Vec<String>,
}

impl CommandStage {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

#[async_trait]
impl StageAction for CommandStage {
    async fn run(&self, ctx: &StageContext<'_>) -> Result<StageStatus> {
        ExternalCommand::new(&self.program, &self.program)
            .args(self.args.clone())
            .cwd(ctx.workspace)
            .credentials(ctx.credentials)
            .run_checked()
            .await?;
        Ok(StageStatus::Passed)
    }
}
