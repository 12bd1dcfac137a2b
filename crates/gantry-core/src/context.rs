//! Invocation parameters and the derived run context.
//!
//! [`ResolvedContext::build`] is a pure function of the resolved account and
//! the invocation parameters: no I/O, deterministic, idempotent. Stages may
//! recompute derived values with the same formula and get byte-identical
//! results, so there is no hidden mutable environment between stages.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::account::Account;

/// Default deployment region when none is supplied.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Immutable configuration supplied at invocation time. Created once per
/// run, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineParameters {
    /// Deployment region identifier.
    pub region: String,

    /// Account name to resolve against the allow-list.
    pub account_name: String,

    /// Source branch to check out and build.
    pub branch: String,

    /// Skip the image build cache.
    pub no_cache: bool,

    /// Who started the run (for the failure notification).
    pub initiated_by: String,
}

impl PipelineParameters {
    pub fn new(account_name: impl Into<String>) -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            account_name: account_name.into(),
            branch: "main".to_string(),
            no_cache: false,
            initiated_by: "gantry".to_string(),
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }
}

/// Statically declared image coordinates for the service being delivered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageCoordinates {
    /// Repository name inside the registry.
    pub repository: String,

    /// Image tag to build and publish.
    pub tag: String,
}

impl ImageCoordinates {
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
        }
    }
}

/// Read-only configuration derived once per run from the resolved account
/// and the invocation parameters. Shared by all stages; no stage mutates it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedContext {
    /// Resolved cloud account id.
    pub account_id: String,

    /// Deployment region.
    pub region: String,

    /// Registry endpoint derived from account id and region.
    pub registry_host: String,

    /// Local image reference (`repository:tag`).
    pub local_image: String,

    /// Fully qualified remote image reference.
    pub remote_image: String,
}

impl ResolvedContext {
    /// Derive the context. Pure and idempotent: identical inputs yield
    /// byte-identical output.
    pub fn build(account: &Account, params: &PipelineParameters, image: &ImageCoordinates) -> Self {
        let registry_host = format!("{}.dkr.ecr.{}.amazonaws.com", account.id, params.region);
        let local_image = format!("{}:{}", image.repository, image.tag);
        let remote_image = format!("{}/{}", registry_host, local_image);
        Self {
            account_id: account.id.clone(),
            region: params.region.clone(),
            registry_host,
            local_image,
            remote_image,
        }
    }
}

/// Stable digest of a pipeline definition, for run identity in logs.
///
/// Hashes the ordered stage names and the publish destination, so two runs
/// of the same pipeline shape share an identity prefix.
pub fn compute_pipeline_digest(stage_names: &[String], remote_image: &str) -> String {
    let mut hasher = Sha256::new();
    for name in stage_names {
        hasher.update(name.as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(remote_image.as_bytes());
    hex::encode(hasher.finalize())
}
