//! Gantry core domain model.
//!
//! Leaf components of the delivery pipeline:
//! - Deployment accounts and the fail-fast resolver
//! - Scoped credential bindings with guaranteed release
//! - The derived, read-only run context
//! - The terminal run outcome
//! - Observability helpers (run spans, lifecycle events, tracing init)

pub mod account;
pub mod context;
pub mod credentials;
pub mod error;
pub mod obs;
pub mod outcome;
pub mod telemetry;

pub use account::{resolve_account, Account, AccountDirectory};
pub use context::{
    compute_pipeline_digest, ImageCoordinates, PipelineParameters, ResolvedContext, DEFAULT_REGION,
};
pub use credentials::{
    with_credentials, CredentialBinding, CredentialKind, CredentialStore, EnvCredentialStore,
    ResolvedCredential, ScopedCredentials, SecretValue,
};
pub use error::{PipelineError, Result};
pub use obs::RunSpan;
pub use outcome::{RunOutcome, RunStatus, StageDisposition, StageReport};
pub use telemetry::init_tracing;

/// Gantry version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
