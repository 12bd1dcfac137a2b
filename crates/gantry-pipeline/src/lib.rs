//! Gantry pipeline engine.
//!
//! The stage sequencer and its collaborators:
//! - External command execution with timeouts and credential injection
//! - Stage definitions and the ordered sequencer
//! - Source checkout, image build and registry publish
//! - The account directory
//! - Post-execution hooks (workspace cleanup, failure notification)
//! - The assembled delivery pipeline
//!
//! In-memory fakes for every collaborator trait live in [`fakes`].

pub mod checkout;
pub mod delivery;
pub mod directory;
pub mod exec;
pub mod fakes;
pub mod hooks;
pub mod notify;
pub mod registry;
pub mod sequencer;
pub mod stage;

pub use checkout::{GitCheckout, SourceCheckout, DEFAULT_CHECKOUT_TIMEOUT};
pub use delivery::{DeliveryConfig, DeliveryPipeline, STAGE_NAMES};
pub use directory::AwsAccountDirectory;
pub use exec::{CommandOutput, ExternalCommand};
pub use hooks::{CleanupHook, HookDispatcher, InvocationMeta, WorkspaceCleanup};
pub use notify::{Notifier, Severity, WebhookNotifier};
pub use sequencer::{Sequencer, SequencerPolicy};
pub use stage::{CommandStage, Stage, StageAction, StageContext, StageStatus};
