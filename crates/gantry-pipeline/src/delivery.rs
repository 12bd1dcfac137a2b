//! The delivery pipeline: stage wiring and the run driver.
//!
//! [`DeliveryPipeline::execute`] is the single entry point for a run. It
//! resolves the target account before any stage starts, derives the run
//! context, hands the stage list to the sequencer, and always dispatches the
//! post-execution hooks against the terminal outcome.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use gantry_core::obs::{emit_run_finished, emit_run_started};
use gantry_core::{
    compute_pipeline_digest, resolve_account, with_credentials, AccountDirectory,
    CredentialBinding, CredentialStore, ImageCoordinates, PipelineError, PipelineParameters,
    ResolvedContext, Result, RunOutcome, RunSpan,
};
use uuid::Uuid;

use crate::checkout::{SourceCheckout, DEFAULT_CHECKOUT_TIMEOUT};
use crate::hooks::{CleanupHook, HookDispatcher, InvocationMeta};
use crate::notify::Notifier;
use crate::registry;
use crate::sequencer::Sequencer;
use crate::stage::{Stage, StageAction, StageContext, StageStatus};

/// Static pipeline configuration: where the source lives, what image to
/// publish, and which credential bindings the stages enter.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Source repository to check out.
    pub repository_url: String,

    /// Image coordinates to build and publish.
    pub image: ImageCoordinates,

    /// Notification channel for failure messages.
    pub channel: String,

    /// Base URL for run reports; the run id is appended.
    pub report_url_base: String,

    /// Workspace root owned by the run.
    pub workspace_root: PathBuf,

    /// Run number shown in the failure notification.
    pub run_number: String,

    /// Cloud principal used for account listing, checkout and publish.
    pub deploy_binding: CredentialBinding,

    /// Registry login credential.
    pub registry_binding: CredentialBinding,
}

impl DeliveryConfig {
    /// Read the configuration from `GANTRY_*` environment variables.
    ///
    /// `GANTRY_REPOSITORY_URL` is required; everything else has a default.
    pub fn from_env() -> Result<Self> {
        let repository_url = std::env::var("GANTRY_REPOSITORY_URL").map_err(|_| {
            PipelineError::InvalidConfig("GANTRY_REPOSITORY_URL is not set".to_string())
        })?;
        let repository = std::env::var("GANTRY_IMAGE_REPOSITORY")
            .unwrap_or_else(|_| "image-conversion".to_string());
        let tag = std::env::var("GANTRY_IMAGE_TAG").unwrap_or_else(|_| "latest".to_string());
        let channel =
            std::env::var("GANTRY_NOTIFY_CHANNEL").unwrap_or_else(|_| "#deployments".to_string());
        let report_url_base = std::env::var("GANTRY_REPORT_URL_BASE")
            .unwrap_or_else(|_| "https://gantry.invalid/runs".to_string());
        let workspace_root = std::env::var("GANTRY_WORKSPACE")
            .unwrap_or_else(|_| "/var/lib/gantry/workspace".to_string());
        let run_number = std::env::var("GANTRY_RUN_NUMBER").unwrap_or_else(|_| "0".to_string());

        Ok(Self {
            repository_url,
            image: ImageCoordinates::new(repository, tag),
            channel,
            report_url_base,
            workspace_root: PathBuf::from(workspace_root),
            run_number,
            deploy_binding: CredentialBinding::key_pair("deploy-key"),
            registry_binding: CredentialBinding::username_password("registry-login"),
        })
    }
}

/// Checks out the configured repository at the requested branch.
struct CheckoutStage {
    checkout: Arc<dyn SourceCheckout>,
    repository_url: String,
}

#[async_trait]
impl StageAction for CheckoutStage {
    async fn run(&self, ctx: &StageContext<'_>) -> Result<StageStatus> {
        self.checkout
            .checkout(
                &self.repository_url,
                &ctx.params.branch,
                ctx.workspace,
                ctx.credentials,
            )
            .await?;
        Ok(StageStatus::Passed)
    }
}

/// Builds the local image from the checked-out snapshot.
struct BuildStage;

#[async_trait]
impl StageAction for BuildStage {
    async fn run(&self, ctx: &StageContext<'_>) -> Result<StageStatus> {
        registry::build_image(
            &ctx.resolved.local_image,
            &ctx.workspace.join("source"),
            ctx.params.no_cache,
            ctx.credentials,
        )
        .await?;
        Ok(StageStatus::Passed)
    }
}

/// Authenticates to the derived registry endpoint.
struct LoginStage;

#[async_trait]
impl StageAction for LoginStage {
    async fn run(&self, ctx: &StageContext<'_>) -> Result<StageStatus> {
        registry::registry_login(&ctx.resolved.registry_host, ctx.credentials).await?;
        Ok(StageStatus::Passed)
    }
}

/// Tags and pushes the image to the registry.
struct PublishStage;

#[async_trait]
impl StageAction for PublishStage {
    async fn run(&self, ctx: &StageContext<'_>) -> Result<StageStatus> {
        registry::publish_image(
            &ctx.resolved.local_image,
            &ctx.resolved.remote_image,
            ctx.credentials,
        )
        .await?;
        Ok(StageStatus::Passed)
    }
}

/// Name of the pre-stage account resolution step, used as the failing stage
/// when resolution itself fails.
const RESOLVE_STEP: &str = "resolve_account";

/// Ordered stage names of the delivery pipeline.
pub const STAGE_NAMES: [&str; 4] = ["checkout", "build_image", "registry_login", "publish"];

/// The assembled delivery pipeline with its collaborators.
pub struct DeliveryPipeline<'a> {
    store: &'a dyn CredentialStore,
    directory: &'a dyn AccountDirectory,
    checkout: Arc<dyn SourceCheckout>,
    notifier: &'a dyn Notifier,
    cleanup: &'a dyn CleanupHook,
    config: DeliveryConfig,
}

impl<'a> DeliveryPipeline<'a> {
    pub fn new(
        store: &'a dyn CredentialStore,
        directory: &'a dyn AccountDirectory,
        checkout: Arc<dyn SourceCheckout>,
        notifier: &'a dyn Notifier,
        cleanup: &'a dyn CleanupHook,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            store,
            directory,
            checkout,
            notifier,
            cleanup,
            config,
        }
    }

    fn stages(&self) -> Vec<Stage> {
        vec![
            Stage::new(
                STAGE_NAMES[0],
                Arc::new(CheckoutStage {
                    checkout: Arc::clone(&self.checkout),
                    repository_url: self.config.repository_url.clone(),
                }),
            )
            .with_scope(self.config.deploy_binding.clone())
            .with_timeout(DEFAULT_CHECKOUT_TIMEOUT),
            Stage::new(STAGE_NAMES[1], Arc::new(BuildStage)),
            Stage::new(STAGE_NAMES[2], Arc::new(LoginStage))
                .with_scope(self.config.registry_binding.clone()),
            Stage::new(STAGE_NAMES[3], Arc::new(PublishStage))
                .with_scope(self.config.deploy_binding.clone()),
        ]
    }

    /// Ordered stage names, for the `plan` command.
    pub fn plan(&self) -> Vec<String> {
        self.stages().into_iter().map(|stage| stage.name).collect()
    }

    fn meta(&self, params: &PipelineParameters) -> InvocationMeta {
        InvocationMeta {
            environment: params.account_name.clone(),
            region: params.region.clone(),
            branch: params.branch.clone(),
            run_number: self.config.run_number.clone(),
            initiated_by: params.initiated_by.clone(),
            report_url: format!(
                "{}/{}",
                self.config.report_url_base.trim_end_matches('/'),
                self.config.run_number
            ),
        }
    }

    /// Resolve the target account under the deploy credential scope.
    ///
    /// Runs before any stage; an unknown account name aborts the run here.
    async fn resolve_target(&self, params: &PipelineParameters) -> Result<ResolvedContext> {
        let bindings = [self.config.deploy_binding.clone()];
        let accounts = with_credentials(self.store, &bindings, |scope| async move {
            self.directory.list_accounts(&scope).await
        })
        .await?;
        let account = resolve_account(&accounts, &params.account_name)?;
        Ok(ResolvedContext::build(&account, params, &self.config.image))
    }

    /// Run the pipeline to its terminal outcome.
    ///
    /// Never returns an error: every failure is folded into the outcome, and
    /// the post-execution hooks are dispatched on every path.
    pub async fn execute(&self, params: &PipelineParameters) -> RunOutcome {
        let run_id = Uuid::new_v4().to_string();
        let _span = RunSpan::enter(&run_id);
        let start = Instant::now();

        let stages = self.stages();
        let stage_names: Vec<String> = stages.iter().map(|stage| stage.name.clone()).collect();
        let digest = compute_pipeline_digest(
            &stage_names,
            &format!("{}:{}", self.config.image.repository, self.config.image.tag),
        );
        emit_run_started(&run_id, &digest, &params.region);

        let outcome = match self.resolve_target(params).await {
            Ok(resolved) => {
                Sequencer::new(self.store)
                    .run(
                        &run_id,
                        &stages,
                        params,
                        &resolved,
                        &self.config.workspace_root,
                    )
                    .await
            }
            Err(err) => RunOutcome::failure(
                &run_id,
                RESOLVE_STEP,
                err.to_string(),
                vec![],
                start.elapsed().as_millis() as u64,
            ),
        };

        HookDispatcher::new(self.cleanup, self.notifier, &self.config.channel)
            .dispatch(&outcome, &self.meta(params))
            .await;

        emit_run_finished(&run_id, outcome.duration_ms, outcome.succeeded());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{
        FakeCheckout, MemoryAccountDirectory, MemoryCredentialStore, MemoryNotifier,
        RecordingCleanup,
    };
    use gantry_core::Account;

    fn config(workspace: PathBuf) -> DeliveryConfig {
        DeliveryConfig {
            repository_url: "https://git.example.com/image-conversion.git".to_string(),
            image: ImageCoordinates::new("image-conversion", "latest"),
            channel: "#deployments".to_string(),
            report_url_base: "https://ci.example.com/runs".to_string(),
            workspace_root: workspace,
            run_number: "42".to_string(),
            deploy_binding: CredentialBinding::key_pair("deploy-key"),
            registry_binding: CredentialBinding::username_password("registry-login"),
        }
    }

    #[test]
    fn test_plan_lists_stages_in_order() {
        let store = MemoryCredentialStore::default();
        let directory = MemoryAccountDirectory::new(vec![]);
        let notifier = MemoryNotifier::default();
        let cleanup = RecordingCleanup::default();
        let pipeline = DeliveryPipeline::new(
            &store,
            &directory,
            Arc::new(FakeCheckout::default()),
            &notifier,
            &cleanup,
            config(PathBuf::from(".")),
        );

        assert_eq!(
            pipeline.plan(),
            vec!["checkout", "build_image", "registry_login", "publish"]
        );
    }

    #[tokio::test]
    async fn test_unknown_account_fails_before_any_stage() {
        let store = MemoryCredentialStore::default();
        store.insert_key_pair("deploy-key", "AKIA1", "secret");
        let directory =
            MemoryAccountDirectory::new(vec![Account::new("Matter Software Ltd", "123456789012")]);
        let notifier = MemoryNotifier::default();
        let cleanup = RecordingCleanup::default();
        let checkout = Arc::new(FakeCheckout::default());
        let pipeline = DeliveryPipeline::new(
            &store,
            &directory,
            Arc::clone(&checkout) as Arc<dyn SourceCheckout>,
            &notifier,
            &cleanup,
            config(PathBuf::from(".")),
        );

        let params = PipelineParameters::new("No Such Account");
        let outcome = pipeline.execute(&params).await;

        assert!(!outcome.succeeded());
        assert_eq!(outcome.failing_stage.as_deref(), Some("resolve_account"));
        assert!(outcome.stages.is_empty(), "no stage may start");
        assert_eq!(checkout.calls(), 0);
        // Hooks still fire for a pre-stage failure.
        assert_eq!(cleanup.calls(), 1);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_deploy_binding_fails_resolution() {
        let store = MemoryCredentialStore::default();
        let directory =
            MemoryAccountDirectory::new(vec![Account::new("Matter Software Ltd", "123456789012")]);
        let notifier = MemoryNotifier::default();
        let cleanup = RecordingCleanup::default();
        let pipeline = DeliveryPipeline::new(
            &store,
            &directory,
            Arc::new(FakeCheckout::default()),
            &notifier,
            &cleanup,
            config(PathBuf::from(".")),
        );

        let params = PipelineParameters::new("Matter Software Ltd");
        let outcome = pipeline.execute(&params).await;

        assert!(!outcome.succeeded());
        let detail = outcome.error_detail.unwrap_or_default();
        assert!(detail.contains("deploy-key"), "unexpected detail: {detail}");
        assert_eq!(directory.calls(), 0, "listing needs the scope first");
    }
}
