//! The stage sequencer.
//!
//! Executes stages strictly in order, one at a time. Each stage enters its
//! declared credential scopes, is bounded by its declared timeout, and runs
//! its body to completion before the next stage starts. Failure is terminal:
//! there is no retry and no later stage executes. An `Unstable` completion
//! halts the remaining sequence when the policy says so — an explicit early
//! return, not a signal.

use std::path::Path;
use std::time::Instant;

use gantry_core::obs::{emit_stage_finished, emit_stage_started};
use gantry_core::{
    CredentialStore, PipelineError, PipelineParameters, ResolvedContext, Result, RunOutcome,
    ScopedCredentials, StageDisposition, StageReport,
};

use crate::stage::{Stage, StageContext, StageStatus};

/// Sequencing policy.
#[derive(Debug, Clone, Copy)]
pub struct SequencerPolicy {
    /// Stop before the next stage when a stage completes `Unstable`.
    pub halt_on_unstable: bool,
}

impl Default for SequencerPolicy {
    fn default() -> Self {
        Self {
            halt_on_unstable: true,
        }
    }
}

/// Ordered stage executor. Single logical thread of control: no stage
/// overlaps another, and no two scopes for the same binding are active at
/// once within a run.
pub struct Sequencer<'a> {
    store: &'a dyn CredentialStore,
    policy: SequencerPolicy,
}

impl<'a> Sequencer<'a> {
    pub fn new(store: &'a dyn CredentialStore) -> Self {
        Self {
            store,
            policy: SequencerPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: SequencerPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run the stages in order and fold every error into the outcome.
    ///
    /// The returned [`RunOutcome`] is the single terminal record for the
    /// sequence; callers dispatch post-execution hooks against it.
    pub async fn run(
        &self,
        run_id: &str,
        stages: &[Stage],
        params: &PipelineParameters,
        resolved: &ResolvedContext,
        workspace: &Path,
    ) -> RunOutcome {
        let start = Instant::now();
        let mut reports = Vec::with_capacity(stages.len());

        for stage in stages {
            emit_stage_started(run_id, &stage.name);
            let stage_start = Instant::now();

            let result = self
                .execute_stage(stage, params, resolved, workspace)
                .await;
            let stage_ms = stage_start.elapsed().as_millis() as u64;

            match result {
                Ok(StageStatus::Passed) => {
                    emit_stage_finished(run_id, &stage.name, "passed", stage_ms);
                    reports.push(StageReport {
                        name: stage.name.clone(),
                        disposition: StageDisposition::Passed,
                        duration_ms: stage_ms,
                    });
                }
                Ok(StageStatus::Unstable) => {
                    emit_stage_finished(run_id, &stage.name, "unstable", stage_ms);
                    reports.push(StageReport {
                        name: stage.name.clone(),
                        disposition: StageDisposition::Unstable,
                        duration_ms: stage_ms,
                    });
                    if self.policy.halt_on_unstable {
                        let mut outcome = RunOutcome::success(
                            run_id,
                            reports,
                            start.elapsed().as_millis() as u64,
                        );
                        outcome.halted_after = Some(stage.name.clone());
                        return outcome;
                    }
                }
                Err(err) => {
                    emit_stage_finished(run_id, &stage.name, "failed", stage_ms);
                    reports.push(StageReport {
                        name: stage.name.clone(),
                        disposition: StageDisposition::Failed,
                        duration_ms: stage_ms,
                    });
                    return RunOutcome::failure(
                        run_id,
                        stage.name.clone(),
                        err.to_string(),
                        reports,
                        start.elapsed().as_millis() as u64,
                    );
                }
            }
        }

        RunOutcome::success(run_id, reports, start.elapsed().as_millis() as u64)
    }

    /// Enter the stage's credential scopes, bound execution by its timeout,
    /// and run the body. The scope is dropped — and its material wiped — on
    /// every exit path.
    async fn execute_stage(
        &self,
        stage: &Stage,
        params: &PipelineParameters,
        resolved: &ResolvedContext,
        workspace: &Path,
    ) -> Result<StageStatus> {
        let scope = ScopedCredentials::enter(self.store, &stage.scopes).await?;
        let ctx = StageContext {
            params,
            resolved,
            credentials: &scope,
            workspace,
        };

        match stage.timeout {
            Some(timeout) => tokio::time::timeout(timeout, stage.action.run(&ctx))
                .await
                .map_err(|_| PipelineError::StageTimeout {
                    stage: stage.name.clone(),
                    timeout_secs: timeout.as_secs(),
                })?,
            None => stage.action.run(&ctx).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::MemoryCredentialStore;
    use crate::stage::{CommandStage, StageAction};
    use async_trait::async_trait;
    use gantry_core::{Account, CredentialBinding, ImageCoordinates, RunStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct CountingStage {
        calls: Arc<AtomicUsize>,
        status: StageStatus,
    }

    #[async_trait]
    impl StageAction for CountingStage {
        async fn run(&self, _ctx: &StageContext<'_>) -> Result<StageStatus> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.status)
        }
    }

    fn fixtures() -> (PipelineParameters, ResolvedContext) {
        let params = PipelineParameters::new("Matter Software Ltd");
        let resolved = ResolvedContext::build(
            &Account::new("Matter Software Ltd", "123456789012"),
            &params,
            &ImageCoordinates::new("image-conversion", "latest"),
        );
        (params, resolved)
    }

    fn counting(calls: &Arc<AtomicUsize>, status: StageStatus) -> Arc<dyn StageAction> {
        Arc::new(CountingStage {
            calls: Arc::clone(calls),
            status,
        })
    }

    #[tokio::test]
    async fn test_all_stages_pass_in_order() {
        let store = MemoryCredentialStore::default();
        let (params, resolved) = fixtures();
        let calls = Arc::new(AtomicUsize::new(0));

        let stages = vec![
            Stage::new("checkout", counting(&calls, StageStatus::Passed)),
            Stage::new("build_image", counting(&calls, StageStatus::Passed)),
        ];

        let outcome = Sequencer::new(&store)
            .run("run-1", &stages, &params, &resolved, Path::new("."))
            .await;

        assert_eq!(outcome.status, RunStatus::Succeeded);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.stages.len(), 2);
        assert!(outcome.halted_after.is_none());
    }

    #[tokio::test]
    async fn test_failure_is_terminal_for_the_run() {
        let store = MemoryCredentialStore::default();
        let (params, resolved) = fixtures();
        let later_calls = Arc::new(AtomicUsize::new(0));

        let stages = vec![
            Stage::new("build_image", Arc::new(CommandStage::new("false"))),
            Stage::new("publish", counting(&later_calls, StageStatus::Passed)),
        ];

        let outcome = Sequencer::new(&store)
            .run("run-1", &stages, &params, &resolved, Path::new("."))
            .await;

        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.failing_stage.as_deref(), Some("build_image"));
        assert_eq!(later_calls.load(Ordering::SeqCst), 0, "no later stage runs");
    }

    #[tokio::test]
    async fn test_timeout_fails_stage_and_run() {
        let store = MemoryCredentialStore::default();
        let (params, resolved) = fixtures();

        let stages = vec![Stage::new(
            "build_image",
            Arc::new(CommandStage::new("sleep").args(["5"])),
        )
        .with_timeout(Duration::from_millis(50))];

        let outcome = Sequencer::new(&store)
            .run("run-1", &stages, &params, &resolved, Path::new("."))
            .await;

        assert_eq!(outcome.status, RunStatus::Failed);
        let detail = outcome.error_detail.unwrap_or_default();
        assert!(detail.contains("timed out"), "unexpected detail: {detail}");
    }

    #[tokio::test]
    async fn test_unstable_halts_remaining_stages() {
        let store = MemoryCredentialStore::default();
        let (params, resolved) = fixtures();
        let later_calls = Arc::new(AtomicUsize::new(0));
        let unstable_calls = Arc::new(AtomicUsize::new(0));

        let stages = vec![
            Stage::new("smoke_check", counting(&unstable_calls, StageStatus::Unstable)),
            Stage::new("publish", counting(&later_calls, StageStatus::Passed)),
        ];

        let outcome = Sequencer::new(&store)
            .run("run-1", &stages, &params, &resolved, Path::new("."))
            .await;

        assert_eq!(outcome.status, RunStatus::Succeeded);
        assert_eq!(outcome.halted_after.as_deref(), Some("smoke_check"));
        assert_eq!(later_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unstable_continues_when_policy_disabled() {
        let store = MemoryCredentialStore::default();
        let (params, resolved) = fixtures();
        let later_calls = Arc::new(AtomicUsize::new(0));
        let unstable_calls = Arc::new(AtomicUsize::new(0));

        let stages = vec![
            Stage::new("smoke_check", counting(&unstable_calls, StageStatus::Unstable)),
            Stage::new("publish", counting(&later_calls, StageStatus::Passed)),
        ];

        let outcome = Sequencer::new(&store)
            .with_policy(SequencerPolicy {
                halt_on_unstable: false,
            })
            .run("run-1", &stages, &params, &resolved, Path::new("."))
            .await;

        assert_eq!(outcome.status, RunStatus::Succeeded);
        assert!(outcome.halted_after.is_none());
        assert_eq!(later_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_binding_fails_before_body_runs() {
        let store = MemoryCredentialStore::default();
        let (params, resolved) = fixtures();
        let calls = Arc::new(AtomicUsize::new(0));

        let stages = vec![Stage::new("publish", counting(&calls, StageStatus::Passed))
            .with_scope(CredentialBinding::key_pair("not-in-store"))];

        let outcome = Sequencer::new(&store)
            .run("run-1", &stages, &params, &resolved, Path::new("."))
            .await;

        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(calls.load(Ordering::SeqCst), 0, "body must not run");
        let detail = outcome.error_detail.unwrap_or_default();
        assert!(detail.contains("not-in-store"));
    }

    #[tokio::test]
    async fn test_scoped_credentials_reach_stage_body() {
        let store = MemoryCredentialStore::default();
        store.insert_key_pair("deploy-key", "AKIA1", "secret");
        let (params, resolved) = fixtures();

        struct AssertCreds;

        #[async_trait]
        impl StageAction for AssertCreds {
            async fn run(&self, ctx: &StageContext<'_>) -> Result<StageStatus> {
                assert_eq!(ctx.credentials.get("AWS_ACCESS_KEY_ID"), Some("AKIA1"));
                Ok(StageStatus::Passed)
            }
        }

        let stages = vec![Stage::new("resolve_account", Arc::new(AssertCreds))
            .with_scope(CredentialBinding::key_pair("deploy-key"))];

        let outcome = Sequencer::new(&store)
            .run("run-1", &stages, &params, &resolved, Path::new("."))
            .await;
        assert_eq!(outcome.status, RunStatus::Succeeded);
    }
}
