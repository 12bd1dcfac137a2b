//! Post-execution hooks.
//!
//! The cleanup hook runs exactly once per run, whatever the outcome — even
//! when the sequencer aborted mid-run. The notification hook fires if and
//! only if the outcome is a failure. Neither hook can change the outcome:
//! cleanup failures are logged and never mask the original error, and
//! notification delivery is best-effort.

use std::path::PathBuf;

use async_trait::async_trait;
use gantry_core::obs::{
    emit_cleanup_error, emit_cleanup_hook, emit_notification_error, emit_notification_sent,
};
use gantry_core::{Result, RunOutcome};

use crate::notify::{Notifier, Severity};

/// Invocation metadata rendered into the failure notification.
#[derive(Debug, Clone)]
pub struct InvocationMeta {
    /// Target environment label (usually the account name).
    pub environment: String,
    pub region: String,
    pub branch: String,
    /// Run identifier shown in the message.
    pub run_number: String,
    pub initiated_by: String,
    /// Link to the run report.
    pub report_url: String,
}

/// Workspace/state reset hook.
#[async_trait]
pub trait CleanupHook: Send + Sync {
    async fn clean(&self) -> Result<()>;
}

/// Resets the run workspace by deleting and recreating it.
///
/// The workspace is exclusively owned by the run; concurrent use is the
/// external scheduler's responsibility.
pub struct WorkspaceCleanup {
    root: PathBuf,
}

impl WorkspaceCleanup {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl CleanupHook for WorkspaceCleanup {
    async fn clean(&self) -> Result<()> {
        if tokio::fs::try_exists(&self.root).await? {
            tokio::fs::remove_dir_all(&self.root).await?;
        }
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }
}

/// Render the fixed failure-notification template.
pub fn render_failure_message(outcome: &RunOutcome, meta: &InvocationMeta) -> String {
    let stage = outcome.failing_stage.as_deref().unwrap_or("unknown");
    let detail = outcome.error_detail.as_deref().unwrap_or("no detail");
    format!(
        "*Deployment failed*\n\
         Environment: {} ({})\n\
         Branch: {}\n\
         Run: #{} by {}\n\
         Status: FAILURE\n\
         Stage: {}\n\
         Error: {}\n\
         Report: {}",
        meta.environment,
        meta.region,
        meta.branch,
        meta.run_number,
        meta.initiated_by,
        stage,
        detail,
        meta.report_url,
    )
}

/// Dispatches the always/failure hooks after a run.
pub struct HookDispatcher<'a> {
    cleanup: &'a dyn CleanupHook,
    notifier: &'a dyn Notifier,
    channel: String,
}

impl<'a> HookDispatcher<'a> {
    pub fn new(
        cleanup: &'a dyn CleanupHook,
        notifier: &'a dyn Notifier,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            cleanup,
            notifier,
            channel: channel.into(),
        }
    }

    /// Run the hooks for a terminal outcome.
    ///
    /// Cleanup always runs; the notification only on failure. Errors from
    /// either hook are logged and swallowed.
    pub async fn dispatch(&self, outcome: &RunOutcome, meta: &InvocationMeta) {
        match self.cleanup.clean().await {
            Ok(()) => emit_cleanup_hook(&outcome.run_id, true),
            Err(err) => {
                emit_cleanup_hook(&outcome.run_id, false);
                emit_cleanup_error(&outcome.run_id, &err);
            }
        }

        if outcome.succeeded() {
            return;
        }

        let message = render_failure_message(outcome, meta);
        match self
            .notifier
            .send(&self.channel, &message, Severity::Danger)
            .await
        {
            Ok(()) => emit_notification_sent(&outcome.run_id, &self.channel),
            Err(err) => emit_notification_error(&outcome.run_id, &err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FailingCleanup, MemoryNotifier, RecordingCleanup};
    use gantry_core::RunOutcome;

    fn meta() -> InvocationMeta {
        InvocationMeta {
            environment: "Matter Software Ltd".to_string(),
            region: "us-east-1".to_string(),
            branch: "main".to_string(),
            run_number: "17".to_string(),
            initiated_by: "ops".to_string(),
            report_url: "https://ci.example.com/runs/17".to_string(),
        }
    }

    #[tokio::test]
    async fn test_cleanup_runs_on_success_without_notification() {
        let cleanup = RecordingCleanup::default();
        let notifier = MemoryNotifier::default();
        let dispatcher = HookDispatcher::new(&cleanup, &notifier, "#deploys");

        let outcome = RunOutcome::success("run-1", vec![], 5);
        dispatcher.dispatch(&outcome, &meta()).await;

        assert_eq!(cleanup.calls(), 1);
        assert!(notifier.sent().is_empty(), "no notification on success");
    }

    #[tokio::test]
    async fn test_cleanup_and_notification_on_failure() {
        let cleanup = RecordingCleanup::default();
        let notifier = MemoryNotifier::default();
        let dispatcher = HookDispatcher::new(&cleanup, &notifier, "#deploys");

        let outcome = RunOutcome::failure("run-1", "build_image", "exit code 1", vec![], 5);
        dispatcher.dispatch(&outcome, &meta()).await;

        assert_eq!(cleanup.calls(), 1);
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel, "#deploys");
        assert_eq!(sent[0].severity, Severity::Danger);
        assert!(sent[0].message.contains("Status: FAILURE"));
        assert!(sent[0].message.contains("build_image"));
    }

    #[tokio::test]
    async fn test_cleanup_failure_does_not_block_notification() {
        let cleanup = FailingCleanup;
        let notifier = MemoryNotifier::default();
        let dispatcher = HookDispatcher::new(&cleanup, &notifier, "#deploys");

        let outcome = RunOutcome::failure("run-1", "publish", "denied", vec![], 5);
        dispatcher.dispatch(&outcome, &meta()).await;

        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_notification_failure_is_swallowed() {
        let cleanup = RecordingCleanup::default();
        let notifier = MemoryNotifier::default().failing();
        let dispatcher = HookDispatcher::new(&cleanup, &notifier, "#deploys");

        let outcome = RunOutcome::failure("run-1", "publish", "denied", vec![], 5);
        // Must not panic or propagate.
        dispatcher.dispatch(&outcome, &meta()).await;
        assert_eq!(cleanup.calls(), 1);
    }

    #[test]
    fn test_failure_message_template_fields() {
        let outcome = RunOutcome::failure("run-1", "build_image", "no space left", vec![], 5);
        let message = render_failure_message(&outcome, &meta());
        for expected in [
            "Matter Software Ltd",
            "us-east-1",
            "main",
            "#17 by ops",
            "Status: FAILURE",
            "build_image",
            "no space left",
            "https://ci.example.com/runs/17",
        ] {
            assert!(message.contains(expected), "missing {expected}: {message}");
        }
    }

    #[tokio::test]
    async fn test_workspace_cleanup_resets_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("workspace");
        std::fs::create_dir_all(root.join("checkout")).unwrap();
        std::fs::write(root.join("checkout/file"), b"stale").unwrap();

        WorkspaceCleanup::new(&root).clean().await.unwrap();

        assert!(root.exists());
        assert!(!root.join("checkout").exists());
    }
}
