//! Structured observability hooks for run lifecycle events.
//!
//! Provides a run-scoped tracing span via the `RunSpan` RAII guard and
//! emitter functions for the key lifecycle events: run start/finish, stage
//! start/finish, and the post-execution hooks.
//!
//! Events are emitted at `info!` level; configure verbosity via `RUST_LOG`.

use tracing::{info, warn};

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with the run id.
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("gantry.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: run started against a resolved target.
pub fn emit_run_started(run_id: &str, pipeline_digest: &str, region: &str) {
    info!(
        event = "run.started",
        run_id = %run_id,
        pipeline_digest = %pipeline_digest,
        region = %region,
    );
}

/// Emit event: run finished with terminal status.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        success = success,
    );
}

/// Emit event: a stage began executing.
pub fn emit_stage_started(run_id: &str, stage: &str) {
    info!(event = "stage.started", run_id = %run_id, stage = %stage);
}

/// Emit event: a stage finished with its disposition.
pub fn emit_stage_finished(run_id: &str, stage: &str, disposition: &str, duration_ms: u64) {
    info!(
        event = "stage.finished",
        run_id = %run_id,
        stage = %stage,
        disposition = %disposition,
        duration_ms = duration_ms,
    );
}

/// Emit event: the cleanup hook ran.
pub fn emit_cleanup_hook(run_id: &str, ok: bool) {
    info!(event = "hook.cleanup", run_id = %run_id, ok = ok);
}

/// Emit event: cleanup hook failure (warning level; never escalated).
pub fn emit_cleanup_error(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "hook.cleanup_error", run_id = %run_id, error = %error);
}

/// Emit event: failure notification dispatched.
pub fn emit_notification_sent(run_id: &str, channel: &str) {
    info!(event = "hook.notify", run_id = %run_id, channel = %channel);
}

/// Emit event: notification delivery failure (warning level; best-effort).
pub fn emit_notification_error(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "hook.notify_error", run_id = %run_id, error = %error);
}
