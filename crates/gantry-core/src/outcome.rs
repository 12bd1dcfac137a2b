//! Terminal run record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal status of a pipeline run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

/// How a single stage ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StageDisposition {
    Passed,
    Unstable,
    Failed,
}

/// Per-stage record inside an outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub name: String,
    pub disposition: StageDisposition,
    pub duration_ms: u64,
}

/// Produced exactly once per run, consumed by the hook dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Run identifier (also the tracing span id).
    pub run_id: String,

    pub status: RunStatus,

    /// Name of the stage that failed, if any.
    pub failing_stage: Option<String>,

    /// Human-readable error description, if any.
    pub error_detail: Option<String>,

    /// Stage after which sequencing halted early on instability, if any.
    pub halted_after: Option<String>,

    /// Per-stage reports in execution order.
    pub stages: Vec<StageReport>,

    /// Total duration in milliseconds.
    pub duration_ms: u64,

    pub finished_at: DateTime<Utc>,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Build a failed outcome for an error that occurred at `stage`.
    pub fn failure(
        run_id: impl Into<String>,
        stage: impl Into<String>,
        detail: impl Into<String>,
        stages: Vec<StageReport>,
        duration_ms: u64,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            status: RunStatus::Failed,
            failing_stage: Some(stage.into()),
            error_detail: Some(detail.into()),
            halted_after: None,
            stages,
            duration_ms,
            finished_at: Utc::now(),
        }
    }

    /// Build a successful outcome.
    pub fn success(run_id: impl Into<String>, stages: Vec<StageReport>, duration_ms: u64) -> Self {
        Self {
            run_id: run_id.into(),
            status: RunStatus::Succeeded,
            failing_stage: None,
            error_detail: None,
            halted_after: None,
            stages,
            duration_ms,
            finished_at: Utc::now(),
        }
    }

    pub fn passed_count(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| s.disposition == StageDisposition::Passed)
            .count()
    }
}
