//! Error taxonomy for pipeline runs.
//!
//! Every variant is terminal for the run: there is no retry policy anywhere
//! in Gantry, so a stage error surfaces directly as a failed outcome.

/// Errors produced during a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("account not found: {name}")]
    AccountNotFound { name: String },

    #[error("credential binding cannot be resolved: {id}")]
    CredentialResolution { id: String },

    #[error("stage '{stage}' timed out after {timeout_secs}s")]
    StageTimeout { stage: String, timeout_secs: u64 },

    #[error("command '{command}' exited with code {exit_code}: {stderr}")]
    ExternalCommand {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("notification delivery failed: {0}")]
    Notification(String),

    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_not_found_display() {
        let err = PipelineError::AccountNotFound {
            name: "Other Corp".to_string(),
        };
        assert!(err.to_string().contains("account not found"));
        assert!(err.to_string().contains("Other Corp"));
    }

    #[test]
    fn test_stage_timeout_display() {
        let err = PipelineError::StageTimeout {
            stage: "build_image".to_string(),
            timeout_secs: 600,
        };
        let msg = err.to_string();
        assert!(msg.contains("build_image"));
        assert!(msg.contains("600"));
    }

    #[test]
    fn test_external_command_display() {
        let err = PipelineError::ExternalCommand {
            command: "docker push".to_string(),
            exit_code: 1,
            stderr: "denied".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("docker push"));
        assert!(msg.contains("denied"));
    }
}
