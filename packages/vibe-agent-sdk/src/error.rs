use std::time::Duration;

pub type Result<T> = std::result::Result<T, AgentError>;

/// Failures of a single `run_task` call. None of them are retried.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The request was rejected before anything was spawned.
    #[error("invalid task request: {reason}")]
    InvalidRequest { reason: String },

    /// The executable could not be launched, or its pipes broke mid-run.
    #[error("failed to run `{executable}`: {source}")]
    Invocation {
        executable: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` did not finish within {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    /// Non-zero exit while running in strict mode.
    #[error("vibe-agent failed (exit={exit_code})\nCommand: {command}\nSTDOUT:\n{stdout}\nSTDERR:\n{stderr}")]
    ProcessFailed {
        exit_code: i32,
        command: String,
        stdout: String,
        stderr: String,
    },
}

impl AgentError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Exit code carried by a strict-mode failure.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::ProcessFailed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
