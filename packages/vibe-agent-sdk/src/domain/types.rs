use serde::{Deserialize, Serialize};

/// Outcome of one agent invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Child exit code. Signal terminations are reported as the negated signal number.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Argument vector joined by single spaces. For display only, not shell-safe.
    pub command: String,
}

impl TaskResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

impl std::fmt::Display for TaskResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "`{}` exited with {}", self.command, self.exit_code)
    }
}

/// Maps an exit status to the integer reported in `TaskResult::exit_code`.
pub fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }

    -1
}
