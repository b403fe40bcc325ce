use crate::config::{ClientConfig, TaskOptions, merge_env};
use crate::domain::types::{TaskResult, exit_code_of};
use crate::error::{AgentError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Runs one agent task to completion.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run_task(&self, goal: &str, options: TaskOptions) -> Result<TaskResult>;
}

/// Argument vector for one invocation, executable first.
///
/// Optional flags appear only when set; empty model/base URL strings are skipped.
pub fn build_command_args(executable: &str, goal: &str, options: &TaskOptions) -> Vec<String> {
    let mut args = vec![
        executable.to_string(),
        "--goal".to_string(),
        goal.to_string(),
    ];

    if let Some(model) = options.model() {
        args.push("--model".to_string());
        args.push(model.to_string());
    }
    if let Some(base_url) = options.base_url() {
        args.push("--base-url".to_string());
        args.push(base_url.to_string());
    }
    if let Some(max_iterations) = options.max_iterations {
        args.push("--max-iterations".to_string());
        args.push(max_iterations.to_string());
    }

    args
}

/// Launches the `vibe-agent` executable and captures what it prints.
///
/// Each call spawns a fresh child; the client holds no per-call state and can
/// be shared across tasks.
#[derive(Debug, Clone, Default)]
pub struct VibeAgentClient {
    pub config: ClientConfig,
}

impl VibeAgentClient {
    pub fn new(executable: &str) -> Self {
        Self {
            config: ClientConfig::new(executable),
        }
    }

    pub fn from_config(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.config = self.config.with_work_dir(work_dir);
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.config = self.config.with_env(env);
        self
    }

    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config = self.config.with_env_var(key, value);
        self
    }

    pub fn executable(&self) -> &str {
        &self.config.executable
    }

    fn command_for(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&args[0]);
        cmd.args(&args[1..]);

        cmd.env_clear();
        cmd.envs(merge_env(std::env::vars_os(), &self.config.env));

        if let Some(ref wd) = self.config.work_dir {
            cmd.current_dir(wd);
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }

    fn invocation_error(&self, source: std::io::Error) -> AgentError {
        AgentError::Invocation {
            executable: self.config.executable.clone(),
            source,
        }
    }
}

#[async_trait]
impl TaskRunner for VibeAgentClient {
    async fn run_task(&self, goal: &str, options: TaskOptions) -> Result<TaskResult> {
        if goal.is_empty() {
            return Err(AgentError::invalid("goal must not be empty"));
        }
        options.validate()?;

        let args = build_command_args(&self.config.executable, goal, &options);
        let command_line = args.join(" ");
        let mut cmd = self.command_for(&args);

        debug!(
            command = %command_line,
            work_dir = ?self.config.work_dir,
            timeout = ?options.timeout,
            "Spawning agent"
        );

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|e| self.invocation_error(e))?;

        let collected = match options.timeout {
            Some(limit) => {
                let outcome = tokio::time::timeout(limit, collect_output(&mut child)).await;
                match outcome {
                    Ok(collected) => collected,
                    Err(_) => {
                        warn!(command = %command_line, ?limit, "Agent timed out, killing it");
                        // kill() also reaps the child
                        if let Err(e) = child.kill().await {
                            debug!("Failed to kill timed out agent: {}", e);
                        }
                        return Err(AgentError::Timeout {
                            command: command_line,
                            timeout: limit,
                        });
                    }
                }
            }
            None => collect_output(&mut child).await,
        };
        let (status, stdout, stderr) = collected.map_err(|e| self.invocation_error(e))?;

        let result = TaskResult {
            exit_code: exit_code_of(status),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            command: command_line,
        };

        info!(
            exit_code = result.exit_code,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Agent finished"
        );

        if options.strict && !result.success() {
            warn!(exit_code = result.exit_code, "Agent failed in strict mode");
            return Err(AgentError::ProcessFailed {
                exit_code: result.exit_code,
                command: result.command,
                stdout: result.stdout,
                stderr: result.stderr,
            });
        }

        Ok(result)
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Drains both pipes while waiting, so a chatty child never blocks on a full pipe.
async fn collect_output(child: &mut Child) -> std::io::Result<(ExitStatus, Vec<u8>, Vec<u8>)> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (stdout, stderr, status) =
        tokio::try_join!(read_pipe(stdout), read_pipe(stderr), child.wait())?;

    Ok((status, stdout, stderr))
}

// Exposed for integration testing of callers
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    type MockOutcome = Box<dyn Fn(&str, &TaskOptions) -> Result<TaskResult> + Send + Sync>;

    /// A scripted runner. Queued outcomes are consumed in order; once empty it
    /// answers with a successful, silent result.
    #[derive(Clone, Default)]
    pub struct MockTaskRunner {
        outcomes: Arc<Mutex<VecDeque<MockOutcome>>>,
        pub calls: Arc<Mutex<Vec<(String, TaskOptions)>>>,
    }

    impl MockTaskRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_result(&self, result: TaskResult) {
            let mut guard = self.outcomes.lock().unwrap();
            guard.push_back(Box::new(move |_, _| Ok(result.clone())));
        }

        pub fn add_action<F>(&self, action: F)
        where
            F: Fn(&str, &TaskOptions) -> Result<TaskResult> + Send + Sync + 'static,
        {
            let mut guard = self.outcomes.lock().unwrap();
            guard.push_back(Box::new(action));
        }

        pub fn recorded_calls(&self) -> Vec<(String, TaskOptions)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TaskRunner for MockTaskRunner {
        async fn run_task(&self, goal: &str, options: TaskOptions) -> Result<TaskResult> {
            self.calls
                .lock()
                .unwrap()
                .push((goal.to_string(), options.clone()));

            let action_opt = {
                let mut guard = self.outcomes.lock().unwrap();
                guard.pop_front()
            };

            match action_opt {
                Some(action) => action(goal, &options),
                None => Ok(TaskResult {
                    exit_code: 0,
                    stdout: String::new(),
                    stderr: String::new(),
                    command: build_command_args("mock-agent", goal, &options).join(" "),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_build_args_goal_only() {
        let args = build_command_args("vibe-agent", "fix the tests", &TaskOptions::default());
        assert_eq!(args, vec!["vibe-agent", "--goal", "fix the tests"]);
    }

    #[test]
    fn test_build_args_all_overrides_in_order() {
        let options = TaskOptions::new()
            .with_model("gpt-4o")
            .with_base_url("http://localhost:11434")
            .with_max_iterations(7)
            .with_timeout(Duration::from_secs(5));

        let args = build_command_args("/opt/bin/agent", "ship it", &options);

        assert_eq!(
            args,
            vec![
                "/opt/bin/agent",
                "--goal",
                "ship it",
                "--model",
                "gpt-4o",
                "--base-url",
                "http://localhost:11434",
                "--max-iterations",
                "7",
            ]
        );
    }

    #[test]
    fn test_build_args_goal_passed_unmodified() {
        let goals = ["  padded  ", "--model", "quote \"me\" $HOME", "line\nbreak", "ünïcødé"];
        for goal in goals {
            let args = build_command_args("vibe-agent", goal, &TaskOptions::default());
            let pos = args.iter().position(|a| a == "--goal").unwrap();
            assert_eq!(args[pos + 1], goal);
            assert_eq!(args.len(), 3);
        }
    }

    #[test]
    fn test_build_args_skips_empty_overrides() {
        let options = TaskOptions::new().with_model("").with_base_url("");
        let args = build_command_args("vibe-agent", "goal", &options);
        assert!(!args.iter().any(|a| a.is_empty()));
        assert!(!args.contains(&"--model".to_string()));
        assert!(!args.contains(&"--base-url".to_string()));
    }

    #[test]
    fn test_client_builder() {
        let client = VibeAgentClient::new("agent")
            .with_work_dir("/tmp")
            .with_env_var("FOO", "bar");

        assert_eq!(client.executable(), "agent");
        assert_eq!(client.config.work_dir, Some(PathBuf::from("/tmp")));
        assert_eq!(client.config.env.get("FOO").map(String::as_str), Some("bar"));
        assert_eq!(VibeAgentClient::default().executable(), "vibe-agent");
    }

    #[tokio::test]
    async fn test_invalid_command_is_invocation_error() {
        // This test is fast because it immediately fails to spawn the process
        let client = VibeAgentClient::new("non_existent_command_12345");
        let err = client
            .run_task("hello", TaskOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Invocation { .. }));
    }

    #[tokio::test]
    async fn test_empty_goal_rejected_before_spawn() {
        let client = VibeAgentClient::new("non_existent_command_12345");
        let err = client.run_task("", TaskOptions::default()).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidRequest { .. }));

        let err = client
            .run_task("goal", TaskOptions::new().with_max_iterations(0))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn test_mock_runner_replays_and_records() {
        let mock = mocks::MockTaskRunner::new();
        mock.add_result(TaskResult {
            exit_code: 4,
            stdout: "scripted".to_string(),
            stderr: String::new(),
            command: "vibe-agent --goal a".to_string(),
        });

        let first = mock.run_task("a", TaskOptions::default()).await.unwrap();
        let second = mock
            .run_task("b", TaskOptions::new().with_model("m"))
            .await
            .unwrap();

        assert_eq!(first.exit_code, 4);
        assert_eq!(second.exit_code, 0);
        assert_eq!(second.command, "mock-agent --goal b --model m");

        let calls = mock.recorded_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].0, "b");
        assert_eq!(calls[1].1.model.as_deref(), Some("m"));
    }
}
