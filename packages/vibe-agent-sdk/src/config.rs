use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_EXECUTABLE: &str = "vibe-agent";

pub fn default_executable() -> String {
    DEFAULT_EXECUTABLE.to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Settings shared by every call made through one client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    #[serde(default = "default_executable")]
    pub executable: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
    /// Overlay applied on top of the parent environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            work_dir: None,
            env: BTreeMap::new(),
        }
    }
}

impl ClientConfig {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            ..Self::default()
        }
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(work_dir.into());
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Reads a JSON config file. Missing keys fall back to defaults.
    pub async fn load(path: &Path) -> std::result::Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Per-call overrides forwarded to the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOptions {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub max_iterations: Option<u32>,
    pub timeout: Option<Duration>,
    /// Turn a non-zero exit into `AgentError::ProcessFailed`.
    pub strict: bool,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            model: None,
            base_url: None,
            max_iterations: None,
            timeout: None,
            strict: true,
        }
    }
}

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == Some(0) {
            return Err(AgentError::invalid("max_iterations must be positive"));
        }
        Ok(())
    }

    /// Model override, ignoring empty strings.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref().filter(|m| !m.is_empty())
    }

    /// Base URL override, ignoring empty strings.
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref().filter(|u| !u.is_empty())
    }
}

/// Copies `base` and lays `overlay` on top. Overlay wins on conflicts.
///
/// Keys and values are `OsString` so non UTF-8 entries of the parent
/// environment survive the merge.
pub fn merge_env<I, K, V>(base: I, overlay: &BTreeMap<String, String>) -> BTreeMap<OsString, OsString>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<OsString>,
    V: Into<OsString>,
{
    let mut merged: BTreeMap<OsString, OsString> = base
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();
    merged.extend(
        overlay
            .iter()
            .map(|(k, v)| (OsString::from(k), OsString::from(v))),
    );
    merged
}
