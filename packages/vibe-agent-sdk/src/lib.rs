pub mod agents;
pub mod config;
pub mod domain;
pub mod error;

pub use agents::cli_client::{TaskRunner, VibeAgentClient, build_command_args};
pub use config::{ClientConfig, TaskOptions, merge_env};
pub use domain::types::TaskResult;
pub use error::{AgentError, Result};
