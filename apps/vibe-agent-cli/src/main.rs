use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt};
use vibe_agent_sdk::{ClientConfig, TaskOptions, TaskRunner, VibeAgentClient};

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Rust wrapper for vibe-agent", long_about = None)]
struct Args {
    /// Task to run
    #[arg(long)]
    goal: String,

    /// Model override
    #[arg(long)]
    model: Option<String>,

    /// Provider base URL override
    #[arg(long)]
    base_url: Option<String>,

    /// Loop limit
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    max_iterations: Option<u32>,

    /// CLI executable path (default: "vibe-agent")
    #[arg(long)]
    executable: Option<String>,

    /// Working directory for the agent (default: current directory)
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Give up on the agent after this many seconds
    #[arg(long)]
    timeout_secs: Option<f64>,

    /// JSON file with executable, work_dir and env settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging (written to stderr)
    #[arg(long)]
    debug: bool,
}

fn setup_logging(debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("info,vibe_agent_cli=debug,vibe_agent_sdk=debug")
        } else {
            EnvFilter::new("warn")
        }
    });

    // stdout carries the agent's output untouched, so logs go to stderr
    fmt::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Config file first, explicit flags on top.
async fn resolve_config(args: &Args) -> Result<ClientConfig> {
    let mut config = match args.config {
        Some(ref path) => ClientConfig::load(path).await?,
        None => ClientConfig::default(),
    };

    if let Some(ref executable) = args.executable {
        config.executable = executable.clone();
    }
    if let Some(ref wd) = args.work_dir {
        config.work_dir = Some(wd.clone());
    }

    Ok(config)
}

fn task_options(args: &Args) -> Result<TaskOptions> {
    // The exit code is relayed, never raised
    let mut options = TaskOptions::new().with_strict(false);
    options.model = args.model.clone();
    options.base_url = args.base_url.clone();
    options.max_iterations = args.max_iterations;

    if let Some(secs) = args.timeout_secs {
        let timeout = Duration::try_from_secs_f64(secs)
            .with_context(|| format!("Invalid --timeout-secs value: {}", secs))?;
        options.timeout = Some(timeout);
    }

    Ok(options)
}

/// Runs the task and copies its streams verbatim. Returns the child's exit code.
async fn relay<R, O, E>(
    runner: &R,
    goal: &str,
    options: TaskOptions,
    out: &mut O,
    err: &mut E,
) -> Result<i32>
where
    R: TaskRunner + ?Sized,
    O: Write,
    E: Write,
{
    let result = runner.run_task(goal, options).await?;
    debug!("{}", result);

    out.write_all(result.stdout.as_bytes())
        .context("Failed to write agent stdout")?;
    out.flush()?;
    err.write_all(result.stderr.as_bytes())
        .context("Failed to write agent stderr")?;
    err.flush()?;

    Ok(result.exit_code)
}

async fn run(args: Args) -> Result<i32> {
    let config = resolve_config(&args).await?;
    let options = task_options(&args)?;
    debug!(executable = %config.executable, "Resolved agent configuration");

    let client = VibeAgentClient::from_config(config);
    let stdout = std::io::stdout();
    let stderr = std::io::stderr();
    relay(
        &client,
        &args.goal,
        options,
        &mut stdout.lock(),
        &mut stderr.lock(),
    )
    .await
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    setup_logging(args.debug);

    match run(args).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", style("error:").for_stderr().bold().red(), e);
            std::process::exit(1);
        }
    }
}
