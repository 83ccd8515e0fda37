//! Thin binary entry point wiring the tool registry, built-in tools, the
//! priority orchestrator, and the DAG pipeline into a one-shot CLI.
//!
//! The runtime's real surface is the library crates (`toolrunner-core`,
//! `toolrunner-exec`, `toolrunner-commons`); this binary exists only to
//! demonstrate and smoke-test that wiring end to end, not to provide a
//! full coding-agent CLI.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use toolrunner_commons::{telemetry, RuntimeConfig};
use toolrunner_core::{Orchestrator, Priority, ToolRegistry};
use toolrunner_core::sanitizer::PathValidator;
use toolrunner_core::tools::register_builtins;

#[derive(Parser)]
#[command(name = "toolrunner", about = "Priority-scheduled tool-execution runtime")]
struct Cli {
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every registered tool's function-calling descriptor.
    ListTools,
    /// Submit a single tool invocation and print its result.
    Run {
        tool: String,
        #[arg(long, default_value = "{}")]
        args: String,
        #[arg(long, value_enum, default_value = "normal")]
        priority: PriorityArg,
    },
}

#[derive(Clone, clap::ValueEnum)]
enum PriorityArg {
    Background,
    Normal,
    High,
    Critical,
}

impl From<PriorityArg> for Priority {
    fn from(value: PriorityArg) -> Self {
        match value {
            PriorityArg::Background => Priority::Background,
            PriorityArg::Normal => Priority::Normal,
            PriorityArg::High => Priority::High,
            PriorityArg::Critical => Priority::Critical,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => RuntimeConfig::default(),
    }
    .merge_env();

    telemetry::init_tracing(&config.logging);

    let mut allowed_bases = config.allowed_bases.clone();
    if allowed_bases.is_empty() {
        allowed_bases.push(std::env::current_dir().context("failed to resolve current directory")?);
    }

    let registry = Arc::new(ToolRegistry::new());
    let validator = Arc::new(PathValidator::new(allowed_bases));

    // Built before registration so the `bash` tool registers its spawned
    // processes on the same `ProcessManager` the orchestrator's `stop()`
    // cleans up, rather than on a second, unreachable instance.
    let orchestrator = Orchestrator::new(registry.clone(), config.max_concurrency);
    register_builtins(&registry, validator, orchestrator.process_manager(), config.strict_mode);

    match cli.command {
        Command::ListTools => {
            for descriptor in registry.describe() {
                println!("{}", serde_json::to_string_pretty(&descriptor)?);
            }
        }
        Command::Run { tool, args, priority } => {
            let args: serde_json::Value = serde_json::from_str(&args).context("--args must be valid JSON")?;
            orchestrator.start();

            let task_id = orchestrator.submit(&tool, args, priority.into(), None);
            let result = orchestrator
                .result(task_id, Duration::from_secs(120))
                .await
                .context("tool invocation timed out waiting for a result")?;

            println!("{}", serde_json::to_string_pretty(&result)?);
            orchestrator.stop().await;
            if !result.success {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
