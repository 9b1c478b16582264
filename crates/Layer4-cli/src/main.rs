//! AgentRelay CLI - Main entry point

mod cli;

use clap::{Parser, Subcommand};
use relay_foundation::RuntimeConfig;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// AgentRelay - run coding agent CLIs behind one event stream
#[derive(Parser, Debug)]
#[command(name = "relay")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List supported agents
    Agents,
    /// Check whether agent binaries are installed
    Detect {
        /// Agent id (all agents when omitted)
        agent: Option<String>,
    },
    /// Verify agent credentials
    Auth {
        /// Agent id
        agent: String,
    },
    /// Run a task with an agent and stream its events
    Run {
        /// Agent id (claude-code, codex, aider)
        agent: String,

        /// Task description
        #[arg(short, long)]
        task: String,

        /// Context file, relative to the workspace (repeatable)
        #[arg(short, long = "file")]
        files: Vec<PathBuf>,

        /// Workspace root (defaults to the current directory)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Wall-clock timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Allow network access
        #[arg(long)]
        network: bool,

        /// Allow the agent to run shell commands
        #[arg(long)]
        shell: bool,

        /// Print one JSON object per event
        #[arg(long)]
        json: bool,
    },
    /// Validate a path against the workspace policy
    CheckPath {
        path: PathBuf,

        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Also apply the strict preset
        #[arg(long)]
        strict: bool,
    },
    /// Validate a shell command against the workspace policy
    CheckCommand {
        command: String,

        /// Also apply the strict preset
        #[arg(long)]
        strict: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Load configuration
    let config = RuntimeConfig::load().unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config: {}", e);
        RuntimeConfig::default()
    });

    let code = match args.command {
        Command::Agents => cli::list_agents(&config),
        Command::Detect { agent } => cli::detect(&config, agent.as_deref()).await?,
        Command::Auth { agent } => cli::auth(&config, &agent).await?,
        Command::Run {
            agent,
            task,
            files,
            workspace,
            timeout_ms,
            network,
            shell,
            json,
        } => {
            let workspace = resolve_workspace(workspace)?;
            cli::run(
                &config,
                cli::RunArgs {
                    agent,
                    task,
                    files,
                    workspace,
                    timeout_ms,
                    network,
                    shell,
                    json,
                },
            )
            .await?
        }
        Command::CheckPath {
            path,
            workspace,
            strict,
        } => {
            let workspace = resolve_workspace(workspace)?;
            cli::check_path(&config, &workspace, &path, strict)?
        }
        Command::CheckCommand { command, strict } => {
            cli::check_command(&config, &command, strict)?
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn resolve_workspace(workspace: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match workspace {
        Some(dir) => Ok(dir),
        None => Ok(std::env::current_dir()?),
    }
}
