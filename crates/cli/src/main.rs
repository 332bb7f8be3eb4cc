//! sopilot CLI: the main entry point.
//!
//! Commands:
//! - `onboard`  Write a default config plus editable prompts and rules
//! - `run`      Run one task through the browser bridge
//! - `observe`  Fuse a recorded step and print the element table
//! - `ground`   Resolve one SOP step against a recorded page
//! - `sop`      Inspect the SOP library
//! - `doctor`   Diagnose configuration and connectivity

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sopilot_observe::FilterMode;

mod commands;

#[derive(Parser)]
#[command(
    name = "sopilot",
    about = "sopilot: SOP-guided web UI agent",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.sopilot/config.toml)
    #[arg(short, long, global = true, env = "SOPILOT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration, prompt templates and intent rules
    Onboard,

    /// Run one task end to end
    Run {
        /// Task id, e.g. workarena.servicenow.create-change-request
        #[arg(short, long)]
        task: String,
    },

    /// Fuse a recorded step and print its element table
    Observe {
        /// A `step_<label>_state_metadata.json` file
        metadata: PathBuf,

        #[arg(short, long, default_value = "light")]
        filter: FilterMode,
    },

    /// Resolve a role and label to a bid on a recorded page
    Ground {
        /// A `step_<label>_state_metadata.json` file
        metadata: PathBuf,

        #[arg(short, long)]
        role: String,

        #[arg(short, long, default_value = "")]
        label: String,

        /// Action the step performs (fill, click, select_option, ...)
        #[arg(short, long)]
        action: Option<String>,
    },

    /// Inspect the SOP library
    Sop {
        #[command(subcommand)]
        command: SopCommand,
    },

    /// Diagnose system health
    Doctor,
}

#[derive(Subcommand)]
enum SopCommand {
    /// Print the SOP the planner would receive for a task
    Show { task_id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config_path = cli.config.clone();
    match cli.command {
        Commands::Onboard => commands::onboard::run(config_path).await?,
        Commands::Run { task } => commands::run::run(config_path, &task).await?,
        Commands::Observe { metadata, filter } => commands::observe::run(&metadata, filter)?,
        Commands::Ground {
            metadata,
            role,
            label,
            action,
        } => commands::ground::run(&metadata, &role, &label, action.as_deref())?,
        Commands::Sop {
            command: SopCommand::Show { task_id },
        } => commands::sop::show(config_path, &task_id)?,
        Commands::Doctor => commands::doctor::run(config_path).await?,
    }

    Ok(())
}
