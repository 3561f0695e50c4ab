//! agenx CLI: the main entry point.
//!
//! Commands:
//! - `run`     Run a scientific task with the agent team
//! - `select`  Ask the selector for the next speaker once
//! - `config`  Print the default configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "agenx",
    about = "agenx — principle-guided multi-agent reasoning for scientific tasks",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.agenx/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task with the configured team
    Run {
        /// The task given to the team
        #[arg(short, long)]
        task: String,

        /// Enable rule-based (principle-guided) reasoning for the planner
        #[arg(long)]
        principled: bool,

        /// Enable model-based reasoning for the planner
        #[arg(long)]
        prompted: bool,
    },

    /// Ask the selector which agent speaks next
    Select {
        /// Speaking order so far, comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        order: Vec<String>,
    },

    /// Print the default configuration
    Config {
        /// Print the config file path instead
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout belongs to the console
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            task,
            principled,
            prompted,
        } => commands::run::run(cli.config, task, principled, prompted).await?,
        Commands::Select { order } => commands::select::run(cli.config, order).await?,
        Commands::Config { path } => commands::config_cmd::run(path)?,
    }

    Ok(())
}
