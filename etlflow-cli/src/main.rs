mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "etlflow",
    version,
    about = "Run dependency-ordered batch ETL pipelines"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline once
    Run {
        /// Path to pipeline TOML file
        pipeline: PathBuf,
    },
    /// Validate a pipeline file and print its execution order
    Check {
        /// Path to pipeline TOML file
        pipeline: PathBuf,
    },
    /// Run a pipeline on its schedule
    Schedule {
        /// Path to pipeline TOML file
        pipeline: PathBuf,
        /// Stop after this many runs
        #[arg(long)]
        max_runs: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run { pipeline } => commands::run::execute(&pipeline).await,
        Commands::Check { pipeline } => commands::check::execute(&pipeline),
        Commands::Schedule { pipeline, max_runs } => {
            commands::schedule::execute(&pipeline, max_runs).await
        }
    }
}
