//! gpushare CLI
//!
//! Inspect published decisions and dry-run allocations offline.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// gpushare - GPU memory arbiter tooling
#[derive(Parser, Debug)]
#[command(name = "gpushare")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show a published decision file
    Show {
        /// Decision file path
        #[arg(default_value = "/etc/gpushare/gpu_config.json")]
        path: PathBuf,
    },

    /// Compute the decision for a snapshot file without publishing it
    Plan {
        /// Snapshot file with gpus and jobs
        snapshot: PathBuf,

        /// Print a per-GPU table instead of decision JSON
        #[arg(long)]
        table: bool,
    },

    /// Show GPUs visible through NVML
    Gpus,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    match cli.command {
        Commands::Show { path } => {
            commands::show(&path).await?;
        }
        Commands::Plan { snapshot, table } => {
            commands::plan(&snapshot, table).await?;
        }
        Commands::Gpus => {
            commands::gpus();
        }
    }

    Ok(())
}
