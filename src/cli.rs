use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "drover", version, about = "Agent orchestration core with supervised background delegation")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the agent loop against a configured engine binding
    Run {
        /// Model name forwarded to the reasoning engine
        #[arg(short, long)]
        model: Option<String>,

        /// Iteration ceiling for delegated background tasks
        #[arg(long)]
        iteration_ceiling: Option<u32>,

        /// Adjustment-request timeout in seconds
        #[arg(long)]
        adjustment_timeout: Option<u64>,

        /// Path to config file (overrides default search)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Validate and print the resolved configuration
    Check {
        /// Path to config file (overrides default search)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}
