use clap::Parser;

use drover::cli::{Cli, Commands};
use drover::config::load_config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!("Drover starting");

    let config = load_config(&cli)?;
    tracing::info!(model = %config.model, "Config loaded");

    match cli.command {
        Commands::Run { .. } => {
            println!(
                "Drover initialized.\n  Model: {}\n  Iteration ceiling: {}\n  Adjustment: every {} iterations, {}s timeout\n  Active-task cap: {}",
                config.model,
                config.iteration_ceiling,
                config.adjustment_interval,
                config.adjustment_timeout_secs,
                config.max_active_tasks,
            );
            println!(
                "No reasoning-engine binding is configured. Wire a ReasoningEngine \
                 implementation and channel adapters to run the loop; see the library API."
            );
        }
        Commands::Check { .. } => {
            println!("{config:#?}");
        }
    }

    Ok(())
}
