//! Switch 2 controller driver CLI
//!
//! Runs the driver daemon, or inspects a single controller.

use clap::Parser;
use tracing::info;

use switch2_driver::DriverConfig;

// CLI definitions
mod cli;
use cli::{Cli, Commands, ConfigAction};

// Command handlers
mod commands;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(DriverConfig::default_path);
    let config = DriverConfig::load(&config_path)?;

    // Initialize logging
    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
    info!("Loaded config from {:?}", config_path);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => commands::run(config).await,
        Commands::List => commands::list(),
        Commands::Info { device, timeout_ms } => {
            commands::info(&config, device.as_deref(), timeout_ms).await
        }
        Commands::Rumble {
            device,
            strong,
            weak,
            duration_ms,
        } => commands::rumble(&config, device.as_deref(), strong, weak, duration_ms).await,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(&config, &config_path),
            ConfigAction::Save => commands::config_save(&config, &config_path),
        },
    }
}
