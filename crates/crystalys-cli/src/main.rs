//! Crystalys CLI entry point

use clap::Parser;
use tracing::{debug, error};

use crystalys_cli::{cli::Cli, commands::CommandDispatcher, config::CliAppConfig, error::Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration, then apply flag overrides
    let mut config = CliAppConfig::load_with(cli.config.as_deref())?;
    config.apply_overrides(cli.verbose, cli.host.as_deref());
    config.validate()?;

    // Initialize logging
    setup_logging(config.cli.verbose);
    debug!(host = %config.coordinator.artifacts.host, "Configuration loaded");

    if let Err(e) = CommandDispatcher::execute(cli.command, &config).await {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
