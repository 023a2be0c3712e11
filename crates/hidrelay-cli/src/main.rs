//! HID relay CLI entry point

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hidrelay_cli::{commands::CommandDispatcher, config::AppConfig, error::Result, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    setup_logging(cli.verbose);

    // Load configuration, then apply command-line overrides
    let config = match AppConfig::resolve(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = CommandDispatcher::execute(cli.command, config).await {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }

    info!("hidrelay exited successfully");
    Ok(())
}

/// Setup logging based on verbosity level; `RUST_LOG` takes precedence when set
fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
