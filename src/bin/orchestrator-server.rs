//! # Orchestrator Server
//!
//! Runs the orchestrator, workflow manager and job monitors in one process
//! until Ctrl+C or SIGTERM.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default configuration
//! cargo run --bin orchestrator-server
//!
//! # Run with a configuration file, checking it without starting
//! cargo run --bin orchestrator-server -- --config config/orchestrator.toml --validate-only
//! ```

use airavata_core::config::ConfigManager;
use airavata_core::logging;
use airavata_core::system_context::SystemContext;
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "orchestrator-server", version, about = "Experiment orchestration server")]
struct Args {
    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long, env = "AIRAVATA_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Override the gateway id from the configuration
    #[arg(long)]
    gateway_id: Option<String>,

    /// Load and validate configuration, print it and exit
    #[arg(long)]
    validate_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init_structured_logging();

    info!("🚀 Starting Orchestrator Server...");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config_manager = match &args.config {
        Some(path) => ConfigManager::load_from_file(path),
        None => ConfigManager::load(),
    }
    .context("Failed to load configuration")?;

    if let Some(gateway_id) = args.gateway_id {
        let mut config = config_manager.config().clone();
        config.gateway_id = gateway_id;
        config_manager = ConfigManager::from_config(config).context("Invalid gateway override")?;
    }

    if args.validate_only {
        let rendered = serde_json::to_string_pretty(&config_manager.debug_config())?;
        println!("{rendered}");
        info!("✅ Configuration is valid");
        return Ok(());
    }

    info!("   Environment: {}", config_manager.environment());
    let context = SystemContext::from_config(config_manager)
        .await
        .context("Failed to build system context")?;
    context.start().context("Failed to start background loops")?;

    info!(gateway_id = %context.config().gateway_id, "🎉 Orchestrator Server started successfully!");
    info!("   Press Ctrl+C to shutdown gracefully");

    shutdown_signal().await;
    info!("🛑 Shutdown signal received, initiating graceful shutdown...");
    context.shutdown().await;
    info!("👋 Orchestrator Server shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
