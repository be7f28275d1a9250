//! snmpfarm-daemon: the simulator daemon.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "snmpfarm-daemon", about = "SNMP agent-farm simulator daemon")]
struct Cli {
    /// Configuration directory
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    let config = Arc::new(snmpfarm::config::load_config(
        cli.config.as_deref().map(std::path::Path::new),
    )?);

    tracing::info!("snmpfarm {} starting", snmpfarm::VERSION);

    let mut server = snmpfarm::server::Server::start(config).await?;

    tracing::info!("Simulator running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    server.shutdown();
    Ok(())
}
