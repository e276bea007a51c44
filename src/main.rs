//! Loyalty Server
//!
//! Serves the loyalty API and runs the periodic maintenance sweep

use std::sync::Arc;

use afterdark_loyalty::{server, Config, LoyaltyService, Store};
use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting loyalty server");

    let config = Config::load().context("Failed to load configuration")?;

    let store = Store::open(&config.database.path)
        .with_context(|| format!("Failed to open database {}", config.database.path))?;
    info!("SQLite storage initialized at {}", config.database.path);

    let service = Arc::new(LoyaltyService::new(store, &config));

    if config.maintenance.enabled {
        server::spawn_maintenance(service.clone(), &config.maintenance);
    } else {
        info!("Background maintenance disabled");
    }

    let host = config.server.host.clone();
    let port = config.server.port;
    server::run_server(&host, port, service, config).await?;

    Ok(())
}
