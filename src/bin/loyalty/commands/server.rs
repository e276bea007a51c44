//! Server command - run the loyalty server in the foreground

use std::sync::Arc;

use afterdark_loyalty::{server, Config, LoyaltyService, Store};
use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::style::*;

pub async fn run(config_path: &str, logging_ready: bool) -> Result<()> {
    if !logging_ready {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();
    }

    let config = Config::load_file(config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    let store = Store::open(&config.database.path)
        .with_context(|| format!("Failed to open database {}", config.database.path))?;
    print_success(&format!("Database ready at {}", config.database.path));

    let service = Arc::new(LoyaltyService::new(store, &config));
    if config.maintenance.enabled {
        server::spawn_maintenance(service.clone(), &config.maintenance);
    } else {
        print_warning("Maintenance sweep disabled");
    }

    print_info(&format!(
        "Listening on {}:{}",
        config.server.host, config.server.port
    ));
    let host = config.server.host.clone();
    let port = config.server.port;
    server::run_server(&host, port, service, config).await
}
