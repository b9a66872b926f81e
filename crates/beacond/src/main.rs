//! beacond — decentralized service registry daemon.

use std::sync::Arc;

use anyhow::{Context, Result};

use beacon_core::BeaconConfig;
use beacon_services::dht::MainlineBackend;
use beacond::Node;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match BeaconConfig::write_default_if_missing() {
        Ok(path) => tracing::debug!(path = %path.display(), "config file"),
        Err(e) => tracing::warn!(error = %e, "failed to write default config"),
    }
    let config = BeaconConfig::load().context("failed to load config")?;

    tracing::info!(
        dht_port = config.dht_port,
        api_port = config.api_port,
        api_port_http = ?config.api_port_http,
        timeslot = config.timeslot,
        bootstrap = config.dht_bootstrap.len(),
        "beacond starting"
    );
    if config.cache_max_age.is_some() {
        tracing::debug!("cache_max_age is set but has no effect");
    }

    let node = Node::new(config, Arc::new(MainlineBackend::default()));
    node.start().await.context("failed to start node")?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received");

    node.stop().await.context("failed to stop node cleanly")?;
    Ok(())
}
