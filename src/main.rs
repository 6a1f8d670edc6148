//! datastage service daemon
//!
//! Wires configuration, logging, the record store and the access point
//! registry together, then runs the periodic finalizer. Transfer
//! preparation itself is driven by the callers of
//! [`datastage::staging::PreparationPipeline`] (e.g. a REST front end
//! living outside this crate).

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use datastage::config::AppConfig;
use datastage::logging;
use datastage::staging::registry::AccessPointRegistry;
use datastage::staging::service::StagingService;
use datastage::staging::store::{MemoryStore, SqliteStore, TransferStore};
use datastage::staging::worker::FinalizerWorker;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--env" && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    std::env::var("DATASTAGE_ENV").unwrap_or_else(|_| "dev".to_string())
}

async fn build_store(database_url: &str) -> anyhow::Result<Arc<dyn TransferStore>> {
    if database_url == "memory" {
        Ok(Arc::new(MemoryStore::new()))
    } else {
        let store = SqliteStore::connect(database_url)
            .await
            .with_context(|| format!("connecting record store at {database_url}"))?;
        Ok(Arc::new(store))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config =
        AppConfig::load(&env).with_context(|| format!("loading configuration for env '{env}'"))?;
    let _guard = logging::init_logging(&config);
    info!(env = %env, "starting datastage");

    let store = build_store(&config.staging.database_url).await?;
    let registry = AccessPointRegistry::from_configs(&config.staging.access_points, false)
        .context("setting up access points")?;
    info!(access_points = ?registry.ids(), "access points configured");

    let service = Arc::new(StagingService::new(
        store,
        registry,
        config.staging.settings(),
    ));

    let worker = FinalizerWorker::new(service, config.staging.worker_config());
    worker.run().await
}
