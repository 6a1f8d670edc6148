//! One-shot transfer finalizer.
//!
//! Meant to be called frequently, e.g. from a cron job:
//!
//! ```text
//! finalize --type INGEST
//! finalize --type DOWNLOAD
//! ```
//!
//! Exit codes: 0 = finalization ran, 1 = bad command line, 2 = the cycle
//! failed, 3 = staging initialization failed.

use std::sync::Arc;

use tracing::{error, info};

use datastage::config::AppConfig;
use datastage::logging;
use datastage::staging::registry::AccessPointRegistry;
use datastage::staging::service::StagingService;
use datastage::staging::store::{MemoryStore, SqliteStore, TransferStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FinalizeType {
    Ingest,
    Download,
}

fn parse_type(args: &[String]) -> Result<FinalizeType, String> {
    let mut value = None;
    for i in 0..args.len() {
        if (args[i] == "--type" || args[i] == "-t") && i + 1 < args.len() {
            value = Some(args[i + 1].clone());
        }
    }
    match value.as_deref() {
        Some("INGEST") => Ok(FinalizeType::Ingest),
        Some("DOWNLOAD") => Ok(FinalizeType::Download),
        Some(other) => Err(format!(
            "finalization type must be INGEST or DOWNLOAD, got '{other}'"
        )),
        None => Err("missing required argument --type INGEST|DOWNLOAD".to_string()),
    }
}

async fn run(finalize_type: FinalizeType) -> Result<usize, i32> {
    let env = std::env::var("DATASTAGE_ENV").unwrap_or_else(|_| "dev".to_string());
    let config = match AppConfig::load(&env) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return Err(3);
        }
    };
    let _guard = logging::init_logging(&config);

    let store: Arc<dyn TransferStore> = if config.staging.database_url == "memory" {
        Arc::new(MemoryStore::new())
    } else {
        match SqliteStore::connect(&config.staging.database_url).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                error!(error = %e, "failed to connect record store");
                return Err(3);
            }
        }
    };
    let registry = match AccessPointRegistry::from_configs(&config.staging.access_points, false) {
        Ok(registry) => registry,
        Err(e) => {
            error!(error = %e, "failed to set up access points");
            return Err(3);
        }
    };
    let service = StagingService::new(store, registry, config.staging.settings());

    let result = match finalize_type {
        FinalizeType::Ingest => service.finalize_ingests().await,
        FinalizeType::Download => service.finalize_downloads().await,
    };
    match result {
        Ok(actions) => {
            info!(?finalize_type, actions, "finalization finished");
            Ok(actions)
        }
        Err(e) => {
            error!(?finalize_type, error = %e, "finalization failed");
            Err(2)
        }
    }
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("usage: finalize --type INGEST|DOWNLOAD");
        return;
    }
    let finalize_type = match parse_type(&args) {
        Ok(t) => t,
        Err(message) => {
            eprintln!("{message}");
            eprintln!("usage: finalize --type INGEST|DOWNLOAD");
            std::process::exit(1);
        }
    };
    if let Err(code) = run(finalize_type).await {
        std::process::exit(code);
    }
}
