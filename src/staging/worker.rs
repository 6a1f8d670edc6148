//! Finalizer Worker
//!
//! Background loop standing in for an external scheduler: it invokes the
//! ingest and download finalize cycles on a fixed interval. Both cycles
//! are idempotent, so skipped or doubled runs are harmless.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use super::error::StagingError;
use super::service::StagingService;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often the finalize cycles run.
    pub scan_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(30),
        }
    }
}

pub struct FinalizerWorker {
    service: Arc<StagingService>,
    config: WorkerConfig,
}

impl FinalizerWorker {
    pub fn new(service: Arc<StagingService>, config: WorkerConfig) -> Self {
        Self { service, config }
    }

    pub fn with_defaults(service: Arc<StagingService>) -> Self {
        Self::new(service, WorkerConfig::default())
    }

    /// Run forever, finalizing on every tick. Cycle errors are logged and
    /// the loop keeps going.
    pub async fn run(&self) -> ! {
        info!(
            scan_interval_secs = self.config.scan_interval.as_secs(),
            "starting finalizer worker"
        );
        loop {
            if let Err(e) = self.run_cycle().await {
                error!(error = %e, "finalize cycle failed");
            }
            tokio::time::sleep(self.config.scan_interval).await;
        }
    }

    /// One full cycle over both transfer kinds. Returns the number of
    /// finalize actions taken per kind.
    pub async fn run_cycle(&self) -> Result<(usize, usize), StagingError> {
        let ingests = self.service.finalize_ingests().await?;
        let downloads = self.service.finalize_downloads().await?;
        if ingests + downloads > 0 {
            info!(ingests, downloads, "finalize cycle acted on transfers");
        } else {
            debug!("finalize cycle found nothing to do");
        }
        Ok((ingests, downloads))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_interval_matches_the_scheduler_contract() {
        let config = WorkerConfig::default();
        assert_eq!(config.scan_interval, Duration::from_secs(30));
    }
}
