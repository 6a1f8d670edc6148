use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::staging::access_point::AccessPointConfig;
use crate::staging::error::StagingError;
use crate::staging::service::{DEFAULT_LIFETIME_MS, StagingSettings};
use crate::staging::worker::WorkerConfig;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    #[serde(default)]
    pub staging: StagingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StagingConfig {
    /// `sqlite://<path>?mode=rwc` for a durable store, `memory` for an
    /// in-process one.
    pub database_url: String,
    /// Per-transfer temporary data (checkpoints).
    pub temp_dir: String,
    pub max_ingest_lifetime_secs: u64,
    pub max_download_lifetime_secs: u64,
    pub scan_interval_secs: u64,
    #[serde(default)]
    pub access_points: Vec<AccessPointConfig>,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            database_url: "memory".to_string(),
            temp_dir: "./data/staging-tmp".to_string(),
            max_ingest_lifetime_secs: (DEFAULT_LIFETIME_MS / 1000) as u64,
            max_download_lifetime_secs: (DEFAULT_LIFETIME_MS / 1000) as u64,
            scan_interval_secs: 30,
            access_points: Vec::new(),
        }
    }
}

impl StagingConfig {
    pub fn settings(&self) -> StagingSettings {
        StagingSettings {
            temp_dir: PathBuf::from(&self.temp_dir),
            max_ingest_lifetime_ms: self.max_ingest_lifetime_secs as i64 * 1000,
            max_download_lifetime_ms: self.max_download_lifetime_secs as i64 * 1000,
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            scan_interval: Duration::from_secs(self.scan_interval_secs),
        }
    }
}

impl AppConfig {
    /// Load `config/<env>.yaml`.
    pub fn load(env: &str) -> Result<Self, StagingError> {
        let config_path = format!("config/{env}.yaml");
        let content = fs::read_to_string(&config_path).map_err(|e| {
            StagingError::Configuration(format!("failed to read config file {config_path}: {e}"))
        })?;
        serde_yaml::from_str(&content).map_err(|e| {
            StagingError::Configuration(format!("failed to parse config file {config_path}: {e}"))
        })
    }
}
