//! datastage - Data Staging Service
//!
//! Stages bulk data between a permanent object store and client-accessible
//! cache folders for ingest (upload) and download transfers.
//!
//! # Modules
//!
//! - [`staging`] - the staging/transfer orchestration subsystem
//! - [`config`] - YAML application configuration
//! - [`logging`] - tracing setup (file + stdout layers)

pub mod config;
pub mod logging;
pub mod staging;

// Convenient re-exports at crate root
pub use config::{AppConfig, StagingConfig};
pub use staging::{
    AccessPoint, AccessPointConfig, AccessPointKind, AccessPointRegistry, CleanupManager,
    DownloadStatus, FinalizerWorker, IngestStatus, MemoryStore, Mover, MoverError,
    PreparationHooks, PreparationOutcome, PreparationPipeline, PreparationProps, Role,
    SecurityContext, SqliteStore, StagingError, StagingService, StagingSettings, StoreError,
    TaskContainer, TaskStatus, TransferKind, TransferRecord, TransferStatus, TransferStore,
    TransferTask, WorkerConfig,
};
