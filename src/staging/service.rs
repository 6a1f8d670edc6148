//! Staging Orchestrator
//!
//! Central component tying the record store and the access points
//! together: it reserves staged environments for new transfers, resolves
//! staged folders, and drives the periodic finalize cycles that expire and
//! physically remove overdue transfers.
//!
//! # Finalize cycle
//!
//! ```text
//! expired?  ──mark──▶  Removed (+ .deleted marker)
//! Removed + folder present + marker  ──▶  folder deleted
//! Removed + folder gone              ──▶  record purged from the store
//! ```
//!
//! Folder deletion and record purge happen in different cycles, so the
//! Removed status stays observable for one scan interval and the record
//! only leaves the store after the physical cleanup has happened.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::access_point::{self, deleted_marker};
use super::context::{Role, SecurityContext};
use super::error::StagingError;
use super::record::{TransferKind, TransferRecord};
use super::registry::AccessPointRegistry;
use super::status::{DownloadStatus, IngestStatus, TransferStatus, combine};
use super::store::TransferStore;

/// Seven days, the default lifetime for both transfer kinds.
pub const DEFAULT_LIFETIME_MS: i64 = 7 * 24 * 60 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct StagingSettings {
    /// Directory for per-transfer temporary data (checkpoints).
    pub temp_dir: PathBuf,
    pub max_ingest_lifetime_ms: i64,
    pub max_download_lifetime_ms: i64,
}

impl Default for StagingSettings {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir().join("datastage"),
            max_ingest_lifetime_ms: DEFAULT_LIFETIME_MS,
            max_download_lifetime_ms: DEFAULT_LIFETIME_MS,
        }
    }
}

/// Coarse result of an environment reservation, consumed by the
/// preparation pipeline.
#[derive(Debug, Clone)]
pub struct PreparationOutcome {
    /// Status id the record ended up in.
    pub status: i32,
    pub staging_url: Option<String>,
    pub error_message: Option<String>,
}

impl PreparationOutcome {
    pub fn is_prepared(&self) -> bool {
        self.staging_url.is_some()
    }
}

pub struct StagingService {
    store: Arc<dyn TransferStore>,
    registry: AccessPointRegistry,
    settings: StagingSettings,
}

impl StagingService {
    pub fn new(
        store: Arc<dyn TransferStore>,
        registry: AccessPointRegistry,
        settings: StagingSettings,
    ) -> Self {
        Self {
            store,
            registry,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn TransferStore> {
        &self.store
    }

    pub fn registry(&self) -> &AccessPointRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &StagingSettings {
        &self.settings
    }

    pub fn now_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    /// Context allowed to act on the given record's behalf.
    pub fn context_for(&self, record: &TransferRecord) -> SecurityContext {
        SecurityContext::new(record.owner_id.clone(), record.group_id.clone(), Role::Member)
    }

    fn system_context() -> SecurityContext {
        SecurityContext::new("system", "system", Role::Administrator)
    }

    /// Create and persist a new ingest record for a digital object.
    pub async fn create_ingest(
        &self,
        object_id: &str,
        access_point_id: &str,
        ctx: &SecurityContext,
    ) -> Result<TransferRecord, StagingError> {
        let mut record = TransferRecord::ingest(object_id, ctx);
        record.access_point_id = Some(access_point_id.to_string());
        Ok(self.store.create(record, Self::now_ms(), ctx).await?)
    }

    /// Create and persist a new download record for a digital object.
    pub async fn create_download(
        &self,
        object_id: &str,
        access_point_id: &str,
        ctx: &SecurityContext,
    ) -> Result<TransferRecord, StagingError> {
        let mut record = TransferRecord::download(object_id, ctx);
        record.access_point_id = Some(access_point_id.to_string());
        Ok(self.store.create(record, Self::now_ms(), ctx).await?)
    }

    /// Reserve the upload destination of an ingest. On success the record's
    /// status is advanced to the interactive code and the staging URL is
    /// returned for publication; on failure only the outcome reports the
    /// cause (the pipeline persists the failed status exactly once).
    pub async fn reserve_ingest_environment(
        &self,
        record: &TransferRecord,
        access_point_id: &str,
        ctx: &SecurityContext,
    ) -> Result<PreparationOutcome, StagingError> {
        self.reserve_environment(
            record,
            access_point_id,
            ctx,
            IngestStatus::UploadScheduled.id(),
            IngestStatus::PreparationFailed.id(),
        )
        .await
    }

    /// Reserve the staged source folder of a download.
    pub async fn reserve_download_environment(
        &self,
        record: &TransferRecord,
        access_point_id: &str,
        ctx: &SecurityContext,
    ) -> Result<PreparationOutcome, StagingError> {
        self.reserve_environment(
            record,
            access_point_id,
            ctx,
            DownloadStatus::Ready.id(),
            DownloadStatus::PreparationFailed.id(),
        )
        .await
    }

    async fn reserve_environment(
        &self,
        record: &TransferRecord,
        access_point_id: &str,
        ctx: &SecurityContext,
        ready_status: i32,
        failed_status: i32,
    ) -> Result<PreparationOutcome, StagingError> {
        let Some(point) = self.registry.get(access_point_id) else {
            return Ok(PreparationOutcome {
                status: failed_status,
                staging_url: None,
                error_message: Some(format!("access point '{access_point_id}' is not configured")),
            });
        };
        if self.registry.is_disabled(access_point_id) {
            return Ok(PreparationOutcome {
                status: failed_status,
                staging_url: None,
                error_message: Some(format!("access point '{access_point_id}' is disabled")),
            });
        }

        debug!(transfer = %record.transfer_id(), object = %record.object_id, ctx = %ctx, "reserving staged environment");
        match access_point::prepare(point.as_ref(), record, ctx) {
            Ok(()) => {
                let staging_url = point.access_url(record, ctx)?;
                self.store
                    .update_status(record.kind, record.id, ready_status, None, Self::now_ms(), ctx)
                    .await?;
                Ok(PreparationOutcome {
                    status: ready_status,
                    staging_url: Some(staging_url),
                    error_message: None,
                })
            }
            Err(e) => Ok(PreparationOutcome {
                status: failed_status,
                staging_url: None,
                error_message: Some(e.to_string()),
            }),
        }
    }

    /// Staged base folder of one transfer, resolved through its owning
    /// access point.
    pub fn local_staging_folder(
        &self,
        record: &TransferRecord,
        ctx: &SecurityContext,
    ) -> Result<PathBuf, StagingError> {
        let point = self.registry.resolve(record.access_point_id.as_deref())?;
        let url = point.access_url(record, ctx)?;
        point.local_path_for_url(&url, ctx)
    }

    /// Flag a transfer as removed: prepare its folder for deletion and
    /// advance the status to the removed code. Returns false when the
    /// folder could not be marked safe to delete.
    pub async fn mark_removed(&self, record: &TransferRecord) -> Result<bool, StagingError> {
        let ctx = self.context_for(record);
        let point = self.registry.resolve(record.access_point_id.as_deref())?;
        if !access_point::prepare_cleanup(point.as_ref(), record, &ctx) {
            return Ok(false);
        }
        self.store
            .update_status(
                record.kind,
                record.id,
                record.removed_status_id(),
                record.error_message(),
                Self::now_ms(),
                &ctx,
            )
            .await?;
        info!(transfer = %record.transfer_id(), kind = %record.kind, "transfer marked removed");
        Ok(true)
    }

    /// Whether the staged folder is flagged for deletion (or already gone).
    pub fn is_removal_prepared(
        &self,
        record: &TransferRecord,
        ctx: &SecurityContext,
    ) -> Result<bool, StagingError> {
        let folder = self.local_staging_folder(record, ctx)?;
        if !folder.exists() {
            return Ok(true);
        }
        Ok(deleted_marker(&folder).is_file())
    }

    /// One finalize cycle for ingests. Idempotent; safe to run back-to-back
    /// and concurrently with in-flight transfers of other ids.
    pub async fn finalize_ingests(&self) -> Result<usize, StagingError> {
        self.finalize_kind(TransferKind::Ingest).await
    }

    /// One finalize cycle for downloads.
    pub async fn finalize_downloads(&self) -> Result<usize, StagingError> {
        self.finalize_kind(TransferKind::Download).await
    }

    fn open_status_mask(kind: TransferKind) -> i32 {
        match kind {
            TransferKind::Ingest => combine(&[
                IngestStatus::Preparing,
                IngestStatus::PreparationFailed,
                IngestStatus::UploadScheduled,
                IngestStatus::UploadRunning,
                IngestStatus::UploadFinished,
                IngestStatus::UploadFailed,
                IngestStatus::ArchiveRunning,
                IngestStatus::ArchiveFinished,
                IngestStatus::ArchiveFailed,
            ]),
            TransferKind::Download => combine(&[
                DownloadStatus::Scheduled,
                DownloadStatus::Preparing,
                DownloadStatus::PreparationFailed,
                DownloadStatus::Ready,
            ]),
        }
    }

    fn removed_status_mask(kind: TransferKind) -> i32 {
        match kind {
            TransferKind::Ingest => IngestStatus::Removed.id(),
            TransferKind::Download => DownloadStatus::Removed.id(),
        }
    }

    fn default_lifetime_ms(&self, kind: TransferKind) -> i64 {
        match kind {
            TransferKind::Ingest => self.settings.max_ingest_lifetime_ms,
            TransferKind::Download => self.settings.max_download_lifetime_ms,
        }
    }

    async fn finalize_kind(&self, kind: TransferKind) -> Result<usize, StagingError> {
        let system = Self::system_context();
        let now = Self::now_ms();
        let lifetime = self.default_lifetime_ms(kind);
        let mut actions = 0;

        // expiry sweep; records without a published staging URL are still in
        // preparation and not visible to expiry
        let open = self
            .store
            .list_by_status(kind, Self::open_status_mask(kind), None, &system)
            .await?;
        for record in open {
            if record.staging_url.is_none() || !record.is_expired(now, lifetime) {
                continue;
            }
            debug!(transfer = %record.transfer_id(), kind = %kind, "transfer expired");
            match self.mark_removed(&record).await {
                Ok(true) => actions += 1,
                Ok(false) => {
                    warn!(transfer = %record.transfer_id(), "could not prepare cleanup of expired transfer")
                }
                Err(e) => {
                    warn!(transfer = %record.transfer_id(), error = %e, "failed to mark expired transfer removed")
                }
            }
        }

        // physical pass; folder deletion and record purge are separated by
        // one cycle so the removed status stays observable
        let removed = self
            .store
            .list_by_status(kind, Self::removed_status_mask(kind), None, &system)
            .await?;
        for record in removed {
            let ctx = self.context_for(&record);
            let folder = match self.local_staging_folder(&record, &ctx) {
                Ok(folder) => folder,
                Err(e) => {
                    warn!(transfer = %record.transfer_id(), error = %e, "cannot resolve staged folder of removed transfer");
                    continue;
                }
            };
            if !folder.exists() {
                self.store.delete(kind, record.id, &ctx).await?;
                info!(transfer = %record.transfer_id(), kind = %kind, "removed transfer purged");
                actions += 1;
                continue;
            }
            if !deleted_marker(&folder).is_file() {
                let point = match self.registry.resolve(record.access_point_id.as_deref()) {
                    Ok(point) => point,
                    Err(e) => {
                        warn!(transfer = %record.transfer_id(), error = %e, "no access point for removed transfer");
                        continue;
                    }
                };
                if !access_point::prepare_cleanup(point.as_ref(), &record, &ctx) {
                    warn!(transfer = %record.transfer_id(), "staged folder still not marked safe to delete");
                    continue;
                }
            }
            match std::fs::remove_dir_all(&folder) {
                Ok(()) => {
                    info!(transfer = %record.transfer_id(), path = %folder.display(), "staged folder deleted");
                    actions += 1;
                }
                Err(e) => {
                    // the transferred data itself is intact, never escalate
                    warn!(path = %folder.display(), error = %e, "failed to delete staged folder")
                }
            }
        }

        Ok(actions)
    }
}
