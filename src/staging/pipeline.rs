//! Transfer Preparation Pipeline
//!
//! Turns a freshly created transfer record into a concretely reachable,
//! access-controlled staging folder. Four steps run strictly in order,
//! each only on success of the previous one:
//!
//! 1. **Setup**: resolve the access point, run the strategy's setup hook.
//! 2. **Environment**: the orchestrator reserves the staged destination
//!    (ingest) or source (download); a failure is persisted on the record
//!    exactly once before it propagates.
//! 3. **Client access**: the strategy may produce a mover-reachable URL;
//!    absence of one is not an error (some movers hit the filesystem path
//!    directly).
//! 4. **Publish**: staging and, if present, client URL are durably
//!    recorded; a missing staging URL at this point is a contract
//!    violation of step 2.
//!
//! Ingest vs. download is a strategy value, not a type hierarchy: the two
//! shipped strategies only differ in which orchestrator call step 2 makes,
//! which the pipeline derives from the record kind.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::context::SecurityContext;
use super::error::StagingError;
use super::record::{TransferKind, TransferRecord};
use super::service::{PreparationOutcome, StagingService};
use super::store::TransferStore;

/// In-flight property set of one preparation run.
#[derive(Debug, Clone, Default)]
pub struct PreparationProps {
    pub access_point_id: String,
    pub staging_url: Option<String>,
    pub client_access_url: Option<String>,
}

impl PreparationProps {
    pub fn for_access_point(access_point_id: impl Into<String>) -> Self {
        Self {
            access_point_id: access_point_id.into(),
            ..Self::default()
        }
    }
}

/// Extension hooks of a transfer direction. All default to no-ops; a mover
/// integration overrides what it needs (e.g. `prepare_client_access` to
/// spin up a network-reachable handle).
#[async_trait]
pub trait PreparationHooks: Send + Sync {
    async fn setup(
        &self,
        _props: &mut PreparationProps,
        _ctx: &SecurityContext,
    ) -> Result<(), StagingError> {
        Ok(())
    }

    async fn prepare_environment(
        &self,
        _props: &mut PreparationProps,
        _ctx: &SecurityContext,
    ) -> Result<(), StagingError> {
        Ok(())
    }

    async fn prepare_client_access(
        &self,
        _props: &mut PreparationProps,
        _ctx: &SecurityContext,
    ) -> Result<(), StagingError> {
        Ok(())
    }

    async fn publish(
        &self,
        _props: &mut PreparationProps,
        _ctx: &SecurityContext,
    ) -> Result<(), StagingError> {
        Ok(())
    }
}

/// Default strategy for uploads into the store.
pub struct IngestPreparation;

#[async_trait]
impl PreparationHooks for IngestPreparation {}

/// Default strategy for downloads out of the store.
pub struct DownloadPreparation;

#[async_trait]
impl PreparationHooks for DownloadPreparation {}

pub struct PreparationPipeline {
    service: Arc<StagingService>,
}

impl PreparationPipeline {
    pub fn new(service: Arc<StagingService>) -> Self {
        Self { service }
    }

    /// Run the full preparation protocol for one record. Any failure has
    /// updated the record's status with a descriptive message before this
    /// returns the error.
    pub async fn prepare_transfer(
        &self,
        record: &TransferRecord,
        hooks: &dyn PreparationHooks,
        props: &mut PreparationProps,
        ctx: &SecurityContext,
    ) -> Result<(), StagingError> {
        // step 1: setup
        if self.service.registry().get(&props.access_point_id).is_none() {
            return Err(StagingError::Preparation(format!(
                "no access point found for id '{}'",
                props.access_point_id
            )));
        }
        debug!(transfer = %record.transfer_id(), "running external setup");
        hooks.setup(props, ctx).await?;

        // step 2: environment
        let outcome = match record.kind {
            TransferKind::Ingest => {
                self.service
                    .reserve_ingest_environment(record, &props.access_point_id, ctx)
                    .await?
            }
            TransferKind::Download => {
                self.service
                    .reserve_download_environment(record, &props.access_point_id, ctx)
                    .await?
            }
        };
        self.handle_environment_outcome(record, outcome, props, ctx).await?;
        hooks.prepare_environment(props, ctx).await?;

        // step 3: client access
        hooks.prepare_client_access(props, ctx).await?;

        // step 4: publish
        let staging_url = props.staging_url.clone().ok_or_else(|| {
            StagingError::Preparation(
                "no staging URL present after environment preparation".into(),
            )
        })?;
        info!(transfer = %record.transfer_id(), staging_url = %staging_url, "publishing staging URL");
        self.service
            .store()
            .update_staging_url(
                record.kind,
                record.id,
                &staging_url,
                StagingService::now_ms(),
                ctx,
            )
            .await?;

        if let Some(client_url) = props.client_access_url.clone() {
            info!(transfer = %record.transfer_id(), client_url = %client_url, "publishing client access URL");
            self.service
                .store()
                .update_client_access_url(
                    record.kind,
                    record.id,
                    &client_url,
                    StagingService::now_ms(),
                    ctx,
                )
                .await?;
        } else {
            debug!(transfer = %record.transfer_id(), "no client access URL, direct access assumed");
        }

        hooks.publish(props, ctx).await
    }

    async fn handle_environment_outcome(
        &self,
        record: &TransferRecord,
        outcome: PreparationOutcome,
        props: &mut PreparationProps,
        ctx: &SecurityContext,
    ) -> Result<(), StagingError> {
        if outcome.is_prepared() {
            props.staging_url = outcome.staging_url;
            return Ok(());
        }
        let message = outcome
            .error_message
            .unwrap_or_else(|| "environment preparation failed".to_string());
        // persist the failure before propagating so polling observers see it
        // even if the caller dies right after
        self.service
            .store()
            .update_status(
                record.kind,
                record.id,
                outcome.status,
                Some(&message),
                StagingService::now_ms(),
                ctx,
            )
            .await?;
        Err(StagingError::Preparation(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::access_point::{AccessPointConfig, AccessPointKind};
    use crate::staging::context::Role;
    use crate::staging::registry::AccessPointRegistry;
    use crate::staging::service::StagingSettings;
    use crate::staging::status::{DownloadStatus, IngestStatus};
    use crate::staging::store::MemoryStore;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn ctx() -> SecurityContext {
        SecurityContext::new("alice", "geo", Role::Member)
    }

    fn service(temp: &TempDir) -> Arc<StagingService> {
        let config = AccessPointConfig {
            id: "cache".into(),
            name: "Cache".into(),
            kind: AccessPointKind::Direct,
            local_base_path: temp.path().join("cache").display().to_string(),
            remote_base_url: "http://localhost/webdav".into(),
            transient: false,
            disabled: false,
            is_default: true,
            properties: HashMap::new(),
        };
        let registry = AccessPointRegistry::from_configs(&[config], false).unwrap();
        Arc::new(StagingService::new(
            Arc::new(MemoryStore::new()),
            registry,
            StagingSettings {
                temp_dir: temp.path().join("tmp"),
                ..StagingSettings::default()
            },
        ))
    }

    #[tokio::test]
    async fn ingest_preparation_publishes_staging_url() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);
        let pipeline = PreparationPipeline::new(service.clone());

        let record = service.create_ingest("obj-1", "cache", &ctx()).await.unwrap();
        let mut props = PreparationProps::for_access_point("cache");
        pipeline
            .prepare_transfer(&record, &IngestPreparation, &mut props, &ctx())
            .await
            .unwrap();

        let stored = service
            .store()
            .find(record.kind, record.id, &ctx())
            .await
            .unwrap()
            .unwrap();
        let expected_url = format!("http://localhost/webdav/alice/{}/", record.id);
        assert_eq!(stored.staging_url.as_deref(), Some(expected_url.as_str()));
        assert_eq!(stored.ingest_status(), IngestStatus::UploadScheduled);
        assert_eq!(stored.client_access_url, None);
        assert_eq!(props.staging_url.as_deref(), Some(expected_url.as_str()));
    }

    #[tokio::test]
    async fn download_preparation_reaches_ready() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);
        let pipeline = PreparationPipeline::new(service.clone());

        let record = service
            .create_download("obj-1", "cache", &ctx())
            .await
            .unwrap();
        let mut props = PreparationProps::for_access_point("cache");
        pipeline
            .prepare_transfer(&record, &DownloadPreparation, &mut props, &ctx())
            .await
            .unwrap();

        let stored = service
            .store()
            .find(record.kind, record.id, &ctx())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.download_status(), DownloadStatus::Ready);
        assert!(stored.staging_url.is_some());
    }

    #[tokio::test]
    async fn unknown_access_point_fails_fast() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);
        let pipeline = PreparationPipeline::new(service.clone());

        let record = service.create_ingest("obj-1", "cache", &ctx()).await.unwrap();
        let mut props = PreparationProps::for_access_point("nope");
        let result = pipeline
            .prepare_transfer(&record, &IngestPreparation, &mut props, &ctx())
            .await;
        assert!(matches!(result, Err(StagingError::Preparation(_))));

        // fail-fast happens before the environment phase, nothing published
        let stored = service
            .store()
            .find(record.kind, record.id, &ctx())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.staging_url, None);
        assert_eq!(stored.ingest_status(), IngestStatus::Preparing);
    }

    #[tokio::test]
    async fn environment_failure_is_recorded_once() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);
        let pipeline = PreparationPipeline::new(service.clone());

        let record = service.create_ingest("obj-1", "cache", &ctx()).await.unwrap();
        // make the access point's base path unusable for this transfer
        let blocking = temp.path().join("cache").join("alice");
        std::fs::create_dir_all(temp.path().join("cache")).unwrap();
        std::fs::write(&blocking, b"not a directory").unwrap();

        let mut props = PreparationProps::for_access_point("cache");
        let result = pipeline
            .prepare_transfer(&record, &IngestPreparation, &mut props, &ctx())
            .await;
        assert!(matches!(result, Err(StagingError::Preparation(_))));

        let stored = service
            .store()
            .find(record.kind, record.id, &ctx())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.ingest_status(), IngestStatus::PreparationFailed);
        assert!(stored.error_message().is_some());
        assert_eq!(stored.staging_url, None);
    }

    struct ClientAccessHooks {
        published: Mutex<bool>,
    }

    #[async_trait]
    impl PreparationHooks for ClientAccessHooks {
        async fn prepare_client_access(
            &self,
            props: &mut PreparationProps,
            _ctx: &SecurityContext,
        ) -> Result<(), StagingError> {
            let staging = props.staging_url.clone().unwrap();
            props.client_access_url = Some(staging.replace("http://", "https://"));
            Ok(())
        }

        async fn publish(
            &self,
            _props: &mut PreparationProps,
            _ctx: &SecurityContext,
        ) -> Result<(), StagingError> {
            *self.published.lock().unwrap() = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn client_access_url_is_published_separately() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);
        let pipeline = PreparationPipeline::new(service.clone());
        let hooks = ClientAccessHooks {
            published: Mutex::new(false),
        };

        let record = service.create_ingest("obj-1", "cache", &ctx()).await.unwrap();
        let mut props = PreparationProps::for_access_point("cache");
        pipeline
            .prepare_transfer(&record, &hooks, &mut props, &ctx())
            .await
            .unwrap();

        let stored = service
            .store()
            .find(record.kind, record.id, &ctx())
            .await
            .unwrap()
            .unwrap();
        let client = stored.client_access_url.unwrap();
        assert!(client.starts_with("https://"));
        assert!(*hooks.published.lock().unwrap());
    }
}
