//! Direct access point: the principal is visible in the remote URL.
//!
//! Mapping:
//! - access URL  = `remoteBase/principal/transferId/`
//! - local path  = `localBase/principal/transferId/`
//!
//! Use this only when the cache or its protocol takes care of access
//! restrictions itself; anyone who can guess a transfer id can derive the
//! location of another principal's staging folder.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{AccessPoint, AccessPointConfig, wipe_children};
use crate::staging::context::SecurityContext;
use crate::staging::error::StagingError;
use crate::staging::record::TransferRecord;
use crate::staging::urls;

pub struct DirectAccessPoint {
    config: AccessPointConfig,
}

impl DirectAccessPoint {
    pub fn new(config: AccessPointConfig) -> Self {
        Self {
            config: config.normalized(),
        }
    }
}

impl AccessPoint for DirectAccessPoint {
    fn config(&self) -> &AccessPointConfig {
        &self.config
    }

    fn validate(&self, check_only: bool) -> Result<(), StagingError> {
        let base = Path::new(&self.config.local_base_path);
        if check_only {
            if !base.is_dir() {
                return Err(StagingError::PropertyValidation(format!(
                    "local base path '{}' is not an accessible directory",
                    self.config.local_base_path
                )));
            }
            return Ok(());
        }
        if !base.exists() {
            debug!(path = %base.display(), "creating local base path");
            fs::create_dir_all(base).map_err(|e| {
                StagingError::Configuration(format!(
                    "failed to create local base path '{}': {e}",
                    self.config.local_base_path
                ))
            })?;
        } else if !base.is_dir() {
            return Err(StagingError::Configuration(format!(
                "local base path '{}' exists but is no directory",
                self.config.local_base_path
            )));
        } else if self.config.transient {
            debug!(path = %base.display(), "wiping cache of transient access point");
            wipe_children(base).map_err(|e| {
                StagingError::Configuration(format!(
                    "failed to wipe transient cache '{}': {e}",
                    self.config.local_base_path
                ))
            })?;
        }
        Ok(())
    }

    fn access_url(
        &self,
        record: &TransferRecord,
        ctx: &SecurityContext,
    ) -> Result<String, StagingError> {
        Ok(urls::append(
            &self.config.remote_base_url,
            &format!("{}/{}/", ctx.principal_id, record.transfer_id()),
        ))
    }

    fn local_path_for_url(
        &self,
        url: &str,
        _ctx: &SecurityContext,
    ) -> Result<PathBuf, StagingError> {
        let relative = urls::relative_to(&self.config.remote_base_url, url).ok_or_else(|| {
            StagingError::ForeignUrl {
                url: url.to_string(),
                base: self.config.remote_base_url.clone(),
            }
        })?;
        Ok(PathBuf::from(format!(
            "{}{relative}",
            self.config.local_base_path
        )))
    }

    fn url_for_local_path(
        &self,
        path: &Path,
        _ctx: &SecurityContext,
    ) -> Result<String, StagingError> {
        let path_str = path.to_string_lossy();
        let relative =
            urls::relative_to(&self.config.local_base_path, &path_str).ok_or_else(|| {
                StagingError::ForeignUrl {
                    url: path_str.to_string(),
                    base: self.config.local_base_path.clone(),
                }
            })?;
        Ok(urls::append(&self.config.remote_base_url, &relative))
    }

    fn prepare_cache(
        &self,
        record: &TransferRecord,
        ctx: &SecurityContext,
    ) -> Result<(), StagingError> {
        let access_url = self.access_url(record, ctx)?;
        let local = self.local_path_for_url(&access_url, ctx)?;
        debug!(transfer = %record.transfer_id(), path = %local.display(), "preparing cache folder");
        if !local.exists() {
            fs::create_dir_all(&local).map_err(|e| {
                StagingError::Preparation(format!(
                    "failed to create cache folder {} for transfer {}: {e}",
                    local.display(),
                    record.transfer_id()
                ))
            })?;
        } else {
            // a re-prepared transfer starts from an empty folder
            wipe_children(&local).map_err(|e| {
                StagingError::Preparation(format!(
                    "failed to clear cache folder {} for transfer {}: {e}",
                    local.display(),
                    record.transfer_id()
                ))
            })?;
        }
        Ok(())
    }

    fn prepare_cleanup_internal(
        &self,
        _record: &TransferRecord,
        _ctx: &SecurityContext,
    ) -> bool {
        // folders are created world-deletable for the service user already
        true
    }
}
