//! Masked access point: the principal never shows up in remote URLs.
//!
//! Mapping:
//! - access URL  = `remoteBase/transferId/`
//! - local path  = `localBase/principal/transferId/`
//!
//! Models a front end (e.g. a WebDAV server behind mod_rewrite) that
//! resolves the authenticated principal out of band and redirects each user
//! into their own local sub-tree. Two principals may see the same remote
//! URL while ending up in different local folders.

use std::path::{Path, PathBuf};

use super::{AccessPoint, AccessPointConfig, DirectAccessPoint};
use crate::staging::context::SecurityContext;
use crate::staging::error::StagingError;
use crate::staging::record::TransferRecord;
use crate::staging::urls;

pub struct MaskedAccessPoint {
    // shares cache handling with the direct point, only the mappings differ
    inner: DirectAccessPoint,
}

impl MaskedAccessPoint {
    pub fn new(config: AccessPointConfig) -> Self {
        Self {
            inner: DirectAccessPoint::new(config),
        }
    }

    /// Local base including the masked principal segment.
    fn masked_base(&self, ctx: &SecurityContext) -> String {
        urls::append(
            &self.config().local_base_path,
            &format!("{}/", ctx.principal_id),
        )
    }
}

impl AccessPoint for MaskedAccessPoint {
    fn config(&self) -> &AccessPointConfig {
        self.inner.config()
    }

    fn validate(&self, check_only: bool) -> Result<(), StagingError> {
        self.inner.validate(check_only)
    }

    fn access_url(
        &self,
        record: &TransferRecord,
        _ctx: &SecurityContext,
    ) -> Result<String, StagingError> {
        // the principal segment is intentionally omitted here
        Ok(urls::append(
            &self.config().remote_base_url,
            &format!("{}/", record.transfer_id()),
        ))
    }

    fn local_path_for_url(
        &self,
        url: &str,
        ctx: &SecurityContext,
    ) -> Result<PathBuf, StagingError> {
        let relative = urls::relative_to(&self.config().remote_base_url, url).ok_or_else(|| {
            StagingError::ForeignUrl {
                url: url.to_string(),
                base: self.config().remote_base_url.clone(),
            }
        })?;
        Ok(PathBuf::from(format!(
            "{}{relative}",
            self.masked_base(ctx)
        )))
    }

    fn url_for_local_path(
        &self,
        path: &Path,
        ctx: &SecurityContext,
    ) -> Result<String, StagingError> {
        let masked_base = self.masked_base(ctx);
        let path_str = path.to_string_lossy();
        let relative = urls::relative_to(&masked_base, &path_str).ok_or_else(|| {
            StagingError::ForeignUrl {
                url: path_str.to_string(),
                base: masked_base.clone(),
            }
        })?;
        Ok(urls::append(&self.config().remote_base_url, &relative))
    }

    fn prepare_cache(
        &self,
        record: &TransferRecord,
        ctx: &SecurityContext,
    ) -> Result<(), StagingError> {
        let access_url = self.access_url(record, ctx)?;
        let local = self.local_path_for_url(&access_url, ctx)?;
        if !local.exists() {
            std::fs::create_dir_all(&local).map_err(|e| {
                StagingError::Preparation(format!(
                    "failed to create cache folder {} for transfer {}: {e}",
                    local.display(),
                    record.transfer_id()
                ))
            })?;
        } else {
            super::wipe_children(&local).map_err(|e| {
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
        record: &TransferRecord,
        ctx: &SecurityContext,
    ) -> bool {
        self.inner.prepare_cleanup_internal(record, ctx)
    }
}
