//! Staging Access Points
//!
//! An access point virtualizes one cache location: it maps between locally
//! reachable paths and remotely reachable URLs for a given transfer and
//! security context, and it prepares and tears down the on-disk folder
//! layout. Implementations only supply the mapping and the cache-specific
//! hooks; the shared folder structure lives here so client and service side
//! agree on it by construction.

pub mod direct;
pub mod masked;

pub use direct::DirectAccessPoint;
pub use masked::MaskedAccessPoint;

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::context::SecurityContext;
use super::error::StagingError;
use super::record::TransferRecord;
use super::urls;

/// Fixed sub-folder receiving the transferred payload.
pub const DATA_FOLDER_NAME: &str = "data";
/// Fixed sub-folder for internal settings of a transfer.
pub const SETTINGS_FOLDER_NAME: &str = "settings";
/// Fixed sub-folder for files generated before/after the transfer.
pub const GENERATED_FOLDER_NAME: &str = "generated";
/// Marker file flagging a staged folder as safe to delete.
pub const DELETED_MARKER_NAME: &str = ".deleted";

/// Which mapping implementation a configured access point uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessPointKind {
    /// `remoteBase/principal/transferId/` on both sides.
    Direct,
    /// `remoteBase/transferId/` remotely; the principal segment only exists
    /// on the local side and is resolved out of band (reverse proxy).
    Masked,
}

/// Persistent-shaped configuration of one access point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessPointConfig {
    pub id: String,
    pub name: String,
    pub kind: AccessPointKind,
    pub local_base_path: String,
    pub remote_base_url: String,
    /// Transient caches are wiped during setup.
    #[serde(default)]
    pub transient: bool,
    /// Disabled points are kept for cleanup but refuse new transfers.
    #[serde(default)]
    pub disabled: bool,
    /// Fallback point when a request names no access point.
    #[serde(default, rename = "default")]
    pub is_default: bool,
    /// Open bag for implementation-specific settings.
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl AccessPointConfig {
    /// Base locations always carry a trailing separator; fixing that up is
    /// pure string work and happens once, at construction of the point.
    pub fn normalized(mut self) -> Self {
        self.local_base_path = urls::ensure_trailing_slash(&self.local_base_path);
        self.remote_base_url = urls::ensure_trailing_slash(&self.remote_base_url);
        self
    }
}

/// Customization points of an access point implementation. The shared
/// template logic ([`setup`], [`prepare`], [`prepare_cleanup`]) drives
/// these; callers go through the free functions.
pub trait AccessPoint: Send + Sync {
    fn config(&self) -> &AccessPointConfig;

    /// Implementation-specific part of [`setup`]: check (and unless
    /// `check_only`, create) whatever the cache needs locally.
    fn validate(&self, check_only: bool) -> Result<(), StagingError>;

    /// Remotely reachable base URL of one transfer. Deterministic in the
    /// transfer id, the context and the configured remote base.
    fn access_url(&self, record: &TransferRecord, ctx: &SecurityContext)
    -> Result<String, StagingError>;

    /// Local path corresponding to a URL below the remote base.
    fn local_path_for_url(&self, url: &str, ctx: &SecurityContext)
    -> Result<PathBuf, StagingError>;

    /// URL corresponding to a local path below the local base.
    fn url_for_local_path(&self, path: &Path, ctx: &SecurityContext)
    -> Result<String, StagingError>;

    /// Make the access URL resolvable to an existing, empty, permission-
    /// correct local folder.
    fn prepare_cache(&self, record: &TransferRecord, ctx: &SecurityContext)
    -> Result<(), StagingError>;

    /// Relax permissions/ownership so the staged folder can be deleted.
    fn prepare_cleanup_internal(&self, record: &TransferRecord, ctx: &SecurityContext) -> bool;

    fn id(&self) -> &str {
        &self.config().id
    }

    fn name(&self) -> &str {
        &self.config().name
    }
}

/// Validate an access point and, unless `check_only`, create its local base
/// structure. Idempotent; calling twice must not duplicate state.
pub fn setup(point: &dyn AccessPoint, check_only: bool) -> Result<(), StagingError> {
    let config = point.config();
    if config.local_base_path.is_empty() || config.local_base_path == "/" {
        return Err(StagingError::Configuration(format!(
            "access point '{}' has no usable local base path",
            config.id
        )));
    }
    if !urls::is_well_formed(&config.remote_base_url) {
        return Err(StagingError::Configuration(format!(
            "remote base URL '{}' of access point '{}' is no valid URL",
            config.remote_base_url, config.id
        )));
    }
    debug!(access_point = %config.id, "performing access point setup");
    point.validate(check_only)
}

/// Prepare the staged folder structure for one transfer: the cache-specific
/// base folder plus the fixed `data/`, `settings/` and `generated/`
/// sub-folders. Either all four folders exist and are accessible afterwards
/// or the call fails; a retried prepare starts from a cleared base folder.
pub fn prepare(
    point: &dyn AccessPoint,
    record: &TransferRecord,
    ctx: &SecurityContext,
) -> Result<(), StagingError> {
    point.prepare_cache(record, ctx)?;
    let access_url = point.access_url(record, ctx)?;
    let base = point.local_path_for_url(&access_url, ctx)?;
    let folders = [
        base.clone(),
        data_folder(&base),
        settings_folder(&base),
        generated_folder(&base),
    ];
    debug!(transfer = %record.transfer_id(), path = %base.display(), "creating staged folder structure");
    for folder in &folders {
        create_open_folder(folder).map_err(|e| {
            StagingError::Preparation(format!(
                "failed to create staged folder {}: {e}",
                folder.display()
            ))
        })?;
    }
    Ok(())
}

/// Prepare the removal of one staged folder. A missing folder already
/// counts as clean. Returns false when the folder cannot be flagged with
/// the deletion marker after successful permission relaxation.
pub fn prepare_cleanup(
    point: &dyn AccessPoint,
    record: &TransferRecord,
    ctx: &SecurityContext,
) -> bool {
    let access_url = match point.access_url(record, ctx) {
        Ok(url) => url,
        Err(e) => {
            warn!(transfer = %record.transfer_id(), error = %e, "cannot derive access URL for cleanup");
            return false;
        }
    };
    let base = match point.local_path_for_url(&access_url, ctx) {
        Ok(path) => path,
        Err(e) => {
            warn!(transfer = %record.transfer_id(), error = %e, "cannot derive local path for cleanup");
            return false;
        }
    };
    if !base.exists() {
        // nothing on disk, already clean
        return true;
    }
    if !point.prepare_cleanup_internal(record, ctx) {
        return false;
    }
    let marker = deleted_marker(&base);
    match fs::File::create(&marker) {
        Ok(_) => {
            debug!(marker = %marker.display(), "cleanup marker created");
            true
        }
        Err(e) => {
            warn!(marker = %marker.display(), error = %e, "failed to create cleanup marker");
            false
        }
    }
}

/// Create `folder` if necessary and open it for group access. A permission
/// change failure is logged and tolerated, a creation failure is not.
fn create_open_folder(folder: &Path) -> io::Result<()> {
    if folder.exists() {
        if !folder.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} exists but is no directory", folder.display()),
            ));
        }
    } else {
        fs::create_dir(folder)?;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(folder, fs::Permissions::from_mode(0o2770)) {
            warn!(path = %folder.display(), error = %e, "failed to open folder permissions");
        }
    }
    Ok(())
}

/// Delete the direct children of `folder`, keeping the folder itself.
pub(crate) fn wipe_children(folder: &Path) -> io::Result<()> {
    for entry in fs::read_dir(folder)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

pub fn data_folder_url(base_url: &str) -> String {
    urls::append(base_url, &format!("{DATA_FOLDER_NAME}/"))
}

pub fn settings_folder_url(base_url: &str) -> String {
    urls::append(base_url, &format!("{SETTINGS_FOLDER_NAME}/"))
}

pub fn generated_folder_url(base_url: &str) -> String {
    urls::append(base_url, &format!("{GENERATED_FOLDER_NAME}/"))
}

pub fn data_folder(base: &Path) -> PathBuf {
    base.join(DATA_FOLDER_NAME)
}

pub fn settings_folder(base: &Path) -> PathBuf {
    base.join(SETTINGS_FOLDER_NAME)
}

pub fn generated_folder(base: &Path) -> PathBuf {
    base.join(GENERATED_FOLDER_NAME)
}

pub fn deleted_marker(base: &Path) -> PathBuf {
    base.join(DELETED_MARKER_NAME)
}
