//! Access Point Registry
//!
//! Builds the configured access points at startup, runs their setup and
//! hands out shared references afterwards. Constructed once by the process
//! entry point and passed explicitly to everything that needs it.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use super::access_point::{
    self, AccessPoint, AccessPointConfig, AccessPointKind, DirectAccessPoint, MaskedAccessPoint,
};
use super::error::StagingError;

pub struct AccessPointRegistry {
    points: HashMap<String, Arc<dyn AccessPoint>>,
    default_id: Option<String>,
}

impl AccessPointRegistry {
    /// Instantiate and set up every configured point. With `check_only` the
    /// filesystem is left untouched (pre-flight validation runs only).
    pub fn from_configs(
        configs: &[AccessPointConfig],
        check_only: bool,
    ) -> Result<Self, StagingError> {
        let mut points: HashMap<String, Arc<dyn AccessPoint>> = HashMap::new();
        let mut default_id = None;

        for config in configs {
            if points.contains_key(&config.id) {
                return Err(StagingError::Configuration(format!(
                    "duplicate access point id '{}'",
                    config.id
                )));
            }
            let point: Arc<dyn AccessPoint> = match config.kind {
                AccessPointKind::Direct => Arc::new(DirectAccessPoint::new(config.clone())),
                AccessPointKind::Masked => Arc::new(MaskedAccessPoint::new(config.clone())),
            };
            access_point::setup(point.as_ref(), check_only)?;
            info!(access_point = %config.id, kind = ?config.kind, disabled = config.disabled, "access point ready");
            if config.is_default && default_id.is_none() {
                default_id = Some(config.id.clone());
            }
            points.insert(config.id.clone(), point);
        }

        Ok(Self { points, default_id })
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn AccessPoint>> {
        self.points.get(id).cloned()
    }

    /// Resolve an optional id, falling back to the configured default point.
    pub fn resolve(&self, id: Option<&str>) -> Result<Arc<dyn AccessPoint>, StagingError> {
        let id = match id {
            Some(id) => id,
            None => self.default_id.as_deref().ok_or_else(|| {
                StagingError::Preparation("no access point id given and no default configured".into())
            })?,
        };
        self.get(id)
            .ok_or_else(|| StagingError::Preparation(format!("no access point found for id '{id}'")))
    }

    pub fn is_disabled(&self, id: &str) -> bool {
        self.points
            .get(id)
            .map(|p| p.config().disabled)
            .unwrap_or(false)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.points.keys().map(String::as_str).collect()
    }
}
