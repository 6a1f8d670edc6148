//! Cleanup Registry
//!
//! Process-wide registry of files to delete per transfer id, e.g. staged
//! temporary artifacts a client leaves behind. Constructed once by the
//! process entry point and passed by reference; registrations are rare
//! compared to copy throughput, so one lock over the whole map is enough.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

#[derive(Default)]
pub struct CleanupManager {
    files: Mutex<HashMap<String, Vec<PathBuf>>>,
}

impl CleanupManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a path for deletion when `transfer_id` is cleaned up.
    /// Duplicate registrations are ignored.
    pub fn add_file(&self, transfer_id: &str, path: impl Into<PathBuf>) {
        let path = path.into();
        debug!(transfer = %transfer_id, path = %path.display(), "registering file for cleanup");
        let mut files = self.files.lock().unwrap();
        let entry = files.entry(transfer_id.to_string()).or_default();
        if !entry.contains(&path) {
            entry.push(path);
        }
    }

    /// Take a path out of the registry again.
    pub fn remove_file(&self, transfer_id: &str, path: &Path) {
        let mut files = self.files.lock().unwrap();
        if let Some(entry) = files.get_mut(transfer_id) {
            entry.retain(|p| p != path);
        }
    }

    /// Paths currently registered for one transfer.
    pub fn registered(&self, transfer_id: &str) -> Vec<PathBuf> {
        self.files
            .lock()
            .unwrap()
            .get(transfer_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Delete everything registered for `transfer_id` (directories
    /// recursively) and forget the id. Missing paths are logged and
    /// skipped, deletion failures never escalate.
    pub fn perform_cleanup(&self, transfer_id: &str) {
        let paths = {
            let mut files = self.files.lock().unwrap();
            files.remove(transfer_id).unwrap_or_default()
        };
        if paths.is_empty() {
            debug!(transfer = %transfer_id, "no cleanup necessary");
            return;
        }
        debug!(transfer = %transfer_id, count = paths.len(), "cleaning up registered files");
        for path in paths {
            if !path.exists() {
                debug!(path = %path.display(), "registered file does not exist, skipping");
                continue;
            }
            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            if let Err(e) = result {
                warn!(path = %path.display(), error = %e, "failed to clean up registered file");
            }
        }
    }
}
