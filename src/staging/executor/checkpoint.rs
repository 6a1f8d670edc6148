//! Task Checkpointing
//!
//! A container of transfer tasks can snapshot itself to
//! `<tempDir>/<transferId>/checkpoint.json` and be rebuilt from that file
//! after a crash. Source and target locators are stored percent-encoded so
//! arbitrary characters survive the round trip; a restored source that no
//! longer exists locally is a checkpoint-integrity error, never silently
//! ignored. A missing file simply means "start fresh".

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Mover, TaskStatus, TransferTask};
use crate::staging::error::StagingError;
use crate::staging::urls;

pub const CHECKPOINT_FILE_NAME: &str = "checkpoint.json";

/// Everything except unreserved URL characters gets encoded.
const LOCATOR_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'-')
    .remove(b'_')
    .remove(b'~');

fn encode_locator(locator: &str) -> String {
    utf8_percent_encode(locator, LOCATOR_ENCODE_SET).to_string()
}

fn decode_locator(encoded: &str) -> Result<String, StagingError> {
    percent_decode_str(encoded)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| StagingError::Checkpoint(format!("locator '{encoded}' is not decodable: {e}")))
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// One persisted task entry, locators percent-encoded.
#[derive(Debug, Serialize, Deserialize)]
struct CheckpointEntry {
    source: String,
    target: String,
    #[serde(default, skip_serializing_if = "is_false")]
    cleanup: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointDocument {
    tasks: Vec<CheckpointEntry>,
}

/// Decoded form of a checkpoint entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub source: String,
    pub target: String,
    pub cleanup: bool,
}

impl From<&TransferTask> for TaskSpec {
    fn from(task: &TransferTask) -> Self {
        Self {
            source: task.source().to_string(),
            target: task.target().to_string(),
            cleanup: task.should_cleanup(),
        }
    }
}

pub fn checkpoint_path(temp_dir: &Path, transfer_id: &str) -> PathBuf {
    temp_dir.join(transfer_id).join(CHECKPOINT_FILE_NAME)
}

/// Serialize the ordered task list of one transfer.
pub fn write_checkpoint(
    temp_dir: &Path,
    transfer_id: &str,
    tasks: &[TransferTask],
) -> Result<PathBuf, StagingError> {
    let document = CheckpointDocument {
        tasks: tasks
            .iter()
            .map(|task| CheckpointEntry {
                source: encode_locator(task.source()),
                target: encode_locator(task.target()),
                cleanup: task.should_cleanup(),
            })
            .collect(),
    };
    let path = checkpoint_path(temp_dir, transfer_id);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&document)
        .map_err(|e| StagingError::Checkpoint(format!("failed to serialize checkpoint: {e}")))?;
    fs::write(&path, json)?;
    debug!(path = %path.display(), tasks = tasks.len(), "checkpoint written");
    Ok(path)
}

/// Read a transfer's checkpoint, `None` when there is none. Entries are
/// validated: an undecodable document or a vanished local source makes the
/// whole checkpoint untrustworthy.
pub fn read_checkpoint(
    temp_dir: &Path,
    transfer_id: &str,
) -> Result<Option<Vec<TaskSpec>>, StagingError> {
    let path = checkpoint_path(temp_dir, transfer_id);
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&path)?;
    let document: CheckpointDocument = serde_json::from_str(&raw).map_err(|e| {
        StagingError::Checkpoint(format!("checkpoint {} is not parseable: {e}", path.display()))
    })?;

    let mut specs = Vec::with_capacity(document.tasks.len());
    for entry in document.tasks {
        let spec = TaskSpec {
            source: decode_locator(&entry.source)?,
            target: decode_locator(&entry.target)?,
            cleanup: entry.cleanup,
        };
        if let Some(local_source) = urls::path_from_locator(&spec.source)
            && !local_source.exists()
        {
            return Err(StagingError::Checkpoint(format!(
                "source '{}' of checkpointed task does not exist anymore",
                spec.source
            )));
        }
        specs.push(spec);
    }
    Ok(Some(specs))
}

/// Owns the tasks of one transfer and their checkpoint lifecycle.
pub struct TaskContainer {
    transfer_id: String,
    temp_dir: PathBuf,
    tasks: Vec<TransferTask>,
    restored: bool,
}

impl TaskContainer {
    pub fn new(transfer_id: impl Into<String>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            transfer_id: transfer_id.into(),
            temp_dir: temp_dir.into(),
            tasks: Vec::new(),
            restored: false,
        }
    }

    /// Rebuild the container from an existing checkpoint instead of
    /// re-deriving the task list, enabling resume after a crash.
    pub fn restore_or_new(
        transfer_id: impl Into<String>,
        temp_dir: impl Into<PathBuf>,
    ) -> Result<Self, StagingError> {
        let mut container = Self::new(transfer_id, temp_dir);
        if let Some(specs) = read_checkpoint(&container.temp_dir, &container.transfer_id)? {
            info!(transfer = %container.transfer_id, tasks = specs.len(), "resuming from checkpoint");
            container.tasks = specs
                .into_iter()
                .map(|spec| TransferTask::with_cleanup(spec.source, spec.target, spec.cleanup))
                .collect();
            container.restored = true;
        }
        Ok(container)
    }

    pub fn transfer_id(&self) -> &str {
        &self.transfer_id
    }

    pub fn was_restored(&self) -> bool {
        self.restored
    }

    pub fn add_task(&mut self, task: TransferTask) {
        self.tasks.push(task);
    }

    pub fn tasks(&self) -> &[TransferTask] {
        &self.tasks
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        checkpoint_path(&self.temp_dir, &self.transfer_id)
    }

    pub fn write_checkpoint(&self) -> Result<PathBuf, StagingError> {
        write_checkpoint(&self.temp_dir, &self.transfer_id, &self.tasks)
    }

    /// Drop the checkpoint file; missing files are fine.
    pub fn clear_checkpoint(&self) {
        let path = self.checkpoint_path();
        if let Err(e) = fs::remove_file(&path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            debug!(path = %path.display(), error = %e, "failed to remove checkpoint file");
        }
    }

    /// Snapshot the pending tasks, run every task on its own unit of
    /// execution and join them. The checkpoint survives unless every task
    /// succeeded.
    pub async fn run_all(mut self, mover: Arc<dyn Mover>) -> Result<Vec<TransferTask>, StagingError> {
        self.write_checkpoint()?;
        let handles: Vec<_> = self
            .tasks
            .drain(..)
            .map(|task| tokio::spawn(task.run(mover.clone())))
            .collect();

        let mut finished = Vec::with_capacity(handles.len());
        for joined in join_all(handles).await {
            let task = joined
                .map_err(|e| StagingError::Checkpoint(format!("transfer task panicked: {e}")))?;
            finished.push(task);
        }

        if finished.iter().all(|t| t.status() == TaskStatus::Succeeded) {
            self.clear_checkpoint();
        }
        Ok(finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::executor::LocalMover;
    use tempfile::TempDir;

    #[test]
    fn checkpoint_roundtrip_preserves_order_and_flags() {
        let temp = TempDir::new().unwrap();
        let tasks = vec![
            TransferTask::with_cleanup("http://h/dav/a b/1", "http://h/store/1", true),
            TransferTask::new("http://h/dav/ü/2?x=1&y=2", "http://h/store/2"),
            TransferTask::with_cleanup("http://h/dav/c/3", "http://h/store/3", false),
        ];

        write_checkpoint(temp.path(), "42", &tasks).unwrap();
        let specs = read_checkpoint(temp.path(), "42").unwrap().unwrap();

        assert_eq!(specs.len(), 3);
        assert_eq!(specs[0].source, "http://h/dav/a b/1");
        assert_eq!(specs[0].target, "http://h/store/1");
        assert!(specs[0].cleanup);
        assert_eq!(specs[1].source, "http://h/dav/ü/2?x=1&y=2");
        assert!(!specs[1].cleanup);
        assert_eq!(specs[2].source, "http://h/dav/c/3");
        assert!(!specs[2].cleanup);
    }

    #[test]
    fn locators_are_stored_encoded() {
        let temp = TempDir::new().unwrap();
        let tasks = vec![TransferTask::new("http://h/dav/a b/1", "http://h/store/1")];
        let path = write_checkpoint(temp.path(), "42", &tasks).unwrap();
        let raw = std::fs::read_to_string(path).unwrap();
        assert!(!raw.contains("a b"));
        assert!(raw.contains("a%20b"));
    }

    #[test]
    fn missing_checkpoint_means_start_fresh() {
        let temp = TempDir::new().unwrap();
        assert!(read_checkpoint(temp.path(), "42").unwrap().is_none());

        let container = TaskContainer::restore_or_new("42", temp.path()).unwrap();
        assert!(!container.was_restored());
        assert!(container.is_empty());
    }

    #[test]
    fn vanished_local_source_is_an_integrity_error() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("payload.bin");
        std::fs::write(&source, b"data").unwrap();

        let tasks = vec![TransferTask::new(
            urls::file_url(&source),
            urls::file_url(&temp.path().join("target.bin")),
        )];
        write_checkpoint(temp.path(), "42", &tasks).unwrap();

        // readable while the source is in place
        assert!(read_checkpoint(temp.path(), "42").unwrap().is_some());

        std::fs::remove_file(&source).unwrap();
        assert!(matches!(
            read_checkpoint(temp.path(), "42"),
            Err(StagingError::Checkpoint(_))
        ));
    }

    #[test]
    fn garbage_checkpoint_is_an_integrity_error() {
        let temp = TempDir::new().unwrap();
        let path = checkpoint_path(temp.path(), "42");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(
            read_checkpoint(temp.path(), "42"),
            Err(StagingError::Checkpoint(_))
        ));
    }

    #[tokio::test]
    async fn container_restores_and_runs_tasks() {
        let temp = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let source = work.path().join("a.bin");
        std::fs::write(&source, b"payload").unwrap();
        let target = work.path().join("out/a.bin");

        let mut container = TaskContainer::new("42", temp.path());
        container.add_task(TransferTask::new(
            urls::file_url(&source),
            urls::file_url(&target),
        ));
        container.write_checkpoint().unwrap();

        // crash happened here; a new container resumes from the file
        let restored = TaskContainer::restore_or_new("42", temp.path()).unwrap();
        assert!(restored.was_restored());
        assert_eq!(restored.tasks().len(), 1);

        let finished = restored.run_all(Arc::new(LocalMover)).await.unwrap();
        assert_eq!(finished[0].status(), TaskStatus::Succeeded);
        assert_eq!(std::fs::read(&target).unwrap(), b"payload");
        // full success clears the checkpoint
        assert!(!checkpoint_path(temp.path(), "42").exists());
    }
}
