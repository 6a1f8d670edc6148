//! Transfer Executor
//!
//! Client-side mover driver. A [`TransferTask`] moves one source to one
//! target through a pluggable [`Mover`], retrying transient failures a
//! fixed number of times and notifying listeners about its lifecycle. The
//! wire protocol of the actual byte movement is entirely the mover's
//! business.

pub mod checkpoint;

pub use checkpoint::{TaskContainer, TaskSpec};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info, warn};

use super::urls;

/// Max attempts for one task before it fails permanently.
pub const MAX_TRIES: u32 = 3;
/// Fixed delay between two attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum MoverError {
    /// Worth another attempt (network hiccup, busy target, ...).
    #[error("transient transfer failure: {0}")]
    Transient(String),

    /// Retrying cannot help (missing or unreadable source, ...).
    #[error("fatal transfer failure: {0}")]
    Fatal(String),
}

impl MoverError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, MoverError::Transient(_))
    }
}

/// The pluggable byte mover. Timeout handling is the mover's
/// responsibility, not the executor's.
#[async_trait]
pub trait Mover: Send + Sync {
    async fn transfer(&self, source: &str, target: &str) -> Result<(), MoverError>;

    /// Remove the source after a successful transfer.
    async fn remove_source(&self, source: &str) -> Result<(), MoverError>;
}

/// Mover for locators both sides of which resolve to the local filesystem
/// (`file:` URLs or plain paths).
pub struct LocalMover;

impl LocalMover {
    fn local_path(locator: &str) -> Result<std::path::PathBuf, MoverError> {
        urls::path_from_locator(locator)
            .ok_or_else(|| MoverError::Fatal(format!("locator '{locator}' is not local")))
    }
}

#[async_trait]
impl Mover for LocalMover {
    async fn transfer(&self, source: &str, target: &str) -> Result<(), MoverError> {
        let source = Self::local_path(source)?;
        let target = Self::local_path(target)?;
        if !source.exists() {
            return Err(MoverError::Fatal(format!(
                "source '{}' does not exist",
                source.display()
            )));
        }
        tokio::task::spawn_blocking(move || copy_tree(&source, &target))
            .await
            .map_err(|e| MoverError::Transient(format!("copy task aborted: {e}")))?
            .map_err(|e| MoverError::Transient(e.to_string()))
    }

    async fn remove_source(&self, source: &str) -> Result<(), MoverError> {
        let source = Self::local_path(source)?;
        tokio::task::spawn_blocking(move || {
            if source.is_dir() {
                std::fs::remove_dir_all(&source)
            } else {
                std::fs::remove_file(&source)
            }
        })
        .await
        .map_err(|e| MoverError::Transient(format!("cleanup task aborted: {e}")))?
        .map_err(|e| MoverError::Transient(e.to_string()))
    }
}

fn copy_tree(source: &Path, target: &Path) -> std::io::Result<()> {
    if source.is_dir() {
        std::fs::create_dir_all(target)?;
        for entry in std::fs::read_dir(source)? {
            let entry = entry?;
            copy_tree(&entry.path(), &target.join(entry.file_name()))?;
        }
    } else {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(source, target)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Waiting,
    Running,
    Succeeded,
    Failed,
}

/// Lifecycle notifications of one task. Fired from the task's own unit of
/// execution.
pub trait TransferTaskListener: Send + Sync {
    fn on_started(&self, _task: &TransferTask) {}
    fn on_finished(&self, _task: &TransferTask) {}
    fn on_failed(&self, _task: &TransferTask) {}
}

/// One source-to-target movement. One-shot:
/// `Waiting → Running → {Succeeded, Failed}`.
pub struct TransferTask {
    source: String,
    target: String,
    cleanup: bool,
    status: TaskStatus,
    listeners: Vec<Arc<dyn TransferTaskListener>>,
}

impl TransferTask {
    /// Task without source cleanup, the default for original files.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self::with_cleanup(source, target, false)
    }

    pub fn with_cleanup(
        source: impl Into<String>,
        target: impl Into<String>,
        cleanup: bool,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            cleanup,
            status: TaskStatus::Waiting,
            listeners: Vec::new(),
        }
    }

    pub fn add_listener(&mut self, listener: Arc<dyn TransferTaskListener>) {
        self.listeners.push(listener);
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn should_cleanup(&self) -> bool {
        self.cleanup
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Run the task to completion on the current unit of execution.
    /// Transient mover failures are retried up to [`MAX_TRIES`] with
    /// [`RETRY_DELAY`] in between; a fatal failure aborts immediately.
    /// Source cleanup runs only on success and its failure never flips the
    /// task back to failed.
    pub async fn run(mut self, mover: Arc<dyn Mover>) -> TransferTask {
        self.status = TaskStatus::Running;
        for listener in &self.listeners {
            listener.on_started(&self);
        }

        let mut succeeded = false;
        for attempt in 1..=MAX_TRIES {
            if attempt > 1 {
                info!(source = %self.source, attempt, "retrying transfer");
            }
            match mover.transfer(&self.source, &self.target).await {
                Ok(()) => {
                    succeeded = true;
                    break;
                }
                Err(e) if e.is_retryable() => {
                    error!(source = %self.source, target = %self.target, attempt, error = %e, "transfer attempt failed");
                    if attempt < MAX_TRIES {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
                Err(e) => {
                    error!(source = %self.source, target = %self.target, error = %e, "transfer failed fatally, not retrying");
                    break;
                }
            }
        }

        if succeeded {
            if self.cleanup {
                if let Err(e) = mover.remove_source(&self.source).await {
                    // the transfer itself succeeded, only report for follow-up
                    warn!(source = %self.source, error = %e, "source cleanup failed, manual cleanup necessary");
                }
            }
            self.status = TaskStatus::Succeeded;
            for listener in &self.listeners {
                listener.on_finished(&self);
            }
        } else {
            error!(source = %self.source, tries = MAX_TRIES, "transfer failed permanently");
            self.status = TaskStatus::Failed;
            for listener in &self.listeners {
                listener.on_failed(&self);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    enum Behavior {
        AlwaysTransient,
        AlwaysFatal,
        SucceedOnThird,
        Succeed,
    }

    struct ScriptedMover {
        behavior: Behavior,
        attempts: AtomicUsize,
        cleanups: AtomicUsize,
        fail_cleanup: bool,
    }

    impl ScriptedMover {
        fn new(behavior: Behavior) -> Self {
            Self {
                behavior,
                attempts: AtomicUsize::new(0),
                cleanups: AtomicUsize::new(0),
                fail_cleanup: false,
            }
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Mover for ScriptedMover {
        async fn transfer(&self, _source: &str, _target: &str) -> Result<(), MoverError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            match self.behavior {
                Behavior::AlwaysTransient => Err(MoverError::Transient("flaky".into())),
                Behavior::AlwaysFatal => Err(MoverError::Fatal("unreadable".into())),
                Behavior::SucceedOnThird if attempt < 3 => {
                    Err(MoverError::Transient("flaky".into()))
                }
                _ => Ok(()),
            }
        }

        async fn remove_source(&self, _source: &str) -> Result<(), MoverError> {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            if self.fail_cleanup {
                Err(MoverError::Transient("source busy".into()))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct CountingListener {
        started: AtomicUsize,
        finished: AtomicUsize,
        failed: AtomicUsize,
    }

    impl TransferTaskListener for CountingListener {
        fn on_started(&self, _task: &TransferTask) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        fn on_finished(&self, _task: &TransferTask) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
        fn on_failed(&self, _task: &TransferTask) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_use_all_tries() {
        let mover = Arc::new(ScriptedMover::new(Behavior::AlwaysTransient));
        let task = TransferTask::new("file:///src/a", "file:///dst/a");
        let task = task.run(mover.clone()).await;
        assert_eq!(task.status(), TaskStatus::Failed);
        assert_eq!(mover.attempts(), 3);
        assert_eq!(mover.cleanups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_failure_aborts_after_one_try() {
        let mover = Arc::new(ScriptedMover::new(Behavior::AlwaysFatal));
        let task = TransferTask::new("file:///src/a", "file:///dst/a");
        let task = task.run(mover.clone()).await;
        assert_eq!(task.status(), TaskStatus::Failed);
        assert_eq!(mover.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_retries() {
        let mover = Arc::new(ScriptedMover::new(Behavior::SucceedOnThird));
        let listener = Arc::new(CountingListener::default());
        let mut task = TransferTask::with_cleanup("file:///src/a", "file:///dst/a", true);
        task.add_listener(listener.clone());

        let task = task.run(mover.clone()).await;
        assert_eq!(task.status(), TaskStatus::Succeeded);
        assert_eq!(mover.attempts(), 3);
        assert_eq!(mover.cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(listener.started.load(Ordering::SeqCst), 1);
        assert_eq!(listener.finished.load(Ordering::SeqCst), 1);
        assert_eq!(listener.failed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_failure_does_not_fail_the_task() {
        let mut mover = ScriptedMover::new(Behavior::Succeed);
        mover.fail_cleanup = true;
        let mover = Arc::new(mover);
        let task = TransferTask::with_cleanup("file:///src/a", "file:///dst/a", true);
        let task = task.run(mover.clone()).await;
        assert_eq!(task.status(), TaskStatus::Succeeded);
        assert_eq!(mover.cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_cleanup_without_the_flag() {
        let mover = Arc::new(ScriptedMover::new(Behavior::Succeed));
        let task = TransferTask::new("file:///src/a", "file:///dst/a");
        let task = task.run(mover.clone()).await;
        assert_eq!(task.status(), TaskStatus::Succeeded);
        assert_eq!(mover.cleanups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn local_mover_copies_and_cleans() {
        let temp = TempDir::new().unwrap();
        let source_dir = temp.path().join("src");
        std::fs::create_dir_all(source_dir.join("nested")).unwrap();
        std::fs::write(source_dir.join("a.bin"), b"payload").unwrap();
        std::fs::write(source_dir.join("nested/b.bin"), b"more").unwrap();
        let target_dir = temp.path().join("dst");

        let mover = LocalMover;
        mover
            .transfer(
                &urls::file_url(&source_dir),
                &urls::file_url(&target_dir),
            )
            .await
            .unwrap();
        assert_eq!(std::fs::read(target_dir.join("a.bin")).unwrap(), b"payload");
        assert_eq!(std::fs::read(target_dir.join("nested/b.bin")).unwrap(), b"more");

        mover
            .remove_source(&urls::file_url(&source_dir))
            .await
            .unwrap();
        assert!(!source_dir.exists());
    }

    #[tokio::test]
    async fn local_mover_missing_source_is_fatal() {
        let temp = TempDir::new().unwrap();
        let mover = LocalMover;
        let result = mover
            .transfer(
                &urls::file_url(&temp.path().join("missing")),
                &urls::file_url(&temp.path().join("dst")),
            )
            .await;
        assert!(matches!(result, Err(MoverError::Fatal(_))));
    }

    #[tokio::test]
    async fn local_mover_rejects_remote_locators() {
        let mover = LocalMover;
        let result = mover.transfer("http://remote/a", "/tmp/x").await;
        assert!(matches!(result, Err(MoverError::Fatal(_))));
    }
}
