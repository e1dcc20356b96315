//! Incremental index updater
//!
//! A single consumer thread drains the watcher channel, coalesces events in
//! an [`EventDebouncer`] and folds each flushed [`ChangeBatch`] into the
//! index as one new snapshot version.

use crate::index::build::{read_indexable, walk_files, PathFilter};
use crate::index::{SnapshotBuilder, SnapshotManager, UpdateOutcome};
use crate::patch::PathLocks;
use crate::server::debouncer::EventDebouncer;
use crate::server::watcher::{ChangeBatch, FileChange};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Longest the consumer sleeps before rechecking shutdown
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Everything needed to fold a batch into the index
#[derive(Clone)]
pub struct IndexUpdater {
    root: PathBuf,
    manager: Arc<SnapshotManager>,
    locks: Arc<PathLocks>,
    filter: PathFilter,
    max_file_size: u64,
}

impl IndexUpdater {
    pub fn new(
        root: impl Into<PathBuf>,
        manager: Arc<SnapshotManager>,
        locks: Arc<PathLocks>,
        filter: PathFilter,
        max_file_size: u64,
    ) -> Self {
        Self {
            root: root.into(),
            manager,
            locks,
            filter,
            max_file_size,
        }
    }

    /// Apply one batch as a single snapshot version.
    ///
    /// A path that cannot be read is treated as absent.
    pub fn apply_batch(&self, batch: &ChangeBatch) -> UpdateOutcome {
        let start = Instant::now();
        let outcome = self.manager.update(|builder| {
            for path in &batch.deleted {
                if !builder.remove_path(path) {
                    // Might have been a directory
                    let removed = builder.remove_dir(path);
                    if removed > 0 {
                        debug!(dir = %path, removed, "directory removed");
                    }
                }
            }
            for path in batch.created.iter().chain(&batch.modified) {
                self.refresh(builder, path);
            }
        });

        if outcome.published {
            info!(
                version = outcome.version,
                changes = outcome.changes,
                created = batch.created.len(),
                modified = batch.modified.len(),
                deleted = batch.deleted.len(),
                duration_ms = start.elapsed().as_millis() as u64,
                "published snapshot"
            );
        } else {
            debug!(paths = batch.total_changes(), "batch left index unchanged");
        }
        outcome
    }

    /// Re-read one path into the builder
    fn refresh(&self, builder: &mut SnapshotBuilder, rel: &str) {
        let abs = self.root.join(rel);
        if abs.is_dir() {
            let files = walk_files(&self.root, &abs, &self.filter);
            debug!(dir = %rel, files = files.len(), "indexing directory");
            for (path, file_rel) in files {
                self.index_one(builder, &path, &file_rel);
            }
            return;
        }
        if self.filter.is_ignored(Path::new(rel), false) {
            return;
        }
        self.index_one(builder, &abs, rel);
    }

    fn index_one(&self, builder: &mut SnapshotBuilder, abs: &Path, rel: &str) {
        let content = self
            .locks
            .with_lock(rel, || read_indexable(abs, self.max_file_size));
        match content {
            Some(content) => {
                builder.index_file(rel, content);
            }
            None => {
                if builder.remove_path(rel) {
                    debug!(path = %rel, "dropped unreadable file");
                }
            }
        }
    }

    /// Run the consumer loop on its own thread
    pub fn spawn(self, rx: Receiver<FileChange>, debounce: Duration) -> Result<UpdaterHandle> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);

        let thread = thread::Builder::new()
            .name("trigrep-updater".to_string())
            .spawn(move || self.run(rx, debounce, &flag))
            .context("Failed to spawn updater thread")?;

        Ok(UpdaterHandle {
            shutdown,
            thread: Some(thread),
        })
    }

    fn run(&self, rx: Receiver<FileChange>, debounce: Duration, shutdown: &AtomicBool) {
        let mut debouncer = EventDebouncer::new(debounce);

        while !shutdown.load(Ordering::SeqCst) {
            let wait = debouncer
                .time_until_ready()
                .map_or(POLL_INTERVAL, |left| left.min(POLL_INTERVAL));

            match rx.recv_timeout(wait) {
                Ok(change) => {
                    debouncer.add_event(change);
                    // Drain whatever else is queued without waiting
                    while let Ok(change) = rx.try_recv() {
                        debouncer.add_event(change);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    if let Some(batch) = debouncer.flush() {
                        self.apply_batch(&batch);
                    }
                    break;
                }
            }

            if debouncer.is_ready()
                && let Some(batch) = debouncer.flush()
            {
                self.apply_batch(&batch);
            }
        }

        debug!("updater stopped");
    }
}

/// Handle to the updater thread
pub struct UpdaterHandle {
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl UpdaterHandle {
    /// Signal the thread to stop and wait for it
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for UpdaterHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
