//! File system watcher feeding the incremental updater
//!
//! notify events are mapped to project-relative [`FileChange`]s, filtered
//! through the same [`PathFilter`] as the initial walk, and pushed into a
//! bounded channel. The single consumer on the other end coalesces them into
//! [`ChangeBatch`]es.

use crate::index::build::{normalize_rel_path, PathFilter};
use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::SyncSender;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default debounce window in milliseconds
pub const DEFAULT_DEBOUNCE_MS: u64 = 200;

/// Default capacity of the watcher -> updater channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4096;

/// Kind of file change detected
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    /// Moved here from `from`
    Renamed { from: String },
}

/// A single file change event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Project-relative path with `/` separators
    pub path: String,
    pub kind: ChangeKind,
}

impl FileChange {
    pub fn new(path: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Coalesced changes for one debounce window; every path appears once
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    pub created: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl ChangeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn total_changes(&self) -> usize {
        self.created.len() + self.modified.len() + self.deleted.len()
    }

    /// Record a change; a later change to the same path replaces the earlier one
    pub fn add(&mut self, change: FileChange) {
        match change.kind {
            ChangeKind::Renamed { from } => {
                self.add(FileChange::new(from, ChangeKind::Deleted));
                self.add(FileChange::new(change.path, ChangeKind::Created));
            }
            kind => {
                self.forget(&change.path);
                match kind {
                    ChangeKind::Created => self.created.push(change.path),
                    ChangeKind::Modified => self.modified.push(change.path),
                    _ => self.deleted.push(change.path),
                }
            }
        }
    }

    fn forget(&mut self, path: &str) {
        self.created.retain(|p| p != path);
        self.modified.retain(|p| p != path);
        self.deleted.retain(|p| p != path);
    }

    /// Sort each list so batches are processed in a stable order
    pub fn sort(&mut self) {
        self.created.sort();
        self.modified.sort();
        self.deleted.sort();
    }
}

/// Configuration for the file watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    pub enabled: bool,
    /// Debounce window in milliseconds (changes within this window are batched)
    pub debounce_ms: u64,
    pub channel_capacity: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl WatcherConfig {
    pub fn debounce_duration(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Keeps the OS watcher alive; dropping it stops event delivery
pub struct WatcherHandle {
    watcher: Option<RecommendedWatcher>,
    pub root_path: PathBuf,
}

impl WatcherHandle {
    pub fn stop(&mut self) {
        if self.watcher.take().is_some() {
            debug!(root = %self.root_path.display(), "watcher stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Watch `root` recursively, sending filtered changes to `tx`.
///
/// Sends block while the channel is full, so a slow consumer throttles the
/// notify thread instead of dropping events.
pub fn start_watcher(
    root: &Path,
    filter: PathFilter,
    tx: SyncSender<FileChange>,
) -> Result<WatcherHandle> {
    let event_root = root.to_path_buf();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for change in map_event(&event_root, &filter, &event) {
                    debug!(path = %change.path, kind = ?change.kind, "change detected");
                    if tx.send(change).is_err() {
                        return;
                    }
                }
            }
            Err(err) => warn!(error = %err, "watcher error"),
        },
        notify::Config::default(),
    )
    .context("Failed to create file watcher")?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {}", root.display()))?;

    info!(root = %root.display(), "watching for changes");

    Ok(WatcherHandle {
        watcher: Some(watcher),
        root_path: root.to_path_buf(),
    })
}

/// Translate one notify event into project changes
pub fn map_event(root: &Path, filter: &PathFilter, event: &Event) -> Vec<FileChange> {
    let relevant = |path: &Path| -> Option<String> {
        let rel = normalize_rel_path(root, path)?;
        let is_dir = path.is_dir();
        if filter.is_ignored(Path::new(&rel), is_dir) {
            None
        } else {
            Some(rel)
        }
    };

    let mut changes = Vec::new();
    match &event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
            let from = relevant(&event.paths[0]);
            let to = relevant(&event.paths[1]);
            match (from, to) {
                (Some(from), Some(to)) => {
                    changes.push(FileChange::new(to, ChangeKind::Renamed { from }));
                }
                (Some(from), None) => changes.push(FileChange::new(from, ChangeKind::Deleted)),
                (None, Some(to)) => changes.push(FileChange::new(to, ChangeKind::Created)),
                (None, None) => {}
            }
        }
        EventKind::Modify(ModifyKind::Name(mode)) => {
            for path in &event.paths {
                let Some(rel) = relevant(path) else { continue };
                let kind = match mode {
                    RenameMode::From => ChangeKind::Deleted,
                    RenameMode::To => ChangeKind::Created,
                    _ if path.exists() => ChangeKind::Created,
                    _ => ChangeKind::Deleted,
                };
                changes.push(FileChange::new(rel, kind));
            }
        }
        kind => {
            let change_kind = match kind {
                EventKind::Create(_) => ChangeKind::Created,
                EventKind::Modify(_) | EventKind::Any => ChangeKind::Modified,
                EventKind::Remove(_) => ChangeKind::Deleted,
                EventKind::Access(_) | EventKind::Other => return changes,
            };
            for path in &event.paths {
                // Directory metadata changes carry no content
                if change_kind == ChangeKind::Modified && path.is_dir() {
                    continue;
                }
                if let Some(rel) = relevant(path) {
                    changes.push(FileChange::new(rel, change_kind.clone()));
                }
            }
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::IndexConfig;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use tempfile::TempDir;

    fn filter(root: &Path) -> PathFilter {
        PathFilter::new(root, &IndexConfig::default()).unwrap()
    }

    #[test]
    fn test_change_batch_last_change_wins() {
        let mut batch = ChangeBatch::new();
        batch.add(FileChange::new("test.rs", ChangeKind::Created));
        batch.add(FileChange::new("test.rs", ChangeKind::Deleted));
        assert!(batch.created.is_empty());
        assert_eq!(batch.deleted, vec!["test.rs".to_string()]);
        assert_eq!(batch.total_changes(), 1);
    }

    #[test]
    fn test_change_batch_rename_splits() {
        let mut batch = ChangeBatch::new();
        batch.add(FileChange::new(
            "new.rs",
            ChangeKind::Renamed {
                from: "old.rs".to_string(),
            },
        ));
        assert_eq!(batch.deleted, vec!["old.rs".to_string()]);
        assert_eq!(batch.created, vec!["new.rs".to_string()]);
    }

    #[test]
    fn test_change_batch_multiple_modifications() {
        let mut batch = ChangeBatch::new();
        for _ in 0..3 {
            batch.add(FileChange::new("file.rs", ChangeKind::Modified));
        }
        assert_eq!(batch.modified.len(), 1);
        assert!(!batch.is_empty());
    }

    #[test]
    fn test_watcher_config_default() {
        let config = WatcherConfig::default();
        assert!(config.enabled);
        assert_eq!(config.debounce_duration(), Duration::from_millis(DEFAULT_DEBOUNCE_MS));
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_map_event_create_and_remove() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::write(root.join("a.txt"), "a").unwrap();

        let create = Event::new(EventKind::Create(CreateKind::File)).add_path(root.join("a.txt"));
        assert_eq!(
            map_event(root, &filter(root), &create),
            vec![FileChange::new("a.txt", ChangeKind::Created)]
        );

        let remove = Event::new(EventKind::Remove(RemoveKind::File)).add_path(root.join("gone.txt"));
        assert_eq!(
            map_event(root, &filter(root), &remove),
            vec![FileChange::new("gone.txt", ChangeKind::Deleted)]
        );
    }

    #[test]
    fn test_map_event_skips_ignored_paths() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let event = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(root.join("node_modules/pkg/index.js"))
            .add_path(root.join(".git/index"))
            .add_path(PathBuf::from("/somewhere/else.txt"));
        assert!(map_event(root, &filter(root), &event).is_empty());
    }

    #[test]
    fn test_map_event_rename_both() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(root.join("old.rs"))
            .add_path(root.join("new.rs"));
        assert_eq!(
            map_event(root, &filter(root), &event),
            vec![FileChange::new(
                "new.rs",
                ChangeKind::Renamed {
                    from: "old.rs".to_string()
                }
            )]
        );

        // Editors saving through a hidden temp file
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(root.join(".app.js.swp"))
            .add_path(root.join("app.js"));
        assert_eq!(
            map_event(root, &filter(root), &event),
            vec![FileChange::new("app.js", ChangeKind::Created)]
        );
    }

    #[test]
    fn test_map_event_ignores_access() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let event = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(root.join("a.txt"));
        assert!(map_event(root, &filter(root), &event).is_empty());
    }
}
