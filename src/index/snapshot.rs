//! Immutable, versioned index snapshots.
//!
//! An [`IndexSnapshot`] is never modified after it is built. Changes go
//! through a [`SnapshotBuilder`], a working copy derived from the current
//! snapshot that shares every untouched file record and posting list.

use crate::index::postings::TrigramPostings;
use crate::index::types::{FileId, FileRecord, Version};
use crate::utils::extract_trigrams;
use ahash::AHashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Immutable view of the full index at one version
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    version: Version,
    /// Path -> record, iterated in path order
    files: BTreeMap<String, Arc<FileRecord>>,
    by_id: AHashMap<FileId, Arc<FileRecord>>,
    postings: TrigramPostings,
    next_id: FileId,
}

impl IndexSnapshot {
    /// Empty snapshot at version 0
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn get(&self, path: &str) -> Option<&Arc<FileRecord>> {
        self.files.get(path)
    }

    pub fn get_by_id(&self, id: FileId) -> Option<&Arc<FileRecord>> {
        self.by_id.get(&id)
    }

    /// All records in file-table order
    pub fn files(&self) -> impl Iterator<Item = &Arc<FileRecord>> {
        self.files.values()
    }

    pub fn postings(&self) -> &TrigramPostings {
        &self.postings
    }

    /// Start a working copy for the next version
    pub fn builder(&self) -> SnapshotBuilder {
        SnapshotBuilder {
            files: self.files.clone(),
            by_id: self.by_id.clone(),
            postings: self.postings.clone(),
            next_id: self.next_id,
            changed: 0,
        }
    }
}

/// Outcome of indexing one path into a builder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    Added(FileId),
    Updated(FileId),
    Unchanged(FileId),
}

impl IndexOutcome {
    pub fn id(&self) -> FileId {
        match *self {
            IndexOutcome::Added(id) | IndexOutcome::Updated(id) | IndexOutcome::Unchanged(id) => id,
        }
    }
}

/// Mutable working copy that becomes the next snapshot
#[derive(Debug)]
pub struct SnapshotBuilder {
    files: BTreeMap<String, Arc<FileRecord>>,
    by_id: AHashMap<FileId, Arc<FileRecord>>,
    postings: TrigramPostings,
    next_id: FileId,
    changed: usize,
}

impl SnapshotBuilder {
    /// Builder with no files, used for the initial full build
    pub fn new() -> Self {
        IndexSnapshot::empty().builder()
    }

    /// Insert or replace the record for `path`.
    ///
    /// A path keeps its id across content changes. Indexing bytes identical
    /// to the current record leaves the builder untouched.
    pub fn index_file(&mut self, path: &str, content: Vec<u8>) -> IndexOutcome {
        let id = match self.files.get(path) {
            Some(existing) if existing.same_content(&content) => {
                return IndexOutcome::Unchanged(existing.id);
            }
            Some(existing) => {
                let existing = Arc::clone(existing);
                self.postings
                    .remove_file(existing.id, &extract_trigrams(&existing.content));
                existing.id
            }
            None => {
                let id = self.next_id;
                self.next_id += 1;
                id
            }
        };

        let is_update = self.by_id.contains_key(&id);
        let record = Arc::new(FileRecord::new(id, path, content));
        self.postings.add_file(id, &extract_trigrams(&record.content));
        self.files.insert(path.to_string(), Arc::clone(&record));
        self.by_id.insert(id, record);
        self.changed += 1;

        if is_update {
            IndexOutcome::Updated(id)
        } else {
            IndexOutcome::Added(id)
        }
    }

    /// Remove a file and every posting pointing at it
    pub fn remove_file(&mut self, id: FileId) -> bool {
        let Some(record) = self.by_id.remove(&id) else {
            return false;
        };
        self.postings.remove_file(id, &extract_trigrams(&record.content));
        self.files.remove(&record.path);
        self.changed += 1;
        true
    }

    pub fn remove_path(&mut self, path: &str) -> bool {
        match self.files.get(path).map(|record| record.id) {
            Some(id) => self.remove_file(id),
            None => false,
        }
    }

    /// Remove every file below directory `dir`; returns how many were dropped
    pub fn remove_dir(&mut self, dir: &str) -> usize {
        let ids: Vec<FileId> = self
            .paths_under(dir)
            .into_iter()
            .filter_map(|path| self.files.get(&path).map(|record| record.id))
            .collect();
        ids.into_iter().filter(|&id| self.remove_file(id)).count()
    }

    /// Indexed paths strictly below directory `dir`
    pub fn paths_under(&self, dir: &str) -> Vec<String> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        self.files
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .map(|(path, _)| path.clone())
            .collect()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Number of record insertions, replacements and removals so far
    pub fn change_count(&self) -> usize {
        self.changed
    }

    pub fn is_dirty(&self) -> bool {
        self.changed > 0
    }

    /// Freeze the working copy as `version`
    pub fn finish(self, version: Version) -> IndexSnapshot {
        IndexSnapshot {
            version,
            files: self.files,
            by_id: self.by_id,
            postings: self.postings,
            next_id: self.next_id,
        }
    }
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}
