use crate::index::snapshot::SnapshotBuilder;
use crate::index::types::IndexConfig;
use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::WalkBuilder;
use rayon::prelude::*;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Counters from one full build
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildStats {
    pub files_indexed: usize,
    pub skipped_large: usize,
    pub unreadable: usize,
    pub duration_ms: u128,
}

/// Decides which project paths are indexed.
///
/// Shared by the full walk and the watcher so both agree on what belongs in
/// the index.
#[derive(Debug, Clone)]
pub struct PathFilter {
    ignored_dirs: Vec<String>,
    globs: GlobSet,
    gitignore: Option<Gitignore>,
    global_gitignore: Option<Gitignore>,
}

impl PathFilter {
    pub fn new(root: &Path, config: &IndexConfig) -> Result<Self> {
        let mut globs = GlobSetBuilder::new();
        for pattern in &config.ignored_globs {
            let glob = Glob::new(pattern)
                .with_context(|| format!("Invalid exclude pattern: {pattern}"))?;
            globs.add(glob);
        }

        let (gitignore, global_gitignore) = if config.follow_gitignore {
            let mut builder = GitignoreBuilder::new(root);
            // Missing files are fine; add() only reports parse problems
            builder.add(root.join(".gitignore"));
            builder.add(root.join(".git").join("info").join("exclude"));
            let (global, err) = Gitignore::global();
            if let Some(err) = err {
                debug!(error = %err, "global gitignore not fully loaded");
            }
            (builder.build().ok(), Some(global).filter(|g| !g.is_empty()))
        } else {
            (None, None)
        };

        Ok(Self {
            ignored_dirs: config.ignored_dirs.clone(),
            globs: globs.build().context("Failed to build exclude set")?,
            gitignore,
            global_gitignore,
        })
    }

    /// Whether a project-relative path is excluded from the index
    pub fn is_ignored(&self, rel_path: &Path, is_dir: bool) -> bool {
        let components: Vec<&str> = rel_path
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => name.to_str(),
                _ => None,
            })
            .collect();

        for name in &components {
            // Hidden files and directories
            if name.starts_with('.') {
                return true;
            }
            if self.ignored_dirs.iter().any(|dir| dir == name) {
                return true;
            }
        }

        if let Some(name) = components.last()
            && (self.globs.is_match(name) || self.globs.is_match(rel_path))
        {
            return true;
        }

        [&self.gitignore, &self.global_gitignore]
            .into_iter()
            .flatten()
            .any(|gitignore| {
                gitignore
                    .matched_path_or_any_parents(rel_path, is_dir)
                    .is_ignore()
            })
    }
}

/// Project-relative path with `/` separators, or None for paths outside
/// `root` or with non UTF-8 names
pub fn normalize_rel_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(name) => parts.push(name.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Read a file for indexing; None if it is not a regular file, too large, or
/// unreadable
pub fn read_indexable(path: &Path, max_file_size: u64) -> Option<Vec<u8>> {
    let metadata = fs::metadata(path).ok()?;
    if !metadata.is_file() || metadata.len() > max_file_size {
        return None;
    }
    let content = fs::read(path).ok()?;
    // The file may have grown between stat and read
    if content.len() as u64 > max_file_size {
        return None;
    }
    Some(content)
}

/// Collect indexable files under `dir` as (absolute, relative) pairs,
/// sorted by relative path
pub fn walk_files(root: &Path, dir: &Path, filter: &PathFilter) -> Vec<(PathBuf, String)> {
    let walk_filter = filter.clone();
    let walk_root = root.to_path_buf();
    let walker = WalkBuilder::new(dir)
        .hidden(true)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .parents(false)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            match entry.path().strip_prefix(&walk_root) {
                Ok(rel) if !rel.as_os_str().is_empty() => !walk_filter.is_ignored(rel, is_dir),
                _ => true,
            }
        })
        .build();

    let mut files: Vec<(PathBuf, String)> = walker
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .filter_map(|entry| {
            let path = entry.into_path();
            let rel = normalize_rel_path(root, &path)?;
            Some((path, rel))
        })
        .collect();

    files.sort_by(|a, b| a.1.cmp(&b.1));
    files
}

/// Walk the project and index every eligible file into a fresh builder.
///
/// Reads run in parallel; records are inserted in path order so file ids are
/// stable for a given tree.
pub fn build_snapshot(root: &Path, config: &IndexConfig) -> Result<(SnapshotBuilder, BuildStats)> {
    let start = Instant::now();
    let filter = PathFilter::new(root, config)?;

    info!(root = %root.display(), "building index");

    let entries = walk_files(root, root, &filter);
    let skipped_large = AtomicUsize::new(0);
    let unreadable = AtomicUsize::new(0);
    let max_file_size = config.max_file_size;

    let contents: Vec<(String, Vec<u8>)> = entries
        .par_iter()
        .filter_map(|(path, rel)| {
            match fs::metadata(path) {
                Ok(meta) if meta.len() > max_file_size => {
                    debug!(path = %rel, size = meta.len(), "skipping large file");
                    skipped_large.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                Ok(_) => {}
                Err(err) => {
                    debug!(path = %rel, error = %err, "skipping unreadable file");
                    unreadable.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
            match read_indexable(path, max_file_size) {
                Some(content) => Some((rel.clone(), content)),
                None => {
                    debug!(path = %rel, "skipping unreadable file");
                    unreadable.fetch_add(1, Ordering::Relaxed);
                    None
                }
            }
        })
        .collect();

    let mut builder = SnapshotBuilder::new();
    for (rel, content) in contents {
        builder.index_file(&rel, content);
    }

    let stats = BuildStats {
        files_indexed: builder.file_count(),
        skipped_large: skipped_large.load(Ordering::Relaxed),
        unreadable: unreadable.load(Ordering::Relaxed),
        duration_ms: start.elapsed().as_millis(),
    };

    info!(
        files = stats.files_indexed,
        skipped_large = stats.skipped_large,
        unreadable = stats.unreadable,
        duration_ms = stats.duration_ms as u64,
        "index built"
    );

    Ok((builder, stats))
}
