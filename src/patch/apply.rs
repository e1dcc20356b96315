use crate::patch::errors::{PatchError, PatchResult};
use crate::patch::parser::{parse_changes, EditRequest};
use memchr::memmem;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

/// Per-path mutual exclusion shared by the patch engine and the index
/// updater, so a patch and a re-index never interleave on one file.
///
/// Entries live only while a handle for the path exists.
#[derive(Debug, Default)]
pub struct PathLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Lock handle for a project-relative path
    pub fn handle(&self, path: &str) -> PathHandle<'_> {
        let mutex = Arc::clone(self.map().entry(path.to_string()).or_default());
        PathHandle {
            locks: self,
            path: path.to_string(),
            mutex,
        }
    }

    /// Run `f` while holding the lock for `path`
    pub fn with_lock<T>(&self, path: &str, f: impl FnOnce() -> T) -> T {
        let handle = self.handle(path);
        let _guard = handle.lock();
        f()
    }

    /// Number of paths with a live handle
    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}

/// Shared lock for one path, obtained from [`PathLocks::handle`]
#[derive(Debug)]
pub struct PathHandle<'a> {
    locks: &'a PathLocks,
    path: String,
    mutex: Arc<Mutex<()>>,
}

impl PathHandle<'_> {
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        lock(&self.mutex)
    }

    pub fn same_lock(&self, other: &PathHandle<'_>) -> bool {
        Arc::ptr_eq(&self.mutex, &other.mutex)
    }
}

impl Drop for PathHandle<'_> {
    fn drop(&mut self) {
        let mut map = self.locks.map();
        // Handles are only cloned under the map lock: the map and this
        // handle being the sole owners means nobody else can be waiting
        if Arc::strong_count(&self.mutex) == 2 {
            map.remove(&self.path);
        }
    }
}

fn lock(mutex: &Mutex<()>) -> MutexGuard<'_, ()> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// What a successful apply changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    /// Existing files rewritten, in request order
    pub modified: Vec<String>,
    /// Files created by the request
    pub created: Vec<String>,
    pub hunks: usize,
}

/// State of one target file while a request is being validated
struct Target {
    rel: String,
    abs: PathBuf,
    original: Option<Vec<u8>>,
    current: Option<Vec<u8>>,
    /// Hunks applied so far, counted across every group naming this file
    hunks: usize,
}

/// Applies search/replace change requests to files under a project root.
///
/// Every hunk of every file is validated against in-memory copies before the
/// first byte is written; a request either lands completely or not at all.
pub struct PatchEngine {
    root: PathBuf,
    locks: Arc<PathLocks>,
    apply_lock: Mutex<()>,
}

impl PatchEngine {
    pub fn new(root: impl Into<PathBuf>, locks: Arc<PathLocks>) -> Self {
        Self {
            root: root.into(),
            locks,
            apply_lock: Mutex::new(()),
        }
    }

    /// Parse and apply a change string
    pub fn apply_changes(&self, changes: &str) -> PatchResult<ApplySummary> {
        let request = parse_changes(changes)?;
        self.apply(&request)
    }

    /// Apply a parsed request atomically
    pub fn apply(&self, request: &EditRequest) -> PatchResult<ApplySummary> {
        let _apply_guard = lock(&self.apply_lock);

        // Distinct target paths in request order
        let mut order: Vec<String> = Vec::new();
        for edit in &request.files {
            let rel = normalize_target(&edit.path)?;
            if !order.contains(&rel) {
                order.push(rel);
            }
        }

        let mut sorted = order.clone();
        sorted.sort();
        let handles: Vec<PathHandle<'_>> = sorted.iter().map(|p| self.locks.handle(p)).collect();
        let _path_guards: Vec<MutexGuard<'_, ()>> = handles.iter().map(PathHandle::lock).collect();

        let mut targets: Vec<Target> = Vec::with_capacity(order.len());
        for rel in &order {
            let abs = self.resolve(rel)?;
            let original = match fs::read(&abs) {
                Ok(bytes) => Some(bytes),
                Err(err) if err.kind() == io::ErrorKind::NotFound => None,
                Err(source) => {
                    return Err(PatchError::Io {
                        file: rel.clone(),
                        source,
                    });
                }
            };
            targets.push(Target {
                rel: rel.clone(),
                abs,
                current: original.clone(),
                original,
                hunks: 0,
            });
        }

        for edit in &request.files {
            let rel = normalize_target(&edit.path)?;
            let Some(target) = targets.iter_mut().find(|t| t.rel == rel) else {
                continue;
            };
            for hunk in &edit.hunks {
                target.hunks += 1;
                target.current = Some(apply_hunk(
                    target.current.take(),
                    &hunk.search,
                    &hunk.replace,
                    &target.rel,
                    target.hunks,
                )?);
            }
        }

        let summary = self.commit(&targets, request.hunk_count())?;
        info!(
            modified = summary.modified.len(),
            created = summary.created.len(),
            hunks = summary.hunks,
            "applied changes"
        );
        Ok(summary)
    }

    /// Write every changed target, restoring already-written files if a
    /// later write fails
    fn commit(&self, targets: &[Target], hunks: usize) -> PatchResult<ApplySummary> {
        let mut summary = ApplySummary {
            hunks,
            ..Default::default()
        };
        let mut written: Vec<&Target> = Vec::new();

        for target in targets {
            let Some(current) = &target.current else {
                continue;
            };
            if target.original.as_ref() == Some(current) {
                continue;
            }

            if let Err(source) = write_atomic(&target.abs, current) {
                for done in written.iter().rev() {
                    rollback(done);
                }
                return Err(PatchError::Commit {
                    file: target.rel.clone(),
                    source,
                });
            }

            written.push(target);
            if target.original.is_some() {
                summary.modified.push(target.rel.clone());
            } else {
                summary.created.push(target.rel.clone());
            }
        }

        Ok(summary)
    }

    /// Absolute path for a normalized relative path, refusing anything that
    /// resolves outside the project through symlinks
    fn resolve(&self, rel: &str) -> PatchResult<PathBuf> {
        let abs = self.root.join(rel);
        let root = self
            .root
            .canonicalize()
            .map_err(|_| PatchError::UnsafePath(rel.to_string()))?;

        let mut existing = abs.as_path();
        while !existing.exists() {
            match existing.parent() {
                Some(parent) => existing = parent,
                None => break,
            }
        }
        let resolved = existing
            .canonicalize()
            .map_err(|_| PatchError::UnsafePath(rel.to_string()))?;
        if !resolved.starts_with(&root) {
            return Err(PatchError::UnsafePath(rel.to_string()));
        }
        Ok(abs)
    }
}

/// Validate a path from a change block and normalize it to `/` separators
fn normalize_target(path: &str) -> PatchResult<String> {
    let unsafe_path = || PatchError::UnsafePath(path.to_string());
    let cleaned = path.trim().replace('\\', "/");
    if cleaned.is_empty() || cleaned.starts_with('/') {
        return Err(unsafe_path());
    }

    let mut parts = Vec::new();
    for component in Path::new(&cleaned).components() {
        match component {
            Component::Normal(name) => parts.push(name.to_str().ok_or_else(unsafe_path)?),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(unsafe_path());
            }
        }
    }
    if parts.is_empty() {
        return Err(unsafe_path());
    }
    Ok(parts.join("/"))
}

/// Apply one hunk to the in-memory content of a file
fn apply_hunk(
    current: Option<Vec<u8>>,
    search: &str,
    replace: &str,
    file: &str,
    hunk: usize,
) -> PatchResult<Vec<u8>> {
    let Some(content) = current else {
        if search.is_empty() {
            return Ok(replace.as_bytes().to_vec());
        }
        return Err(PatchError::FileNotFound {
            file: file.to_string(),
        });
    };

    if search.is_empty() {
        if content.is_empty() {
            return Ok(replace.as_bytes().to_vec());
        }
        return Err(PatchError::FileExists {
            file: file.to_string(),
            hunk,
        });
    }

    let not_found = || PatchError::SearchNotFound {
        file: file.to_string(),
        hunk,
    };
    let ambiguous = || PatchError::AmbiguousSearch {
        file: file.to_string(),
        hunk,
    };

    let (start, search, replace) = match locate(&content, search.as_bytes()) {
        Located::Once(start) => (start, search.to_string(), replace.to_string()),
        Located::Many => return Err(ambiguous()),
        // Hunk text is always `\n`-joined; retry against CRLF files
        Located::None if search.contains('\n') && memmem::find(&content, b"\r\n").is_some() => {
            let crlf_search = search.replace('\n', "\r\n");
            match locate(&content, crlf_search.as_bytes()) {
                Located::Once(start) => (start, crlf_search, replace.replace('\n', "\r\n")),
                Located::Many => return Err(ambiguous()),
                Located::None => return Err(not_found()),
            }
        }
        Located::None => return Err(not_found()),
    };

    let end = start + search.len();
    let mut next = Vec::with_capacity(content.len() - search.len() + replace.len());
    next.extend_from_slice(&content[..start]);
    next.extend_from_slice(replace.as_bytes());
    next.extend_from_slice(&content[end..]);
    Ok(next)
}

enum Located {
    None,
    Once(usize),
    Many,
}

/// Find `needle` in `haystack`, counting overlapping occurrences as distinct
fn locate(haystack: &[u8], needle: &[u8]) -> Located {
    let Some(first) = memmem::find(haystack, needle) else {
        return Located::None;
    };
    match memmem::find(&haystack[first + 1..], needle) {
        Some(_) => Located::Many,
        None => Located::Once(first),
    }
}

/// Replace `path` with `content` through a temp file in the same directory
fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    fs::create_dir_all(parent)?;

    let permissions = fs::metadata(path).ok().map(|m| m.permissions());

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    if let Some(permissions) = permissions {
        fs::set_permissions(temp.path(), permissions)?;
    }
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn rollback(target: &Target) {
    let result = match &target.original {
        Some(original) => write_atomic(&target.abs, original),
        None => fs::remove_file(&target.abs),
    };
    if let Err(err) = result {
        warn!(path = %target.rel, error = %err, "failed to roll back change");
    }
}
