use crate::utils::{build_line_offsets, is_binary};
use std::sync::Arc;
use xxhash_rust::xxh3::xxh3_64;

/// Unique identifier for a file in the index
pub type FileId = u32;

/// A trigram is a 3-byte sequence stored as u32 (only lower 24 bits used)
pub type Trigram = u32;

/// Snapshot version counter
pub type Version = u64;

/// File flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileFlags(pub u16);

impl FileFlags {
    pub const NONE: u16 = 0;
    pub const BINARY: u16 = 1 << 0;

    pub fn new() -> Self {
        Self(Self::NONE)
    }

    pub fn is_binary(&self) -> bool {
        self.0 & Self::BINARY != 0
    }

    pub fn set_binary(&mut self) {
        self.0 |= Self::BINARY;
    }
}

/// Canonical record of one indexed file.
///
/// Records are never mutated once built: a content change produces a new
/// record that replaces the old one in the next snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: FileId,
    /// Project-relative path with `/` separators
    pub path: String,
    /// Raw bytes as read from disk
    pub content: Arc<[u8]>,
    /// Byte offsets of line starts
    pub line_offsets: Vec<u32>,
    /// xxh3-64 of `content`
    pub content_hash: u64,
    pub flags: FileFlags,
}

impl FileRecord {
    /// Build a record from raw bytes
    pub fn new(id: FileId, path: impl Into<String>, content: Vec<u8>) -> Self {
        let mut flags = FileFlags::new();
        if is_binary(&content) {
            flags.set_binary();
        }

        Self {
            id,
            path: path.into(),
            line_offsets: build_line_offsets(&content),
            content_hash: xxh3_64(&content),
            content: Arc::from(content),
            flags,
        }
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Whether this record holds exactly `content`
    pub fn same_content(&self, content: &[u8]) -> bool {
        self.content.len() == content.len()
            && self.content_hash == xxh3_64(content)
            && *self.content == *content
    }
}

/// Configuration for the indexer
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Files larger than this are not indexed
    pub max_file_size: u64,
    /// Directory names that are never descended into
    pub ignored_dirs: Vec<String>,
    /// File globs that are never indexed
    pub ignored_globs: Vec<String>,
    /// Honor .gitignore, global gitignore and .git/info/exclude
    pub follow_gitignore: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            ignored_dirs: [
                ".git",
                "node_modules",
                "target",
                "__pycache__",
                ".venv",
                "venv",
                ".idea",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            ignored_globs: ["*.pyc", "*.pyo", "*.so", "*.o", "*.obj", ".DS_Store"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            follow_gitignore: true,
        }
    }
}

/// Convert 3 bytes to a trigram
#[inline]
pub fn bytes_to_trigram(b0: u8, b1: u8, b2: u8) -> Trigram {
    ((b0 as u32) << 16) | ((b1 as u32) << 8) | (b2 as u32)
}

/// Convert trigram back to bytes
#[inline]
pub fn trigram_to_bytes(t: Trigram) -> [u8; 3] {
    [
        ((t >> 16) & 0xFF) as u8,
        ((t >> 8) & 0xFF) as u8,
        (t & 0xFF) as u8,
    ]
}
