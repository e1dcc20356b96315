use crate::index::snapshot::IndexSnapshot;
use crate::index::types::{FileRecord, Version};
use crate::query::errors::{QueryError, QueryResult};
use crate::query::pattern::Pattern;
use crate::query::planner::TrigramQuery;
use crate::utils::line_for_offset;
use lru::LruCache;
use memchr::memmem;
use rayon::prelude::*;
use regex::bytes::Regex;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Default hard cap on matches collected for one search
pub const DEFAULT_MATCH_CAP: usize = 10_000;

/// Default bytes of context on each side of a match
pub const DEFAULT_CONTEXT_BYTES: usize = 50;

/// Default number of cached result sets
pub const DEFAULT_CACHE_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    pub match_cap: usize,
    pub context_bytes: usize,
    pub cache_size: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            match_cap: DEFAULT_MATCH_CAP,
            context_bytes: DEFAULT_CONTEXT_BYTES,
            cache_size: DEFAULT_CACHE_SIZE,
        }
    }
}

/// One verified match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub file: String,
    /// Byte offset of the first matched byte
    pub start: usize,
    /// Byte offset one past the last matched byte
    pub end: usize,
    /// 1-based line of `start`
    pub line: u32,
    pub context: String,
}

/// Every hit found for one (version, pattern), up to the match cap
#[derive(Debug)]
struct SearchResults {
    total_matches: usize,
    hits: Vec<SearchHit>,
}

/// Result of one search request
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Snapshot version the search ran against
    pub version: Version,
    /// Matches found, bounded by the match cap
    pub total_matches: usize,
    /// First `max_results` hits in file-table order
    pub hits: Vec<SearchHit>,
    pub cached: bool,
}

impl SearchOutcome {
    pub fn returned_matches(&self) -> usize {
        self.hits.len()
    }

    /// Hits grouped by file, preserving order
    pub fn by_file(&self) -> Vec<(&str, Vec<&SearchHit>)> {
        let mut groups: Vec<(&str, Vec<&SearchHit>)> = Vec::new();
        for hit in &self.hits {
            match groups.last_mut() {
                Some((file, hits)) if *file == hit.file => hits.push(hit),
                _ => groups.push((hit.file.as_str(), vec![hit])),
            }
        }
        groups
    }
}

/// Compiled matcher for one pattern
enum Matcher {
    Literal(memmem::Finder<'static>),
    Regex(Regex),
}

impl Matcher {
    fn compile(pattern: &Pattern) -> QueryResult<Self> {
        match pattern {
            Pattern::Literal(text) => Ok(Matcher::Literal(
                memmem::Finder::new(text.as_bytes()).into_owned(),
            )),
            Pattern::Raw(regex) => Regex::new(regex)
                .map(Matcher::Regex)
                .map_err(|err| QueryError::InvalidRegex {
                    pattern: regex.clone(),
                    message: err.to_string(),
                }),
        }
    }

    /// Non-overlapping matches in file order, at most `limit`
    fn find(&self, record: &FileRecord, limit: usize) -> Vec<(usize, usize)> {
        match self {
            Matcher::Literal(finder) => {
                let len = finder.needle().len();
                finder
                    .find_iter(&record.content)
                    .take(limit)
                    .map(|start| (start, start + len))
                    .collect()
            }
            // Regex verification is text-only
            Matcher::Regex(_) if record.flags.is_binary() => Vec::new(),
            Matcher::Regex(regex) => regex
                .find_iter(&record.content)
                .take(limit)
                .map(|m| (m.start(), m.end()))
                .collect(),
        }
    }
}

/// Runs searches against snapshots and caches their results
pub struct QueryEngine {
    options: SearchOptions,
    cache: Option<Mutex<LruCache<(Version, Pattern), Arc<SearchResults>>>>,
}

impl QueryEngine {
    pub fn new(options: SearchOptions) -> Self {
        let cache = NonZeroUsize::new(options.cache_size).map(|size| Mutex::new(LruCache::new(size)));
        Self { options, cache }
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Search `snapshot` for `pattern`, returning at most `max_results` hits.
    ///
    /// The whole search observes only `snapshot`, whatever gets published
    /// meanwhile.
    pub fn search(
        &self,
        snapshot: &IndexSnapshot,
        pattern: &Pattern,
        max_results: usize,
    ) -> QueryResult<SearchOutcome> {
        if max_results == 0 {
            return Err(QueryError::InvalidMaxResults(0));
        }

        let key = (snapshot.version(), pattern.clone());
        if let Some(results) = self.cached(&key) {
            return Ok(Self::outcome(snapshot.version(), &results, max_results, true));
        }

        let results = Arc::new(self.execute(snapshot, pattern)?);
        if let Some(cache) = &self.cache {
            cache
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .put(key, Arc::clone(&results));
        }

        Ok(Self::outcome(snapshot.version(), &results, max_results, false))
    }

    fn cached(&self, key: &(Version, Pattern)) -> Option<Arc<SearchResults>> {
        let cache = self.cache.as_ref()?;
        cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    fn outcome(
        version: Version,
        results: &SearchResults,
        max_results: usize,
        cached: bool,
    ) -> SearchOutcome {
        SearchOutcome {
            version,
            total_matches: results.total_matches,
            hits: results.hits.iter().take(max_results).cloned().collect(),
            cached,
        }
    }

    fn execute(&self, snapshot: &IndexSnapshot, pattern: &Pattern) -> QueryResult<SearchResults> {
        let matcher = Matcher::compile(pattern)?;
        let query = TrigramQuery::for_pattern(pattern);
        let candidates = query.candidates(snapshot.postings());

        let records: Vec<&Arc<FileRecord>> = match &candidates {
            Some(ids) => snapshot
                .files()
                .filter(|record| ids.contains(record.id))
                .collect(),
            None => snapshot.files().collect(),
        };

        debug!(
            version = snapshot.version(),
            candidates = records.len(),
            files = snapshot.file_count(),
            full_scan = candidates.is_none(),
            "verifying candidates"
        );

        let cap = self.options.match_cap;
        let per_file: Vec<Vec<(usize, usize)>> = records
            .par_iter()
            .map(|record| matcher.find(record, cap))
            .collect();

        let mut hits = Vec::new();
        'files: for (record, spans) in records.iter().zip(per_file) {
            for (start, end) in spans {
                if hits.len() >= cap {
                    break 'files;
                }
                hits.push(SearchHit {
                    file: record.path.clone(),
                    start,
                    end,
                    line: line_for_offset(&record.line_offsets, start),
                    context: context_window(&record.content, start, end, self.options.context_bytes),
                });
            }
        }

        Ok(SearchResults {
            total_matches: hits.len(),
            hits,
        })
    }
}

impl Default for QueryEngine {
    fn default() -> Self {
        Self::new(SearchOptions::default())
    }
}

/// Up to `radius` bytes either side of `start..end`, trimmed inward to
/// UTF-8 character boundaries
fn context_window(content: &[u8], start: usize, end: usize, radius: usize) -> String {
    let mut from = start.saturating_sub(radius);
    let mut to = end.saturating_add(radius).min(content.len());

    while from < start && is_continuation(content[from]) {
        from += 1;
    }
    while to > end && to < content.len() && is_continuation(content[to]) {
        to -= 1;
    }

    String::from_utf8_lossy(&content[from..to]).into_owned()
}

#[inline]
fn is_continuation(byte: u8) -> bool {
    byte & 0b1100_0000 == 0b1000_0000
}
