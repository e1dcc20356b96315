//! Event debouncer for file system events
//!
//! Accumulates change events within a configurable time window and produces
//! one [`ChangeBatch`] per window. Editor save patterns (write to a temp file
//! then rename, several writes in a row) and git checkouts collapse into a
//! single snapshot update this way.

use crate::server::watcher::{ChangeBatch, ChangeKind, FileChange};
use ahash::AHashMap;
use std::time::{Duration, Instant};

/// A pending batch is flushed at the latest this many windows after its
/// first event, even while events keep arriving
const MAX_WAIT_WINDOWS: u32 = 10;

/// Debouncer that accumulates file changes within a time window
pub struct EventDebouncer {
    window: Duration,
    max_wait: Duration,
    /// Latest effective change per path
    pending: AHashMap<String, ChangeKind>,
    /// Time of the first event of the pending batch
    first_event: Option<Instant>,
    /// Time of the last event (any file)
    last_event: Option<Instant>,
}

impl EventDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            max_wait: window.saturating_mul(MAX_WAIT_WINDOWS),
            pending: AHashMap::new(),
            first_event: None,
            last_event: None,
        }
    }

    /// Add a change; the last event per path wins
    pub fn add_event(&mut self, change: FileChange) {
        let now = Instant::now();
        self.first_event.get_or_insert(now);
        self.last_event = Some(now);

        let kind = match change.kind {
            ChangeKind::Renamed { from } => {
                self.pending.insert(from, ChangeKind::Deleted);
                ChangeKind::Created
            }
            kind => kind,
        };

        let merged = match (self.pending.get(&change.path), kind) {
            // Content written right after creation is still a creation
            (Some(ChangeKind::Created), ChangeKind::Modified) => ChangeKind::Created,
            // Replaced within the window
            (Some(ChangeKind::Deleted), ChangeKind::Created) => ChangeKind::Modified,
            (_, kind) => kind,
        };
        self.pending.insert(change.path, merged);
    }

    /// Check if the debounce window has elapsed since the last event, or
    /// the batch has been held back for the maximum wait
    pub fn is_ready(&self) -> bool {
        self.time_until_ready().is_some_and(|left| left.is_zero())
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Time until the pending batch is ready (None if nothing is pending)
    pub fn time_until_ready(&self) -> Option<Duration> {
        let (first, last) = self.first_event.zip(self.last_event)?;
        let quiet = self.window.saturating_sub(last.elapsed());
        let capped = self.max_wait.saturating_sub(first.elapsed());
        Some(quiet.min(capped))
    }

    /// Flush all pending changes into a batch, None if nothing is pending
    pub fn flush(&mut self) -> Option<ChangeBatch> {
        self.first_event = None;
        self.last_event = None;
        if self.pending.is_empty() {
            return None;
        }

        let mut batch = ChangeBatch::new();
        for (path, kind) in self.pending.drain() {
            batch.add(FileChange { path, kind });
        }
        batch.sort();
        Some(batch)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
