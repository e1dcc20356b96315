//! Publication point for index snapshots.
//!
//! Readers load the current snapshot without locking; a reader that holds an
//! `Arc<IndexSnapshot>` keeps seeing that version even after newer ones are
//! published. Writers are serialized by `build_lock` so exactly one next
//! version is under construction at any time.

use crate::index::snapshot::{IndexSnapshot, SnapshotBuilder};
use crate::index::types::Version;
use arc_swap::ArcSwap;
use std::sync::{Arc, Mutex};

pub struct SnapshotManager {
    current: ArcSwap<IndexSnapshot>,
    build_lock: Mutex<()>,
}

/// Result of one serialized update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Version current after the update
    pub version: Version,
    /// Whether a new version was published
    pub published: bool,
    /// Record changes folded into that version
    pub changes: usize,
}

impl SnapshotManager {
    pub fn new(initial: IndexSnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            build_lock: Mutex::new(()),
        }
    }

    /// Latest published snapshot
    pub fn current(&self) -> Arc<IndexSnapshot> {
        self.current.load_full()
    }

    pub fn version(&self) -> Version {
        self.current.load().version()
    }

    /// Build the next version from the current one and publish it.
    ///
    /// `apply` edits a working copy of the current snapshot. Nothing is
    /// published when it leaves the copy unchanged.
    pub fn update<F>(&self, apply: F) -> UpdateOutcome
    where
        F: FnOnce(&mut SnapshotBuilder),
    {
        let _guard = self
            .build_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let base = self.current.load_full();
        let mut builder = base.builder();
        apply(&mut builder);

        if !builder.is_dirty() {
            return UpdateOutcome {
                version: base.version(),
                published: false,
                changes: 0,
            };
        }

        let changes = builder.change_count();
        let next = builder.finish(base.version() + 1);
        let version = next.version();
        self.current.store(Arc::new(next));

        UpdateOutcome {
            version,
            published: true,
            changes,
        }
    }

    /// Replace the current snapshot wholesale, e.g. after a full rebuild.
    ///
    /// The replacement is renumbered above the current version so versions
    /// keep strictly increasing.
    pub fn publish(&self, builder: SnapshotBuilder) -> Version {
        let _guard = self
            .build_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let version = self.current.load().version() + 1;
        self.current.store(Arc::new(builder.finish(version)));
        version
    }
}
