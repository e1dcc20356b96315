//! In-memory trigram index.
//!
//! - [`types`] - file records and shared identifiers
//! - [`postings`] - trigram posting lists
//! - [`snapshot`] - immutable snapshots and the copy-on-write builder
//! - [`manager`] - lock-free publication of the current snapshot
//! - [`build`] - full project walk producing the first snapshot

pub mod build;
pub mod manager;
pub mod postings;
pub mod snapshot;
pub mod types;

pub use build::{build_snapshot, BuildStats, PathFilter};
pub use manager::{SnapshotManager, UpdateOutcome};
pub use postings::TrigramPostings;
pub use snapshot::{IndexOutcome, IndexSnapshot, SnapshotBuilder};
pub use types::*;
