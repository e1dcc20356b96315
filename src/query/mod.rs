//! Search over index snapshots.
//!
//! A request pattern is classified into a [`Pattern`], planned into a
//! [`TrigramQuery`] that narrows candidate files through the posting lists,
//! and verified by [`QueryEngine`] against file contents.

pub mod errors;
pub mod executor;
pub mod pattern;
pub mod planner;

pub use errors::{QueryError, QueryResult};
pub use executor::{QueryEngine, SearchHit, SearchOptions, SearchOutcome};
pub use pattern::Pattern;
pub use planner::TrigramQuery;
