//! Search/replace patch application.
//!
//! [`parser`] turns the change text into an [`EditRequest`]; [`apply`]
//! validates every hunk against fresh file contents and only then writes.
//! The index is never touched directly: written files reach it through the
//! watcher like any other edit.

pub mod apply;
pub mod errors;
pub mod parser;

pub use apply::{ApplySummary, PatchEngine, PathHandle, PathLocks};
pub use errors::{PatchError, PatchResult};
pub use parser::{parse_changes, EditRequest, FileEdit, Hunk};
