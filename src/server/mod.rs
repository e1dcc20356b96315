//! Long-running daemon for one project
//!
//! Architecture:
//! - `daemon`: builds the index, serves the framed request/response session
//! - `watcher`: notify events mapped to project-relative changes
//! - `debouncer` + `updater`: single consumer folding change batches into
//!   new snapshot versions
//! - `protocol`: `Content-Length` framing and message types

pub mod daemon;
pub mod debouncer;
pub mod protocol;
pub mod updater;
pub mod watcher;

pub use daemon::{run_session, Daemon};
pub use protocol::{read_message, write_message, ProtocolError, Request, Response};
pub use updater::{IndexUpdater, UpdaterHandle};
pub use watcher::{ChangeBatch, ChangeKind, FileChange, WatcherConfig, WatcherHandle};
