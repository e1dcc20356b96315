//! # trigrep - project-scoped search daemon
//!
//! trigrep keeps an in-memory trigram index of one project tree, answers
//! literal and regex searches against it, and applies search/replace edits,
//! all over a framed JSON session on stdin/stdout.
//!
//! ## Architecture
//!
//! - [`index`] - File records, trigram postings, immutable versioned snapshots
//! - [`query`] - Pattern classification, trigram planning, match verification
//! - [`patch`] - Edit-block parser and the all-or-nothing patch engine
//! - [`server`] - Session protocol, file watcher, incremental updater
//! - [`config`] - Layered configuration
//! - [`logging`] - tracing subscriber setup
//! - [`utils`] - Trigram extraction and line tables
//!
//! ## Quick Start
//!
//! ```no_run
//! use trigrep::config::DaemonConfig;
//! use trigrep::server::Daemon;
//! use std::path::Path;
//!
//! let daemon = Daemon::start(Path::new("/path/to/project"), DaemonConfig::default()).unwrap();
//! let outcome = daemon.search("fn main", Some(10)).unwrap();
//! for hit in &outcome.hits {
//!     println!("{}:{}: {}", hit.file, hit.line, hit.context);
//! }
//! ```
//!
//! ## Consistency
//!
//! Searches run against whichever snapshot was current when they started.
//! Change events are debounced and folded into the next snapshot as a single
//! version, so a search never sees a half-applied batch.

pub mod config;
pub mod index;
pub mod logging;
pub mod patch;
pub mod query;
pub mod server;
pub mod utils;
