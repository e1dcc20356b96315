//! Utility functions shared by the index and the query engine.
//!
//! - [`trigram`] - 3-byte sequence extraction, binary detection and
//!   line-offset tables
//!
//! ```
//! use trigrep::utils::{build_line_offsets, extract_trigrams, line_for_offset};
//!
//! // Distinct trigrams of the content, sorted
//! let trigrams = extract_trigrams(b"hello world");
//! assert_eq!(trigrams.len(), 9);
//!
//! let offsets = build_line_offsets(b"one\ntwo\n");
//! assert_eq!(line_for_offset(&offsets, 5), 2);
//! ```

pub mod trigram;

pub use trigram::*;
