use crate::query::errors::{QueryError, QueryResult};

/// Prefix that marks a pattern as a raw regular expression
pub const RAW_REGEX_PREFIX: &str = "r:";

/// A search pattern, classified once when the request arrives
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Pattern {
    /// Matched byte-for-byte
    Literal(String),
    /// Compiled as a regular expression as given
    Raw(String),
}

impl Pattern {
    /// Classify a request pattern. `r:` selects regex mode and is stripped.
    pub fn parse(input: &str) -> QueryResult<Self> {
        let pattern = match input.strip_prefix(RAW_REGEX_PREFIX) {
            Some(regex) => Pattern::Raw(regex.to_string()),
            None => Pattern::Literal(input.to_string()),
        };
        if pattern.text().is_empty() {
            return Err(QueryError::EmptyPattern);
        }
        Ok(pattern)
    }

    /// Pattern text without the mode prefix
    pub fn text(&self) -> &str {
        match self {
            Pattern::Literal(text) | Pattern::Raw(text) => text,
        }
    }
}
