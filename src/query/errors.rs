use thiserror::Error;

/// Errors raised while planning or running a search
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Search pattern must not be empty")]
    EmptyPattern,

    #[error("Invalid regex '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("max_results must be a positive integer, got {0}")]
    InvalidMaxResults(i64),
}

pub type QueryResult<T> = std::result::Result<T, QueryError>;
