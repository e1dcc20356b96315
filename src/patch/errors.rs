use thiserror::Error;

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("Invalid change format at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Refusing to edit path outside the project: {0}")]
    UnsafePath(String),

    #[error("File not found: {file}")]
    FileNotFound { file: String },

    #[error("Search text not found in {file} (hunk {hunk})")]
    SearchNotFound { file: String, hunk: usize },

    #[error("Search text matches more than once in {file} (hunk {hunk})")]
    AmbiguousSearch { file: String, hunk: usize },

    #[error("Cannot create {file}: file already exists and is not empty (hunk {hunk})")]
    FileExists { file: String, hunk: usize },

    #[error("Failed to read {file}: {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {file}: {source}; no changes were kept")]
    Commit {
        file: String,
        #[source]
        source: std::io::Error,
    },
}

impl PatchError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        PatchError::Parse {
            line,
            message: message.into(),
        }
    }
}

pub type PatchResult<T> = std::result::Result<T, PatchError>;
