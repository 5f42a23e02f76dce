//! Error types for fsqueue.
//!
//! Storage failures carry the path they happened on so an operator can go
//! and look at the file.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A required option is missing or has the wrong type.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("queue directory {path:?} could not be created: {source}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not write message to file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not read message from file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but does not hold a message record. Left on disk.
    #[error("invalid message data in file {path:?}: {source}")]
    CorruptData {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not remove message file {path:?}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Caller broke the contract, e.g. acked an envelope that was never sent or received.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("invalid message id: {0:?}")]
    InvalidId(String),

    #[error("codec error: {0}")]
    Codec(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// True for failures caused by what is on disk rather than by the caller.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Error::DirectoryCreation { .. }
                | Error::Write { .. }
                | Error::Read { .. }
                | Error::CorruptData { .. }
                | Error::Remove { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
