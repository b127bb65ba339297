//! Error types for specimen-ledger
//!
//! Per-photograph failures are not errors at this level: the batch ingestor
//! turns them into ledger entries. Everything here aborts the current run.

use std::path::PathBuf;

use thiserror::Error;

use crate::identifier::Identifier;
use crate::state::data::PhotoPath;

/// Result type for specimen-ledger operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A photograph could not be opened or decoded as an image
    #[error("Unreadable image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Catalog database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Photo directory traversal error
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input rows violate the expected shape (bad well address, bad partner id, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Manual resolution referenced an error that is not in the ledger
    #[error("Not found: {0}")]
    NotFound(String),

    /// A forced identifier is already held by another accepted photograph
    #[error("Identifier {identifier} is already assigned to {photo}")]
    IdentifierClaimed {
        identifier: Identifier,
        photo: PhotoPath,
    },

    /// A decode worker panicked or was cancelled
    #[error("Worker error: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidInput(err.to_string())
    }
}
