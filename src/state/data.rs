//! Shared data structures for the photograph side of the catalog
//!
//! These structs represent the data model that flows between the ingest
//! pipeline, the error ledger and the database layer.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identifier::Identifier;

/// Stable key of a photograph: `<directory name>/<file name>`.
///
/// Only the last directory component is kept so the same photo reached
/// through different roots maps to the same key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PhotoPath(String);

impl PhotoPath {
    pub fn new(dir_name: &str, file_name: &str) -> Self {
        if dir_name.is_empty() {
            PhotoPath(file_name.to_string())
        } else {
            PhotoPath(format!("{}/{}", dir_name, file_name))
        }
    }

    /// Normalize a file system path into a key
    pub fn from_path(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_string_lossy();
        let dir_name = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|d| d.to_string_lossy())
            .unwrap_or_default();
        Some(PhotoPath::new(&dir_name, &file_name))
    }

    /// Rebuild a key that was stored as text (already normalized or not)
    pub fn parse(stored: &str) -> Self {
        PhotoPath::from_path(Path::new(stored)).unwrap_or_else(|| PhotoPath(stored.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhotoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A photograph on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Photograph {
    /// Natural key for identifier and error records
    pub key: PhotoPath,
    /// Where the pixels live
    pub source: PathBuf,
}

impl Photograph {
    pub fn new(source: impl Into<PathBuf>) -> Result<Self> {
        let source = source.into();
        let key = PhotoPath::from_path(&source)
            .ok_or_else(|| Error::InvalidInput(format!("not a file path: {}", source.display())))?;
        Ok(Photograph { key, source })
    }
}

/// One accepted (photograph, identifier) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierRecord {
    pub photo: PhotoPath,
    pub identifier: Identifier,
    /// Inserted by an operator rather than decoded
    pub forced: bool,
}

impl IdentifierRecord {
    pub fn decoded(photo: PhotoPath, identifier: Identifier) -> Self {
        IdentifierRecord { photo, identifier, forced: false }
    }
}
