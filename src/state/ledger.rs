//! Identifier table and error ledger
//!
//! The ledger is the in-memory form of what the catalog persists: accepted
//! (photograph, identifier) records, per-photograph ingest errors and
//! unresolved partner wells. Records are never deleted; errors are only
//! ever annotated as resolved.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::identifier::Identifier;
use crate::ingest::batch::{AlreadySeen, IngestReport};
use crate::plate::reconcile::{Reconciliation, UnresolvedReason};
use crate::plate::well::{PartnerWell, WellAddress};
use crate::state::data::{IdentifierRecord, PhotoPath};

/// The closed set of data-quality problems the pipeline reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    MissingIdentifier,
    DuplicateIdentifier,
    UnreadableFile,
    UnresolvedWell,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MissingIdentifier => "MISSING_IDENTIFIER",
            ErrorCode::DuplicateIdentifier => "DUPLICATE_IDENTIFIER",
            ErrorCode::UnreadableFile => "UNREADABLE_FILE",
            ErrorCode::UnresolvedWell => "UNRESOLVED_WELL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestErrorKind {
    /// No decode strategy found an identifier
    MissingIdentifier,
    /// `identifier` was already accepted for `prior`
    DuplicateIdentifier { identifier: Identifier, prior: PhotoPath },
    /// The file could not be opened as an image
    UnreadableFile { detail: String },
}

/// A photograph that did not produce an accepted record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestError {
    pub photo: PhotoPath,
    pub kind: IngestErrorKind,
    pub resolved: bool,
    pub resolution: Option<String>,
}

impl IngestError {
    fn new(photo: PhotoPath, kind: IngestErrorKind) -> Self {
        IngestError { photo, kind, resolved: false, resolution: None }
    }

    pub fn missing(photo: PhotoPath) -> Self {
        Self::new(photo, IngestErrorKind::MissingIdentifier)
    }

    pub fn duplicate(photo: PhotoPath, identifier: Identifier, prior: PhotoPath) -> Self {
        Self::new(photo, IngestErrorKind::DuplicateIdentifier { identifier, prior })
    }

    pub fn unreadable(photo: PhotoPath, detail: impl Into<String>) -> Self {
        Self::new(photo, IngestErrorKind::UnreadableFile { detail: detail.into() })
    }

    pub fn code(&self) -> ErrorCode {
        match self.kind {
            IngestErrorKind::MissingIdentifier => ErrorCode::MissingIdentifier,
            IngestErrorKind::DuplicateIdentifier { .. } => ErrorCode::DuplicateIdentifier,
            IngestErrorKind::UnreadableFile { .. } => ErrorCode::UnreadableFile,
        }
    }
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            IngestErrorKind::MissingIdentifier => {
                write!(f, "MISSING: barcode missing in {}", self.photo)
            }
            IngestErrorKind::DuplicateIdentifier { identifier, prior } => write!(
                f,
                "DUPLICATES: files {} and {} have the same identifier {}",
                self.photo, prior, identifier
            ),
            IngestErrorKind::UnreadableFile { detail } => {
                write!(f, "UNREADABLE: {}: {}", self.photo, detail)
            }
        }
    }
}

/// A partner well reconciliation could not place
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WellError {
    pub well: PartnerWell,
    pub reason: UnresolvedReason,
    pub resolved: bool,
    pub resolution: Option<String>,
}

impl WellError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::UnresolvedWell
    }

    fn key(&self) -> (String, WellAddress) {
        (self.well.plate.clone(), self.well.well)
    }
}

impl fmt::Display for WellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UNRESOLVED: partner plate {} well {} ({})",
            self.well.plate, self.well.well, self.reason
        )
    }
}

/// Address of a ledger error for manual resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKey {
    Photograph(PhotoPath),
    PartnerWell { plate: String, well: WellAddress },
}

impl fmt::Display for ErrorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKey::Photograph(photo) => write!(f, "photograph {}", photo),
            ErrorKey::PartnerWell { plate, well } => {
                write!(f, "partner plate {} well {}", plate, well)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    records: BTreeMap<PhotoPath, IdentifierRecord>,
    claims: BTreeMap<Identifier, PhotoPath>,
    errors: BTreeMap<PhotoPath, IngestError>,
    well_errors: BTreeMap<(String, WellAddress), WellError>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from stored rows, enforcing one identifier per photograph and vice versa
    pub fn from_parts(
        records: Vec<IdentifierRecord>,
        errors: Vec<IngestError>,
        well_errors: Vec<WellError>,
    ) -> Result<Self> {
        let mut ledger = Ledger::new();
        for record in records {
            if let Some(other) = ledger.claims.get(&record.identifier) {
                return Err(Error::InvalidInput(format!(
                    "identifier {} stored for both {} and {}",
                    record.identifier, other, record.photo
                )));
            }
            if ledger.records.contains_key(&record.photo) {
                let message = format!("photograph {} stored twice", record.photo);
                return Err(Error::InvalidInput(message));
            }
            ledger.claims.insert(record.identifier, record.photo.clone());
            ledger.records.insert(record.photo.clone(), record);
        }
        for error in errors {
            ledger.errors.insert(error.photo.clone(), error);
        }
        for error in well_errors {
            ledger.well_errors.insert(error.key(), error);
        }
        Ok(ledger)
    }

    pub fn records(&self) -> impl Iterator<Item = &IdentifierRecord> {
        self.records.values()
    }

    pub fn errors(&self) -> impl Iterator<Item = &IngestError> {
        self.errors.values()
    }

    pub fn well_errors(&self) -> impl Iterator<Item = &WellError> {
        self.well_errors.values()
    }

    /// Errors still waiting for an operator
    pub fn open_error_count(&self) -> usize {
        self.errors.values().filter(|e| !e.resolved).count()
            + self.well_errors.values().filter(|e| !e.resolved).count()
    }

    pub fn identifier_for(&self, photo: &PhotoPath) -> Option<Identifier> {
        self.records.get(photo).map(|r| r.identifier)
    }

    pub fn photo_for(&self, identifier: &Identifier) -> Option<&PhotoPath> {
        self.claims.get(identifier)
    }

    /// Everything a re-run must skip, plus the identifiers it may not re-claim
    pub fn already_seen(&self) -> AlreadySeen {
        let mut seen = AlreadySeen::new();
        for photo in self.records.keys().chain(self.errors.keys()) {
            seen.insert_path(photo.clone());
        }
        for (identifier, photo) in &self.claims {
            seen.claim(*identifier, photo.clone());
        }
        seen
    }

    /// Fold one ingest run into the ledger.
    ///
    /// Existing error entries keep their resolution. A record whose
    /// identifier is already claimed is diverted to a duplicate error.
    /// Returns (records added, errors added).
    pub fn merge(&mut self, report: IngestReport) -> (usize, usize) {
        let mut added_records = 0;
        let mut added_errors = 0;

        for record in report.accepted {
            if self.records.contains_key(&record.photo) {
                continue;
            }
            if let Some(prior) = self.claims.get(&record.identifier) {
                let error =
                    IngestError::duplicate(record.photo.clone(), record.identifier, prior.clone());
                warn!("{}", error);
                if self.insert_error(error) {
                    added_errors += 1;
                }
                continue;
            }
            self.claims.insert(record.identifier, record.photo.clone());
            self.records.insert(record.photo.clone(), record);
            added_records += 1;
        }

        for error in report.errors {
            if self.insert_error(error) {
                added_errors += 1;
            }
        }

        (added_records, added_errors)
    }

    fn insert_error(&mut self, error: IngestError) -> bool {
        if self.errors.contains_key(&error.photo) {
            return false;
        }
        self.errors.insert(error.photo.clone(), error);
        true
    }

    /// Replace the unresolved-well entries with the outcome of a reconciliation.
    ///
    /// Wells that now resolve are dropped; wells still unresolved keep any
    /// operator note they already had.
    pub fn record_reconciliation(&mut self, result: &Reconciliation) {
        let mut previous = std::mem::take(&mut self.well_errors);
        for unresolved in &result.unresolved {
            let mut error = WellError {
                well: unresolved.external.clone(),
                reason: unresolved.reason,
                resolved: false,
                resolution: None,
            };
            if let Some(old) = previous.remove(&error.key()) {
                error.resolved = old.resolved;
                error.resolution = old.resolution;
            }
            self.well_errors.insert(error.key(), error);
        }
    }

    /// Operator override: assign `identifier` to `photo` without decoding.
    ///
    /// Replaces any record the photograph already has. Refuses an
    /// identifier that another photograph holds.
    pub fn force_identifier(&mut self, photo: PhotoPath, identifier: Identifier) -> Result<()> {
        if let Some(holder) = self.claims.get(&identifier) {
            if *holder != photo {
                return Err(Error::IdentifierClaimed { identifier, photo: holder.clone() });
            }
        }

        if let Some(old) = self.records.get(&photo) {
            self.claims.remove(&old.identifier);
        }

        info!(path = %photo, %identifier, "Identifier forced");
        self.claims.insert(identifier, photo.clone());
        self.records.insert(
            photo.clone(),
            IdentifierRecord { photo, identifier, forced: true },
        );
        Ok(())
    }

    /// Operator override: mark an error resolved with a free-text note.
    ///
    /// Only the error entry changes; records and photographs are untouched.
    pub fn resolve_error(&mut self, key: &ErrorKey, note: &str) -> Result<()> {
        let (resolved, resolution) = match key {
            ErrorKey::Photograph(photo) => self
                .errors
                .get_mut(photo)
                .map(|e| (&mut e.resolved, &mut e.resolution)),
            ErrorKey::PartnerWell { plate, well } => self
                .well_errors
                .get_mut(&(plate.clone(), *well))
                .map(|e| (&mut e.resolved, &mut e.resolution)),
        }
        .ok_or_else(|| Error::NotFound(format!("no error recorded for {}", key)))?;

        *resolved = true;
        *resolution = Some(note.to_string());
        info!(%key, note, "Error resolved");
        Ok(())
    }
}
