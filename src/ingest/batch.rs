//! Batch ingestion of photographs
//!
//! Photographs are split into fixed-size chunks. Each chunk is decoded
//! sequentially on a blocking worker; chunks run in parallel and return
//! plain values. Duplicate identifiers are settled afterwards in a single
//! merge pass, so the outcome does not depend on which worker finished
//! first.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::identifier::Identifier;
use crate::scan::decoder::{Decode, QrDecoder};
use crate::scan::reader::IdentifierReader;
use crate::state::data::{IdentifierRecord, PhotoPath, Photograph};
use crate::state::ledger::IngestError;

/// Photographs a run must skip and identifiers it may not claim
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlreadySeen {
    paths: BTreeSet<PhotoPath>,
    claimed: BTreeMap<Identifier, PhotoPath>,
}

impl AlreadySeen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_path(&mut self, photo: PhotoPath) {
        self.paths.insert(photo);
    }

    /// Record an identifier accepted by an earlier run
    pub fn claim(&mut self, identifier: Identifier, photo: PhotoPath) {
        self.paths.insert(photo.clone());
        self.claimed.insert(identifier, photo);
    }

    pub fn contains(&self, photo: &PhotoPath) -> bool {
        self.paths.contains(photo)
    }

    pub fn claimant(&self, identifier: &Identifier) -> Option<&PhotoPath> {
        self.claimed.get(identifier)
    }

    /// Add everything a finished run touched
    pub fn extend_from(&mut self, report: &IngestReport) {
        for record in &report.accepted {
            self.claim(record.identifier, record.photo.clone());
        }
        for error in &report.errors {
            self.insert_path(error.photo.clone());
        }
    }
}

/// Outcome of one ingest run, both lists sorted by photograph key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub accepted: Vec<IdentifierRecord>,
    pub errors: Vec<IngestError>,
}

/// What one worker hands back for its chunk
#[derive(Debug, Default)]
struct ChunkOutcome {
    decoded: Vec<(PhotoPath, Identifier)>,
    errors: Vec<IngestError>,
}

pub struct BatchIngestor<D = QrDecoder> {
    reader: Arc<IdentifierReader<D>>,
    chunk_size: usize,
    workers: usize,
}

impl<D: Decode + 'static> BatchIngestor<D> {
    pub fn new(reader: IdentifierReader<D>, settings: &IngestConfig) -> Self {
        BatchIngestor {
            reader: Arc::new(reader),
            chunk_size: settings.chunk_size.max(1),
            workers: settings.workers.max(1),
        }
    }

    /// Decode every photograph not in `seen` and settle duplicates.
    ///
    /// Per-photograph problems become entries in `errors`; an `Err` means a
    /// worker died and the run should be abandoned.
    pub async fn ingest(
        &self,
        photos: Vec<Photograph>,
        seen: &AlreadySeen,
    ) -> Result<IngestReport> {
        let total = photos.len();
        let mut pending: Vec<Photograph> =
            photos.into_iter().filter(|p| !seen.contains(&p.key)).collect();
        pending.sort_by(|a, b| a.key.cmp(&b.key));
        pending.dedup_by(|a, b| a.key == b.key);

        info!(
            total,
            skipped = total - pending.len(),
            to_process = pending.len(),
            chunk_size = self.chunk_size,
            workers = self.workers,
            "Starting identifier ingest"
        );

        let chunks: Vec<Vec<Photograph>> =
            pending.chunks(self.chunk_size).map(<[Photograph]>::to_vec).collect();
        let chunk_count = chunks.len();

        let outcomes: Vec<std::result::Result<ChunkOutcome, JoinError>> = stream::iter(chunks)
            .enumerate()
            .map(|(index, chunk)| {
                let reader = Arc::clone(&self.reader);
                // Decoding is CPU-bound, keep it off the async workers
                tokio::task::spawn_blocking(move || {
                    let outcome = process_chunk(&reader, &chunk);
                    debug!(
                        chunk = index + 1,
                        of = chunk_count,
                        photos = chunk.len(),
                        "Chunk finished"
                    );
                    outcome
                })
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let mut finished = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            finished.push(outcome.map_err(Error::Worker)?);
        }

        let report = merge(finished, seen);
        info!(
            accepted = report.accepted.len(),
            errors = report.errors.len(),
            "Identifier ingest complete"
        );
        Ok(report)
    }
}

/// Decode one chunk in order. Never fails: every problem is an error entry.
fn process_chunk<D: Decode>(reader: &IdentifierReader<D>, chunk: &[Photograph]) -> ChunkOutcome {
    let mut outcome = ChunkOutcome::default();
    for photo in chunk {
        match reader.read(photo) {
            Ok(Some(identifier)) => outcome.decoded.push((photo.key.clone(), identifier)),
            Ok(None) => outcome.errors.push(IngestError::missing(photo.key.clone())),
            Err(err) => {
                warn!(path = %photo.key, error = %err, "Unreadable photograph");
                outcome.errors.push(IngestError::unreadable(photo.key.clone(), err.to_string()));
            }
        }
    }
    outcome
}

/// Single-threaded duplicate resolution over all chunks.
///
/// Claims from earlier runs win; within this run the lexicographically
/// first photograph keeps the identifier.
fn merge(outcomes: Vec<ChunkOutcome>, seen: &AlreadySeen) -> IngestReport {
    let mut decoded = Vec::new();
    let mut report = IngestReport::default();
    for outcome in outcomes {
        decoded.extend(outcome.decoded);
        report.errors.extend(outcome.errors);
    }
    decoded.sort_by(|a, b| a.0.cmp(&b.0));

    let mut claimed: BTreeMap<Identifier, PhotoPath> = BTreeMap::new();
    for (photo, identifier) in decoded {
        let prior = seen.claimant(&identifier).or_else(|| claimed.get(&identifier));
        match prior {
            Some(prior) => {
                let error = IngestError::duplicate(photo, identifier, prior.clone());
                warn!("{}", error);
                report.errors.push(error);
            }
            None => {
                claimed.insert(identifier, photo.clone());
                report.accepted.push(IdentifierRecord::decoded(photo, identifier));
            }
        }
    }

    report.errors.sort_by(|a, b| a.photo.cmp(&b.photo));
    report
}
