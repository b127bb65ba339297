//! Specimen identifier ledger
//!
//! Recovers specimen identifiers from photographs of collection envelopes
//! and reconciles partner-reported plate wells back to the canonical plate
//! registry.

pub mod config;
pub mod error;
pub mod identifier;
pub mod ingest;
pub mod plate;
pub mod scan;
pub mod state;

pub use config::Config;
pub use error::{Error, Result};
pub use identifier::{is_valid_identifier, Identifier};
pub use ingest::batch::{AlreadySeen, BatchIngestor, IngestReport};
pub use ingest::scanner::scan_photo_dirs;
pub use plate::reconcile::{
    reconcile, MatchMethod, Reconciliation, ResolvedWell, UnresolvedReason, UnresolvedWell,
};
pub use plate::well::{PartnerWell, PlateWell, WellAddress};
pub use scan::reader::IdentifierReader;
pub use state::data::{IdentifierRecord, PhotoPath, Photograph};
pub use state::ledger::{ErrorCode, ErrorKey, IngestError, Ledger, WellError};
pub use state::library::Catalog;
