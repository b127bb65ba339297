//! Plate reconciliation
//!
//! This module handles:
//! - Well addressing for canonical and partner plates (well.rs)
//! - Order-independent row fingerprints (fingerprint.rs)
//! - Mapping partner wells back onto canonical plates (reconcile.rs)

pub mod fingerprint;
pub mod reconcile;
pub mod well;
