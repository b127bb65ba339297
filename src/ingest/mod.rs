//! Photograph ingestion: discovery and parallel batch decoding

pub mod batch;
pub mod scanner;
