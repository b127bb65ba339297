//! Barcode scanning
//!
//! This module handles:
//! - Tiling photographs into overlapping search windows
//! - Decoding QR barcodes into specimen identifiers
//! - Rotating and sharpening photographs for fallback attempts
//! - Running the decode cascade over one photograph

pub mod decoder;
pub mod reader;
pub mod transform;
pub mod window;

#[cfg(test)]
pub(crate) mod testing;
