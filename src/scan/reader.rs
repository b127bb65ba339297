//! Identifier reader
//!
//! Recovers the specimen identifier from one photograph by trying a fixed
//! cascade of strategies, cheapest and most likely first:
//!
//! 1. the whole image
//! 2. overlapping windows (small or off-centre barcodes)
//! 3. whole-image rotations (tilted envelopes)
//! 4. one sharpening pass (slight blur)
//!
//! Failing every strategy is a normal outcome (`Ok(None)`). Failing to
//! open the file at all is an error, so callers can tell the two apart.

use std::fmt;
use std::path::Path;

use image::GrayImage;
use tracing::debug;

use crate::config::ScanConfig;
use crate::error::{Error, Result};
use crate::identifier::Identifier;
use crate::scan::decoder::{Decode, QrDecoder};
use crate::scan::transform;
use crate::scan::window::{self, Dimensions};
use crate::state::data::Photograph;

/// The strategy that produced an identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Whole,
    Windowed,
    Rotated(u32),
    Sharpened,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Whole => f.write_str("whole"),
            Strategy::Windowed => f.write_str("windowed"),
            Strategy::Rotated(deg) => write!(f, "rotated {}°", deg),
            Strategy::Sharpened => f.write_str("sharpened"),
        }
    }
}

/// Runs the decode cascade with a pluggable barcode decoder
#[derive(Debug, Clone)]
pub struct IdentifierReader<D = QrDecoder> {
    decoder: D,
    settings: ScanConfig,
}

impl IdentifierReader<QrDecoder> {
    pub fn new(settings: ScanConfig) -> Self {
        IdentifierReader::with_decoder(QrDecoder, settings)
    }
}

impl<D: Decode> IdentifierReader<D> {
    pub fn with_decoder(decoder: D, settings: ScanConfig) -> Self {
        IdentifierReader { decoder, settings }
    }

    /// Load a photograph and run the cascade over it.
    ///
    /// # Returns
    /// * `Ok(Some(id))` - a strategy decoded a valid identifier
    /// * `Ok(None)` - the image loaded but no strategy found an identifier
    /// * `Err(Error::Image)` - the file could not be read as an image
    pub fn read(&self, photo: &Photograph) -> Result<Option<Identifier>> {
        let image = load_grayscale(&photo.source)?;
        let found = self.read_image(&image);
        match &found {
            Some((id, strategy)) => {
                debug!(path = %photo.key, identifier = %id, %strategy, "Identifier decoded");
            }
            None => debug!(path = %photo.key, "No identifier found"),
        }
        Ok(found.map(|(id, _)| id))
    }

    /// Run the cascade over already-loaded pixels
    pub fn read_image(&self, image: &GrayImage) -> Option<(Identifier, Strategy)> {
        if let Some(id) = self.decoder.decode(image) {
            return Some((id, Strategy::Whole));
        }

        if let Some(id) = self.decode_windows(image) {
            return Some((id, Strategy::Windowed));
        }

        for degrees in self.settings.rotations() {
            let rotated = transform::rotate(image, degrees as f32);
            if let Some(id) = self.decoder.decode(&rotated) {
                return Some((id, Strategy::Rotated(degrees)));
            }
        }

        let sharpened = transform::sharpen(image);
        self.decoder.decode(&sharpened).map(|id| (id, Strategy::Sharpened))
    }

    fn decode_windows(&self, image: &GrayImage) -> Option<Identifier> {
        let (width, height) = image.dimensions();
        window::slide(Dimensions::new(width, height), self.settings.window, self.settings.stride)
            .find_map(|rect| self.decoder.decode(&transform::crop(image, &rect)))
    }
}

/// Open an image file and convert it to 8-bit luminance
pub fn load_grayscale(path: &Path) -> Result<GrayImage> {
    let image = image::open(path).map_err(|source| Error::Image {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(image.to_luma8())
}
