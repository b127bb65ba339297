//! Barcode decoding
//!
//! Specimen labels use QR codes. Decoding goes through the [`Decode`] trait
//! so the reader and batch ingestor can be driven by other backends.

use std::panic::{self, AssertUnwindSafe};

use image::GrayImage;
use rqrr::PreparedImage;

use crate::identifier::Identifier;

/// A barcode recognition primitive.
///
/// Implementations must be pure: no side effects, and any internal failure
/// (non-barcode pixels, truncated symbols, degenerate sizes) is `None`.
pub trait Decode: Send + Sync {
    fn decode(&self, image: &GrayImage) -> Option<Identifier>;
}

/// QR decoder backed by rqrr
#[derive(Debug, Clone, Copy, Default)]
pub struct QrDecoder;

impl Decode for QrDecoder {
    fn decode(&self, image: &GrayImage) -> Option<Identifier> {
        decode_texts(image)
            .iter()
            .find_map(|text| Identifier::parse(text.trim()))
    }
}

/// Every QR payload rqrr can read from `image`, in detection order.
pub fn decode_texts(image: &GrayImage) -> Vec<String> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Vec::new();
    }

    // rqrr has panicked on degenerate grids; keep that inside this call
    panic::catch_unwind(AssertUnwindSafe(|| {
        let mut prepared =
            PreparedImage::prepare_from_greyscale(width as usize, height as usize, |x, y| {
                image.get_pixel(x as u32, y as u32).0[0]
            });
        prepared
            .detect_grids()
            .into_iter()
            .filter_map(|grid| grid.decode().ok())
            .map(|(_, content)| content)
            .collect()
    }))
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::testing::render_qr;
    use image::Luma;

    #[test]
    fn test_decodes_uppercase_payload_as_lowercase() {
        let image = render_qr("8B6E0223-7FBE-4EFC-A1E2-6C934DA06685", 4);
        let id = QrDecoder.decode(&image).unwrap();
        assert_eq!(id.to_string(), "8b6e0223-7fbe-4efc-a1e2-6c934da06685");
    }

    #[test]
    fn test_payload_whitespace_is_trimmed() {
        let image = render_qr(" 8b6e0223-7fbe-4efc-a1e2-6c934da06685\n", 4);
        assert!(QrDecoder.decode(&image).is_some());
    }

    #[test]
    fn test_non_identifier_payload() {
        let image = render_qr("DOE-nitfix envelope 42", 4);
        assert_eq!(decode_texts(&image), vec!["DOE-nitfix envelope 42".to_string()]);
        assert_eq!(QrDecoder.decode(&image), None);
    }

    #[test]
    fn test_blank_image_has_no_identifier() {
        let image = GrayImage::from_pixel(120, 80, Luma([255]));
        assert_eq!(QrDecoder.decode(&image), None);
        assert!(decode_texts(&image).is_empty());
    }

    #[test]
    fn test_zero_sized_image() {
        let image = GrayImage::new(0, 0);
        assert_eq!(QrDecoder.decode(&image), None);
    }

    #[test]
    fn test_noise_does_not_panic() {
        let image = GrayImage::from_fn(257, 131, |x, y| {
            Luma([((x.wrapping_mul(31) ^ y.wrapping_mul(17)) % 256) as u8])
        });
        assert_eq!(QrDecoder.decode(&image), None);
    }

    #[test]
    fn test_checkerboard_does_not_panic() {
        let image = GrayImage::from_fn(64, 64, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 { Luma([0]) } else { Luma([255]) }
        });
        assert_eq!(QrDecoder.decode(&image), None);
    }
}
