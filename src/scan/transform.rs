//! Pixel transforms used by the fallback decode strategies

use image::{imageops, GrayImage, Luma};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};

/// Classic 3x3 sharpen kernel (centre 32, neighbours -2, normalised by its sum of 16)
const SHARPEN_KERNEL: [f32; 9] = [
    -2.0, -2.0, -2.0,
    -2.0, 32.0, -2.0,
    -2.0, -2.0, -2.0,
];

/// Rotate counter-clockwise by `degrees` about the image centre.
///
/// Output keeps the input size; corners rotated in from outside are black.
/// Nearest-neighbour sampling keeps module edges hard for the decoder.
pub fn rotate(image: &GrayImage, degrees: f32) -> GrayImage {
    // imageproc turns clockwise for positive angles
    rotate_about_center(image, -degrees.to_radians(), Interpolation::Nearest, Luma([0]))
}

/// Single pass of the sharpen kernel
pub fn sharpen(image: &GrayImage) -> GrayImage {
    imageops::filter3x3(image, &SHARPEN_KERNEL)
}

/// Copy of the pixels inside `rect`
pub fn crop(image: &GrayImage, rect: &crate::scan::window::Rect) -> GrayImage {
    imageops::crop_imm(image, rect.left, rect.top, rect.width(), rect.height()).to_image()
}
