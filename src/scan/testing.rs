//! QR fixtures for decoder and reader tests

use image::{imageops, GrayImage, Luma};
use qrcode::{Color, QrCode};

/// Render `payload` as a black-on-white QR symbol with a 4-module quiet zone
pub fn render_qr(payload: &str, module_px: u32) -> GrayImage {
    let code = QrCode::new(payload.as_bytes()).unwrap();
    let modules = code.width() as u32;
    let colors = code.to_colors();
    let quiet = 4;
    let side = (modules + 2 * quiet) * module_px;

    GrayImage::from_fn(side, side, |x, y| {
        let mx = (x / module_px) as i64 - quiet as i64;
        let my = (y / module_px) as i64 - quiet as i64;
        let inside = (0..modules as i64).contains(&mx) && (0..modules as i64).contains(&my);
        if inside && colors[(my as u32 * modules + mx as u32) as usize] == Color::Dark {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}

/// Paste `symbol` onto a white canvas with its top-left corner at (`left`, `top`)
pub fn on_canvas(symbol: &GrayImage, width: u32, height: u32, left: i64, top: i64) -> GrayImage {
    let mut canvas = GrayImage::from_pixel(width, height, Luma([255]));
    imageops::replace(&mut canvas, symbol, left, top);
    canvas
}
