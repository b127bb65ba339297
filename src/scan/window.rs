//! Sliding windows over a photograph
//!
//! A barcode that is small relative to the whole envelope photo is often
//! only found once the decoder is pointed at a neighbourhood around it.

use serde::{Deserialize, Serialize};

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Default search window
pub const DEFAULT_WINDOW: Dimensions = Dimensions::new(400, 400);

/// Default stride (50% overlap with the default window)
pub const DEFAULT_STRIDE: Dimensions = Dimensions::new(200, 200);

/// A crop box; `right` and `bottom` are exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Rect {
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }
}

/// Row-major iterator of windows covering an image.
///
/// Tiles start every `stride` pixels; a tile that would run past the image
/// edge is shrunk to the edge. Clone before iterating (or call [`slide`]
/// again) for a second pass over the same tiles.
#[derive(Debug, Clone)]
pub struct WindowSlider {
    size: Dimensions,
    window: Dimensions,
    stride: Dimensions,
    top: u32,
    left: u32,
}

/// Windows over an image of `size`, top-to-bottom then left-to-right.
///
/// Zero stride components are treated as 1 so the sequence stays finite.
pub fn slide(size: Dimensions, window: Dimensions, stride: Dimensions) -> WindowSlider {
    WindowSlider {
        size,
        window,
        stride: Dimensions::new(stride.width.max(1), stride.height.max(1)),
        top: 0,
        left: 0,
    }
}

impl Iterator for WindowSlider {
    type Item = Rect;

    fn next(&mut self) -> Option<Rect> {
        if self.size.width == 0 || self.top >= self.size.height {
            return None;
        }

        let rect = Rect {
            left: self.left,
            top: self.top,
            right: self.left.saturating_add(self.window.width).min(self.size.width),
            bottom: self.top.saturating_add(self.window.height).min(self.size.height),
        };

        self.left = self.left.saturating_add(self.stride.width);
        if self.left >= self.size.width {
            self.left = 0;
            self.top = self.top.saturating_add(self.stride.height);
        }

        Some(rect)
    }
}
