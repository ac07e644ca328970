/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Viewport rectangles and intrinsic resolutions.

use serde::{Deserialize, Serialize};

/// A rectangle in CSS pixels, viewport coordinates, as reported by
/// `getBoundingClientRect()`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(top: f64, left: f64, width: f64, height: f64) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// CSS property/value pairs that place an element exactly over this rect.
    pub fn css_properties(&self) -> [(&'static str, String); 4] {
        [
            ("top", px(self.top)),
            ("left", px(self.left)),
            ("width", px(self.width)),
            ("height", px(self.height)),
        ]
    }

    /// Maps `self`, given in intrinsic frame pixels, into the local coordinate
    /// space of a box of `display` size that shows the whole frame stretched
    /// to fit. The result is relative to the box's own top-left corner.
    pub fn map_from_intrinsic(&self, intrinsic: Resolution, display: &Rect) -> Rect {
        if intrinsic.is_empty() {
            return Rect::default();
        }
        let sx = display.width / intrinsic.width as f64;
        let sy = display.height / intrinsic.height as f64;
        Rect {
            top: self.top * sy,
            left: self.left * sx,
            width: self.width * sx,
            height: self.height * sy,
        }
    }
}

fn px(v: f64) -> String {
    format!("{v}px")
}

/// Native pixel size of the media, independent of how large it is displayed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Media elements report 0x0 until their metadata has loaded.
    pub fn from_intrinsic(width: u32, height: u32) -> Option<Self> {
        let resolution = Self::new(width, height);
        (!resolution.is_empty()).then_some(resolution)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
