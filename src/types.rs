// Core value types shared by the canvas, the ledger and the window.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBuffer {
    pub width: usize,      // how wide the frame is on screen (pixels)
    pub height: usize,     // how tall the frame is on screen (pixels)
    pub pixels: Vec<u32>,  // each entry is 0x00RRGGBB for minifb
}

impl FrameBuffer {
    /// A buffer where every pixel is `color`.
    pub fn filled(width: usize, height: usize, color: Rgb) -> Self {
        Self { width, height, pixels: vec![color.packed(); width * height] }
    }

    /// Read one pixel back as RGB. Out-of-bounds reads return `None`.
    #[cfg(test)]
    pub fn rgb_at(&self, x: usize, y: usize) -> Option<Rgb> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(Rgb::from_packed(self.pixels[y * self.width + x]))
    }

    /// Overwrite every pixel with `color` without reallocating.
    pub fn fill(&mut self, color: Rgb) {
        let packed = color.packed();
        for p in &mut self.pixels { *p = packed; }
    }
}

/// 8-bit RGB color. Serialized as `[r, g, b]` in the ledger and settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u8; 3]", into = "[u8; 3]")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Pack as 0x00RRGGBB (the window's native pixel layout).
    #[inline]
    pub const fn packed(self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }

    #[inline]
    pub const fn from_packed(px: u32) -> Self {
        Self::new(((px >> 16) & 0xFF) as u8, ((px >> 8) & 0xFF) as u8, (px & 0xFF) as u8)
    }
}

impl From<[u8; 3]> for Rgb {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self::new(r, g, b)
    }
}

impl From<Rgb> for [u8; 3] {
    fn from(c: Rgb) -> Self {
        [c.r, c.g, c.b]
    }
}

/// A point in canvas pixel space. Serialized as `[x, y]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct PixelPoint {
    pub x: i32,
    pub y: i32,
}

impl PixelPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<[i32; 2]> for PixelPoint {
    fn from([x, y]: [i32; 2]) -> Self {
        Self::new(x, y)
    }
}

impl From<PixelPoint> for [i32; 2] {
    fn from(p: PixelPoint) -> Self {
        [p.x, p.y]
    }
}

/// A point in normalized image space, both axes nominally in [0, 1],
/// origin top-left.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct NormPoint {
    pub x: f32,
    pub y: f32,
}

impl NormPoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Scale into a `width`×`height` pixel grid, truncating toward zero.
    pub fn denormalize(self, width: usize, height: usize) -> PixelPoint {
        PixelPoint::new((self.x * width as f32) as i32, (self.y * height as f32) as i32)
    }

    pub fn midpoint(self, other: NormPoint) -> NormPoint {
        NormPoint::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    pub fn offset(self, dx: f32, dy: f32) -> NormPoint {
        NormPoint::new(self.x + dx, self.y + dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing_matches_window_layout() {
        let c = Rgb::new(0x12, 0x34, 0x56);
        assert_eq!(c.packed(), 0x00_12_34_56);
        assert_eq!(Rgb::from_packed(0x00_12_34_56), c);
    }

    #[test]
    fn denormalize_truncates() {
        let p = NormPoint::new(0.999, 0.5).denormalize(640, 480);
        assert_eq!(p, PixelPoint::new(639, 240));
    }

    #[test]
    fn colors_and_points_serialize_as_arrays() {
        assert_eq!(serde_json::to_string(&Rgb::new(1, 2, 3)).unwrap(), "[1,2,3]");
        assert_eq!(serde_json::to_string(&PixelPoint::new(-4, 9)).unwrap(), "[-4,9]");
        let back: PixelPoint = serde_json::from_str("[7,8]").unwrap();
        assert_eq!(back, PixelPoint::new(7, 8));
    }
}
