// Software rasterization on a FrameBuffer: pixels, lines, discs, rings.
// Live strokes and ledger replay both go through `stroke_segment`, so the
// same input always produces the same pixels.

use crate::types::{FrameBuffer, PixelPoint};

/// Put a pixel on the framebuffer if (x,y) is inside bounds.
#[inline]
pub fn put_pixel(fb: &mut FrameBuffer, x: i32, y: i32, color: u32) {
    if x < 0 || y < 0 {
        return;
    }
    let (x, y) = (x as usize, y as usize);
    if x >= fb.width || y >= fb.height {
        return;
    }
    let idx = y * fb.width + x;
    fb.pixels[idx] = color;
}

/// Walk the Bresenham line from `a` to `b` (both ends included).
/// Runs in i64 so far-apart endpoints cannot overflow; every visited point
/// lies between `a` and `b` and so fits back in i32.
fn for_each_line_point(a: PixelPoint, b: PixelPoint, mut visit: impl FnMut(i32, i32)) {
    let (mut x0, mut y0) = (i64::from(a.x), i64::from(a.y));
    let (x1, y1) = (i64::from(b.x), i64::from(b.y));
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        visit(x0 as i32, y0 as i32);
        if x0 == x1 && y0 == y1 { break; }
        let e2 = 2 * err;
        if e2 >= dy { err += dy; x0 += sx; }
        if e2 <= dx { err += dx; y0 += sy; }
    }
}

/// Thin 1-pixel line between two points.
pub fn draw_line(fb: &mut FrameBuffer, a: PixelPoint, b: PixelPoint, color: u32) {
    for_each_line_point(a, b, |x, y| put_pixel(fb, x, y, color));
}

/// Solid disc: every pixel whose center lies within `radius` of (cx, cy).
/// Only the part overlapping the buffer is visited.
pub fn fill_disc(fb: &mut FrameBuffer, cx: i32, cy: i32, radius: i32, color: u32) {
    if radius <= 0 {
        put_pixel(fb, cx, cy, color);
        return;
    }
    let (cx, cy, r) = (i64::from(cx), i64::from(cy), i64::from(radius));
    let x_lo = (cx - r).max(0);
    let x_hi = (cx + r).min(fb.width as i64 - 1);
    let y_lo = (cy - r).max(0);
    let y_hi = (cy + r).min(fb.height as i64 - 1);
    // |dx|, |dy| <= r < 2^31 inside these ranges, so the sums fit in i64.
    let r2 = r * r;
    for y in y_lo..=y_hi {
        let dy = y - cy;
        for x in x_lo..=x_hi {
            let dx = x - cx;
            if dx * dx + dy * dy <= r2 {
                fb.pixels[y as usize * fb.width + x as usize] = color;
            }
        }
    }
}

/// Circle outline `thickness` pixels wide, centered on `radius`.
pub fn draw_ring(fb: &mut FrameBuffer, cx: i32, cy: i32, radius: i32, thickness: i32, color: u32) {
    let half = thickness.max(1) as f32 / 2.0;
    let inner = (radius as f32 - half).max(0.0);
    let outer = radius as f32 + half;
    let (inner2, outer2) = (inner * inner, outer * outer);
    let reach = outer.ceil() as i32;
    for y in (cy - reach)..=(cy + reach) {
        let dy = (y - cy) as f32;
        for x in (cx - reach)..=(cx + reach) {
            let dx = (x - cx) as f32;
            let d2 = dx * dx + dy * dy;
            if d2 >= inner2 && d2 <= outer2 {
                put_pixel(fb, x, y, color);
            }
        }
    }
}

/// A round-capped segment `thickness` pixels wide. A zero-length segment
/// (a == b) stamps a single disc.
pub fn stroke_segment(fb: &mut FrameBuffer, a: PixelPoint, b: PixelPoint, thickness: u32, color: u32) {
    let radius = (thickness / 2) as i32;
    for_each_line_point(a, b, |x, y| fill_disc(fb, x, y, radius, color));
}

/// Small "+" centered at (cx,cy), arms `size` pixels long.
pub fn draw_crosshair(fb: &mut FrameBuffer, cx: i32, cy: i32, size: i32, color: u32) {
    draw_line(fb, PixelPoint::new(cx - size, cy), PixelPoint::new(cx + size, cy), color);
    draw_line(fb, PixelPoint::new(cx, cy - size), PixelPoint::new(cx, cy + size), color);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Rgb;

    fn blank(w: usize, h: usize) -> FrameBuffer {
        FrameBuffer::filled(w, h, Rgb::WHITE)
    }

    fn count(fb: &FrameBuffer, color: u32) -> usize {
        fb.pixels.iter().filter(|&&p| p == color).count()
    }

    #[test]
    fn out_of_bounds_pixels_are_ignored() {
        let mut fb = blank(4, 4);
        put_pixel(&mut fb, -1, 0, 0);
        put_pixel(&mut fb, 4, 0, 0);
        put_pixel(&mut fb, 0, 4, 0);
        assert_eq!(count(&fb, 0), 0);
    }

    #[test]
    fn thin_line_covers_both_endpoints() {
        let mut fb = blank(10, 10);
        draw_line(&mut fb, PixelPoint::new(1, 1), PixelPoint::new(8, 5), 0);
        assert_eq!(fb.rgb_at(1, 1), Some(Rgb::BLACK));
        assert_eq!(fb.rgb_at(8, 5), Some(Rgb::BLACK));
        // One pixel per step along the major axis.
        assert_eq!(count(&fb, 0), 8);
    }

    #[test]
    fn zero_length_segment_is_a_disc() {
        let mut a = blank(30, 30);
        let mut b = blank(30, 30);
        stroke_segment(&mut a, PixelPoint::new(15, 15), PixelPoint::new(15, 15), 10, 0);
        fill_disc(&mut b, 15, 15, 5, 0);
        assert_eq!(a, b);
        assert_eq!(a.rgb_at(20, 15), Some(Rgb::BLACK));
        assert_eq!(a.rgb_at(21, 15), Some(Rgb::WHITE));
    }

    #[test]
    fn thick_segment_is_wider_than_thin() {
        let mut fb = blank(40, 40);
        stroke_segment(&mut fb, PixelPoint::new(5, 20), PixelPoint::new(35, 20), 6, 0);
        assert_eq!(fb.rgb_at(20, 17), Some(Rgb::BLACK));
        assert_eq!(fb.rgb_at(20, 23), Some(Rgb::BLACK));
        assert_eq!(fb.rgb_at(20, 24), Some(Rgb::WHITE));
    }

    #[test]
    fn huge_disc_is_clipped_to_the_buffer() {
        let mut fb = blank(8, 6);
        stroke_segment(&mut fb, PixelPoint::new(3, 3), PixelPoint::new(3, 3), u32::MAX, 0);
        assert_eq!(count(&fb, 0), 8 * 6);
    }

    #[test]
    fn extreme_coordinates_stay_off_canvas() {
        let mut fb = blank(8, 6);
        let far = PixelPoint::new(i32::MIN, i32::MAX - 3);
        let farther = PixelPoint::new(i32::MIN + 3, i32::MAX);
        stroke_segment(&mut fb, far, farther, 40, 0);
        fill_disc(&mut fb, i32::MAX, i32::MIN, i32::MAX, 0);
        assert_eq!(count(&fb, 0), 0);
    }

    #[test]
    fn ring_leaves_center_untouched() {
        let mut fb = blank(40, 40);
        draw_ring(&mut fb, 20, 20, 10, 2, 0);
        assert_eq!(fb.rgb_at(20, 20), Some(Rgb::WHITE));
        assert_eq!(fb.rgb_at(30, 20), Some(Rgb::BLACK));
    }
}
