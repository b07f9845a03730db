// The persistent raster canvas.
//
// Pixels are only ever changed by `paint`, and every call that paints during
// live input also appends the same segment to the ledger. Undo pops the
// newest entry and rebuilds the buffer by replaying the rest through `paint`,
// so live and replayed strokes cannot drift apart.

use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::ledger::{ActionKind, ActionLedger, NewStroke, StrokeAction};
use crate::raster::{draw_crosshair, draw_ring, fill_disc, stroke_segment};
use crate::types::{FrameBuffer, NormPoint, PixelPoint, Rgb};

pub const DEFAULT_BRUSH_WIDTH: u32 = 10;
/// Eraser is this much wider than the pen.
pub const ERASER_EXTRA_WIDTH: u32 = 10;
pub const MIN_BRUSH_WIDTH: u32 = 1;
pub const MAX_BRUSH_WIDTH: u32 = 60;

const CURSOR_DOT_RADIUS: i32 = 5;
const CURSOR_RING_BASE: i32 = 8;
const CURSOR_CROSSHAIR: i32 = 8;
const CURSOR_DOT_COLOR: Rgb = Rgb::new(255, 120, 0);
const CURSOR_RING_COLOR: Rgb = Rgb::new(255, 165, 0);

/// Rasterize one segment. Erasing always paints white.
fn paint(fb: &mut FrameBuffer, kind: ActionKind, a: PixelPoint, b: PixelPoint, color: Rgb, width: u32) {
    let color = match kind {
        ActionKind::Draw => color,
        ActionKind::Erase => Rgb::WHITE,
    };
    stroke_segment(fb, a, b, width, color.packed());
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Brush {
    pub color: Rgb,
    pub width: u32,
}

impl Brush {
    pub fn eraser_width(&self) -> u32 {
        self.width + ERASER_EXTRA_WIDTH
    }

    fn width_for(&self, kind: ActionKind) -> u32 {
        match kind {
            ActionKind::Draw => self.width,
            ActionKind::Erase => self.eraser_width(),
        }
    }
}

impl Default for Brush {
    fn default() -> Self {
        Self { color: Rgb::BLACK, width: DEFAULT_BRUSH_WIDTH }
    }
}

/// Breathing outer ring of the cursor: bounces between 0 and 10 in 0.5 steps.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CursorPulse {
    value: f32,
    direction: f32,
}

impl CursorPulse {
    const STEP: f32 = 0.5;
    const MAX: f32 = 10.0;

    pub fn new() -> Self {
        Self { value: 0.0, direction: 1.0 }
    }

    /// Step once and return the new value.
    pub fn advance(&mut self) -> f32 {
        self.value += Self::STEP * self.direction;
        if self.value >= Self::MAX || self.value <= 0.0 {
            self.direction = -self.direction;
        }
        self.value
    }
}

impl Default for CursorPulse {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RasterCanvas {
    pixels: FrameBuffer,
    brush: Brush,
    last_draw: Option<PixelPoint>,
    last_erase: Option<PixelPoint>,
    cursor: PixelPoint,
    pulse: CursorPulse,
    ledger: ActionLedger,
}

impl RasterCanvas {
    /// A `width`×`height` canvas showing whatever `ledger` already holds.
    pub fn new(width: usize, height: usize, ledger: ActionLedger) -> Self {
        Self::with_brush(width, height, ledger, Brush::default())
    }

    /// Like `new`, but `brush` is in place before the ledger is replayed,
    /// so records without a stored width come back at that brush's width.
    pub fn with_brush(width: usize, height: usize, ledger: ActionLedger, brush: Brush) -> Self {
        let brush = Brush { width: brush.width.clamp(MIN_BRUSH_WIDTH, MAX_BRUSH_WIDTH), ..brush };
        let mut canvas = Self {
            pixels: FrameBuffer::filled(width, height, Rgb::WHITE),
            brush,
            last_draw: None,
            last_erase: None,
            cursor: PixelPoint::new(width as i32 / 2, height as i32 / 2),
            pulse: CursorPulse::new(),
            ledger,
        };
        if !canvas.ledger.is_empty() {
            canvas.reconstruct();
        }
        canvas
    }

    pub fn width(&self) -> usize {
        self.pixels.width
    }

    pub fn height(&self) -> usize {
        self.pixels.height
    }

    pub fn brush(&self) -> Brush {
        self.brush
    }

    pub fn ledger(&self) -> &ActionLedger {
        &self.ledger
    }

    /// Read-only view of the stored pixels.
    pub fn pixels(&self) -> &FrameBuffer {
        &self.pixels
    }

    /// Input a little outside [0, 1] is kept as is (edge dabs); anything
    /// wilder is pulled back so logged points stay replayable.
    fn to_pixel(&self, p: NormPoint) -> PixelPoint {
        NormPoint::new(p.x.clamp(-1.0, 2.0), p.y.clamp(-1.0, 2.0)).denormalize(self.pixels.width, self.pixels.height)
    }

    /// Paint a segment with the current brush and log it.
    fn stroke(&mut self, kind: ActionKind, from: PixelPoint, to: PixelPoint) {
        let width = self.brush.width_for(kind);
        paint(&mut self.pixels, kind, from, to, self.brush.color, width);
        let color = match kind {
            ActionKind::Draw => self.brush.color,
            ActionKind::Erase => Rgb::WHITE,
        };
        self.ledger.append(NewStroke { kind, from, to, color, width });
    }

    /// Extend the pen stroke to `p`. The first sample after a reset only
    /// anchors the stroke; a sample equal to the last one is ignored.
    pub fn draw(&mut self, p: NormPoint) {
        let current = self.to_pixel(p);
        match self.last_draw {
            None => self.last_draw = Some(current),
            Some(last) if last == current => {}
            Some(last) => {
                self.stroke(ActionKind::Draw, last, current);
                self.last_draw = Some(current);
            }
        }
    }

    /// Extend the eraser stroke to `p`. The first sample after a reset stamps
    /// an eraser-sized dab; a sample equal to the last one is ignored.
    pub fn erase(&mut self, p: NormPoint) {
        let current = self.to_pixel(p);
        match self.last_erase {
            None => {
                self.stroke(ActionKind::Erase, current, current);
                self.last_erase = Some(current);
            }
            Some(last) if last == current => {}
            Some(last) => {
                self.stroke(ActionKind::Erase, last, current);
                self.last_erase = Some(current);
            }
        }
    }

    /// End both strokes; the next draw/erase starts fresh.
    pub fn reset_pointers(&mut self) {
        self.last_draw = None;
        self.last_erase = None;
    }

    pub fn change_color(&mut self, color: Rgb) {
        self.brush.color = color;
    }

    pub fn change_brush_width(&mut self, width: u32) {
        self.brush.width = width.clamp(MIN_BRUSH_WIDTH, MAX_BRUSH_WIDTH);
    }

    /// Wipe pixels and history. Not undoable.
    pub fn clear(&mut self) {
        self.pixels.fill(Rgb::WHITE);
        self.ledger.clear();
        self.reset_pointers();
    }

    /// Drop the newest action and rebuild. Returns false on an empty ledger.
    pub fn undo(&mut self) -> bool {
        match self.ledger.remove_most_recent() {
            Some(action) => {
                log::debug!("Undo {:?} #{}", action.kind, action.id);
                self.reconstruct();
                true
            }
            None => false,
        }
    }

    /// Repaint from white by replaying every ledger entry in order.
    pub fn reconstruct(&mut self) {
        self.pixels.fill(Rgb::WHITE);
        self.reset_pointers();
        let brush = self.brush;
        for action in self.ledger.all_in_order() {
            replay(&mut self.pixels, action, brush);
        }
    }

    pub fn set_cursor(&mut self, p: NormPoint) {
        self.cursor = self.to_pixel(p);
    }

    /// A copy of the canvas with the cursor glyph on top. Advances the pulse;
    /// never touches the stored pixels or the ledger.
    pub fn render_with_cursor(&mut self) -> FrameBuffer {
        let pulse = self.pulse.advance();
        let mut out = self.pixels.clone();
        let PixelPoint { x, y } = self.cursor;
        fill_disc(&mut out, x, y, CURSOR_DOT_RADIUS, CURSOR_DOT_COLOR.packed());
        draw_ring(&mut out, x, y, CURSOR_RING_BASE + pulse as i32, 2, CURSOR_RING_COLOR.packed());
        draw_crosshair(&mut out, x, y, CURSOR_CROSSHAIR, CURSOR_RING_COLOR.packed());
        out
    }

    /// Write the canvas as a PNG (or whatever `path`'s extension names) at
    /// native resolution.
    pub fn save(&self, path: &Path) -> Result<PathBuf, Error> {
        let fb = self.pixels();
        let img = image::RgbImage::from_fn(fb.width as u32, fb.height as u32, |x, y| {
            let c = Rgb::from_packed(fb.pixels[y as usize * fb.width + x as usize]);
            image::Rgb([c.r, c.g, c.b])
        });
        img.save(path).map_err(|source| Error::Export { path: path.to_path_buf(), source })?;
        log::info!("Saved canvas to {path:?}");
        Ok(path.to_path_buf())
    }
}

/// Paint one logged action. Records without a stored width use `brush`.
fn replay(fb: &mut FrameBuffer, action: &StrokeAction, brush: Brush) {
    let [a, b] = action.points;
    let width = action.width.unwrap_or_else(|| brush.width_for(action.kind));
    let color = action.color.unwrap_or(Rgb::WHITE);
    paint(fb, action.kind, a, b, color, width);
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: usize = 64;
    const H: usize = 48;

    fn canvas() -> RasterCanvas {
        RasterCanvas::new(W, H, ActionLedger::in_memory())
    }

    fn np(x: f32, y: f32) -> NormPoint {
        NormPoint::new(x, y)
    }

    fn replayed(source: &RasterCanvas) -> FrameBuffer {
        let text = source.ledger().to_jsonl().unwrap();
        RasterCanvas::new(W, H, ActionLedger::from_jsonl(&text)).pixels().clone()
    }

    fn is_blank(fb: &FrameBuffer) -> bool {
        fb.pixels.iter().all(|&p| p == Rgb::WHITE.packed())
    }

    #[test]
    fn n_distinct_draws_log_n_minus_one_segments() {
        let mut c = canvas();
        let pts = [np(0.1, 0.1), np(0.2, 0.3), np(0.5, 0.5), np(0.7, 0.2), np(0.9, 0.9)];
        for p in pts {
            c.draw(p);
        }
        assert_eq!(c.ledger().len(), pts.len() - 1);
        assert!(c.ledger().all_in_order().iter().all(|a| a.kind == ActionKind::Draw));
    }

    #[test]
    fn first_draw_only_anchors() {
        let mut c = canvas();
        c.draw(np(0.5, 0.5));
        assert!(c.ledger().is_empty());
        assert!(is_blank(c.pixels()));
    }

    #[test]
    fn stationary_pen_does_not_spam_ledger() {
        let mut c = canvas();
        c.draw(np(0.1, 0.1));
        c.draw(np(0.4, 0.4));
        let before = c.ledger().len();
        c.reset_pointers();
        c.draw(np(0.6, 0.6));
        c.draw(np(0.6, 0.6));
        assert_eq!(c.ledger().len(), before);
    }

    #[test]
    fn draw_logs_denormalized_endpoints_and_color() {
        let mut c = canvas();
        c.change_color(Rgb::new(200, 10, 10));
        c.draw(np(0.25, 0.5));
        c.draw(np(0.5, 0.5));
        let a = &c.ledger().all_in_order()[0];
        assert_eq!(a.points, [PixelPoint::new(16, 24), PixelPoint::new(32, 24)]);
        assert_eq!(a.color, Some(Rgb::new(200, 10, 10)));
        assert_eq!(a.width, Some(DEFAULT_BRUSH_WIDTH));
        assert_eq!(c.pixels().rgb_at(24, 24), Some(Rgb::new(200, 10, 10)));
    }

    #[test]
    fn first_erase_stamps_and_logs_a_dab() {
        let mut c = canvas();
        c.draw(np(0.1, 0.5));
        c.draw(np(0.9, 0.5));
        c.reset_pointers();
        c.erase(np(0.5, 0.5));
        let last = c.ledger().all_in_order().last().unwrap().clone();
        assert_eq!(last.kind, ActionKind::Erase);
        assert_eq!(last.points[0], last.points[1]);
        assert_eq!(c.pixels().rgb_at(32, 24), Some(Rgb::WHITE));
    }

    #[test]
    fn stationary_eraser_is_a_no_op() {
        let mut c = canvas();
        c.erase(np(0.5, 0.5));
        c.erase(np(0.5, 0.5));
        c.erase(np(0.5, 0.5));
        assert_eq!(c.ledger().len(), 1);
        c.erase(np(0.6, 0.5));
        assert_eq!(c.ledger().len(), 2);
    }

    #[test]
    fn pen_and_eraser_track_separate_anchors() {
        let mut c = canvas();
        c.draw(np(0.1, 0.1));
        c.erase(np(0.8, 0.8));
        c.draw(np(0.2, 0.1));
        let draws: Vec<_> = c
            .ledger()
            .all_in_order()
            .iter()
            .filter(|a| a.kind == ActionKind::Draw)
            .map(|a| a.points)
            .collect();
        assert_eq!(draws, vec![[PixelPoint::new(6, 4), PixelPoint::new(12, 4)]]);
    }

    #[test]
    fn undo_peels_one_action_at_a_time() {
        let mut c = canvas();
        c.draw(np(0.1, 0.1));
        c.draw(np(0.5, 0.2));
        c.draw(np(0.6, 0.8));
        c.reset_pointers();
        c.erase(np(0.5, 0.2));
        c.erase(np(0.3, 0.3));
        c.change_color(Rgb::new(0, 0, 255));
        c.reset_pointers();
        c.draw(np(0.9, 0.9));
        c.draw(np(0.1, 0.9));

        while !c.ledger().is_empty() {
            let before: Vec<u64> = c.ledger().all_in_order().iter().map(|a| a.id).collect();
            assert!(c.undo());
            let after: Vec<u64> = c.ledger().all_in_order().iter().map(|a| a.id).collect();
            assert_eq!(after.as_slice(), &before[..before.len() - 1]);
            assert_eq!(*c.pixels(), replayed(&c));
        }
        assert!(is_blank(c.pixels()));
    }

    #[test]
    fn undo_on_empty_ledger_is_a_no_op() {
        let mut c = canvas();
        assert!(!c.undo());
        assert!(is_blank(c.pixels()));
    }

    #[test]
    fn clear_cannot_be_undone() {
        let mut c = canvas();
        c.draw(np(0.1, 0.1));
        c.draw(np(0.9, 0.9));
        c.clear();
        assert!(c.ledger().is_empty());
        assert!(is_blank(c.pixels()));
        assert!(!c.undo());
        assert!(is_blank(c.pixels()));
    }

    #[test]
    fn replaying_the_ledger_matches_live_pixels() {
        let mut c = canvas();
        for i in 0..20 {
            let t = i as f32 / 20.0;
            c.draw(np(t, 0.5 + 0.3 * (t * 6.0).sin()));
        }
        c.reset_pointers();
        for i in 0..8 {
            c.erase(np(0.2 + i as f32 * 0.05, 0.5));
        }
        c.change_color(Rgb::new(10, 200, 30));
        c.reset_pointers();
        c.draw(np(0.0, 0.0));
        c.draw(np(1.0, 1.0));
        assert_eq!(*c.pixels(), replayed(&c));
    }

    #[test]
    fn stored_width_survives_brush_changes() {
        let mut c = canvas();
        c.change_brush_width(2);
        c.draw(np(0.1, 0.5));
        c.draw(np(0.9, 0.5));
        let live = c.pixels().clone();
        c.change_brush_width(30);
        c.reconstruct();
        assert_eq!(*c.pixels(), live);
    }

    #[test]
    fn legacy_records_use_current_brush_width() {
        let text = "{\"id\":1,\"action_type\":\"draw\",\"points\":[[10,24],[50,24]],\"color\":[0,0,0]}\n";
        let c = RasterCanvas::new(W, H, ActionLedger::from_jsonl(text));
        // Default width 10 => radius 5.
        assert_eq!(c.pixels().rgb_at(30, 29), Some(Rgb::BLACK));
        assert_eq!(c.pixels().rgb_at(30, 30), Some(Rgb::WHITE));
    }

    #[test]
    fn saved_brush_applies_before_first_replay() {
        let text = "{\"id\":1,\"action_type\":\"draw\",\"points\":[[10,24],[50,24]],\"color\":[0,0,0]}\n";
        let brush = Brush { color: Rgb::BLACK, width: 20 };
        let mut c = RasterCanvas::with_brush(W, H, ActionLedger::from_jsonl(text), brush);
        // Width 20 => radius 10.
        assert_eq!(c.pixels().rgb_at(30, 34), Some(Rgb::BLACK));
        let at_start = c.pixels().clone();
        c.reconstruct();
        assert_eq!(*c.pixels(), at_start);
    }

    #[test]
    fn unreplayable_records_do_not_break_startup() {
        let text = concat!(
            "{\"id\":1,\"action_type\":\"draw\",\"points\":[[0,0],[5,5]],\"width\":4294967295}\n",
            "{\"id\":2,\"action_type\":\"draw\",\"points\":[[-2147483648,0],[2147483647,0]]}\n",
        );
        let c = RasterCanvas::new(W, H, ActionLedger::from_jsonl(text));
        assert!(c.ledger().is_empty());
        assert!(is_blank(c.pixels()));
    }

    #[test]
    fn wild_input_is_pulled_back_near_the_canvas() {
        let mut c = canvas();
        c.draw(np(-1e9, 0.5));
        c.draw(np(f32::INFINITY, 0.5));
        let a = &c.ledger().all_in_order()[0];
        assert_eq!(a.points, [PixelPoint::new(-(W as i32), 24), PixelPoint::new(2 * W as i32, 24)]);
    }

    #[test]
    fn brush_width_is_clamped() {
        let mut c = canvas();
        c.change_brush_width(0);
        assert_eq!(c.brush().width, MIN_BRUSH_WIDTH);
        c.change_brush_width(1000);
        assert_eq!(c.brush().width, MAX_BRUSH_WIDTH);
    }

    #[test]
    fn cursor_render_leaves_canvas_alone() {
        let mut c = canvas();
        c.set_cursor(np(0.5, 0.5));
        let shown = c.render_with_cursor();
        assert!(is_blank(c.pixels()));
        assert!(c.ledger().is_empty());
        assert_eq!(shown.rgb_at(34, 26), Some(CURSOR_DOT_COLOR));
        assert_eq!(shown.rgb_at(32, 20), Some(CURSOR_RING_COLOR));
    }

    #[test]
    fn pulse_bounces_between_bounds() {
        let mut pulse = CursorPulse::new();
        let values: Vec<f32> = (0..45).map(|_| pulse.advance()).collect();
        assert_eq!(values[0], 0.5);
        assert_eq!(values[19], 10.0);
        assert_eq!(values[20], 9.5);
        assert_eq!(values[39], 0.0);
        assert_eq!(values[40], 0.5);
        assert!(values.iter().all(|v| (0.0..=10.0).contains(v)));
    }

    #[test]
    fn save_writes_native_resolution_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let mut c = canvas();
        c.change_color(Rgb::new(1, 2, 3));
        c.draw(np(0.1, 0.5));
        c.draw(np(0.9, 0.5));
        c.save(&path).unwrap();
        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (W as u32, H as u32));
        assert_eq!(img.get_pixel(32, 24).0, [1, 2, 3]);
        assert_eq!(img.get_pixel(0, 0).0, [255, 255, 255]);
    }

    #[test]
    fn save_failure_is_reported_not_raised() {
        let c = canvas();
        let res = c.save(Path::new("/nonexistent-dir/for/sure/out.png"));
        assert!(matches!(res, Err(Error::Export { .. })));
    }

    #[test]
    fn canvas_reopens_with_journal_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let live = {
            let mut c = RasterCanvas::new(W, H, ActionLedger::open(&path).unwrap());
            c.draw(np(0.1, 0.1));
            c.draw(np(0.8, 0.7));
            c.pixels().clone()
        };
        let reopened = RasterCanvas::new(W, H, ActionLedger::open(&path).unwrap());
        assert_eq!(*reopened.pixels(), live);
    }
}
