// Routes live input (hand landmarks or the mouse) into canvas calls.
//
// Gesture mode: each camera tick is classified and dispatched. Drawing keeps
// stroke continuity across frames; erasing stamps a small cross of dabs and
// breaks continuity every frame; idle (or no hand) ends any stroke; a clear
// request only fires after the hold gate lets it through.
//
// Pointer mode: press/move/release from the mouse drive one tool.

use std::time::Instant;

use crate::canvas::RasterCanvas;
use crate::gesture::{Gesture, GestureClassifier, HoldGate};
use crate::landmarks::LandmarkFrame;
use crate::types::NormPoint;

/// Offsets of the five-point erase dab around the two-finger midpoint.
pub const ERASE_DAB_OFFSETS: [(f32, f32); 5] = [(0.0, 0.0), (0.01, 0.0), (-0.01, 0.0), (0.0, 0.01), (0.0, -0.01)];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerTool {
    Draw,
    Erase,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Gesture,
    Pointer(PointerTool),
}

impl Mode {
    pub fn label(self) -> &'static str {
        match self {
            Mode::Gesture => "GESTURE",
            Mode::Pointer(PointerTool::Draw) => "MOUSE DRAW",
            Mode::Pointer(PointerTool::Erase) => "MOUSE ERASE",
        }
    }

    /// Name stored in the export history.
    pub fn history_name(self) -> &'static str {
        match self {
            Mode::Gesture => "gesture",
            Mode::Pointer(_) => "mouse",
        }
    }
}

/// What one camera tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameOutcome {
    pub gesture: Gesture,
    pub cleared: bool,
}

pub struct InputRouter {
    mode: Mode,
    classifier: GestureClassifier,
    clear_gate: HoldGate,
    pointer_down: bool,
}

impl InputRouter {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            classifier: GestureClassifier::new(),
            clear_gate: HoldGate::for_clear(),
            pointer_down: false,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Consecutive frames the clear pose has been held.
    pub fn clear_progress(&self) -> u32 {
        self.clear_gate.held_frames()
    }

    /// Switch input mode. Any in-flight stroke ends here.
    pub fn set_mode(&mut self, canvas: &mut RasterCanvas, mode: Mode) {
        canvas.reset_pointers();
        self.pointer_down = false;
        self.clear_gate.reset();
        self.classifier.reset_smoothing();
        if mode != self.mode {
            log::info!("Mode: {} -> {}", self.mode.label(), mode.label());
        }
        self.mode = mode;
    }

    /// Handle one camera tick. `None` hand is treated as idle. Returns `None`
    /// when not in gesture mode.
    pub fn on_frame(&mut self, canvas: &mut RasterCanvas, hand: Option<&LandmarkFrame>, now: Instant) -> Option<FrameOutcome> {
        if self.mode != Mode::Gesture {
            return None;
        }

        let Some(frame) = hand else {
            canvas.reset_pointers();
            self.clear_gate.reset();
            self.classifier.reset_smoothing();
            return Some(FrameOutcome { gesture: Gesture::Idle, cleared: false });
        };

        let gesture = self.classifier.classify(frame);
        let cursor = self.classifier.smoothed_tip(frame);
        canvas.set_cursor(cursor);
        log::trace!("gesture {gesture:?} at ({:.3}, {:.3})", cursor.x, cursor.y);

        let mut cleared = false;
        let clear_fired = self.clear_gate.observe(gesture == Gesture::ClearRequested, now);

        match gesture {
            Gesture::Erasing => {
                let center = frame.index_tip().midpoint(frame.middle_tip());
                for (dx, dy) in ERASE_DAB_OFFSETS {
                    canvas.erase(center.offset(dx, dy));
                }
                canvas.reset_pointers();
            }
            Gesture::Drawing => canvas.draw(frame.index_tip()),
            Gesture::Idle => canvas.reset_pointers(),
            Gesture::ClearRequested => {
                canvas.reset_pointers();
                if clear_fired {
                    log::info!("Clear gesture held, clearing canvas");
                    canvas.clear();
                    cleared = true;
                }
            }
        }

        Some(FrameOutcome { gesture, cleared })
    }

    /// Map widget-local pixels to normalized canvas space, clamped to [0, 1].
    fn normalize(canvas: &RasterCanvas, x: f32, y: f32) -> NormPoint {
        NormPoint::new(
            (x / canvas.width() as f32).clamp(0.0, 1.0),
            (y / canvas.height() as f32).clamp(0.0, 1.0),
        )
    }

    fn apply_tool(&self, canvas: &mut RasterCanvas, tool: PointerTool, x: f32, y: f32) {
        let p = Self::normalize(canvas, x, y);
        canvas.set_cursor(p);
        match tool {
            PointerTool::Draw => canvas.draw(p),
            PointerTool::Erase => canvas.erase(p),
        }
    }

    pub fn pointer_press(&mut self, canvas: &mut RasterCanvas, x: f32, y: f32) {
        let Mode::Pointer(tool) = self.mode else { return };
        canvas.reset_pointers();
        self.pointer_down = true;
        self.apply_tool(canvas, tool, x, y);
    }

    pub fn pointer_move(&mut self, canvas: &mut RasterCanvas, x: f32, y: f32) {
        let Mode::Pointer(tool) = self.mode else { return };
        if self.pointer_down {
            self.apply_tool(canvas, tool, x, y);
        } else {
            canvas.set_cursor(Self::normalize(canvas, x, y));
        }
    }

    pub fn pointer_release(&mut self, canvas: &mut RasterCanvas) {
        if self.pointer_down {
            self.pointer_down = false;
            canvas.reset_pointers();
        }
    }
}
