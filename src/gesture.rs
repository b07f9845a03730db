// Finger-pose gesture classification.
//
// A finger counts as extended when its tip sits above (smaller y than) its
// PIP joint. The thumb is "up" when its tip is well above its MCP joint.
// Only `ClearRequested` is debounced, and that happens in the caller via
// `HoldGate`; the classifier itself reports every frame independently.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::landmarks::{LandmarkFrame, index};
use crate::types::NormPoint;

/// Normalized distance the thumb tip must rise above its base joint.
pub const THUMB_UP_THRESHOLD: f32 = 0.1;
/// Fingertip smoothing window (frames).
pub const TIP_HISTORY: usize = 5;

/// Frames a clear gesture must be held before it fires.
pub const CLEAR_HOLD_FRAMES: u32 = 30;
/// Minimum time between two clears.
pub const CLEAR_COOLDOWN: Duration = Duration::from_secs(3);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Gesture {
    Idle,
    Drawing,
    Erasing,
    ClearRequested,
}

impl Gesture {
    pub fn label(self) -> &'static str {
        match self {
            Gesture::Idle => "IDLE",
            Gesture::Drawing => "DRAW",
            Gesture::Erasing => "ERASE",
            Gesture::ClearRequested => "CLEAR",
        }
    }
}

/// Which fingers are extended in one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FingerState {
    pub thumb_up: bool,
    pub index: bool,
    pub middle: bool,
    pub ring: bool,
    pub pinky: bool,
}

impl FingerState {
    pub fn of(frame: &LandmarkFrame) -> Self {
        let extended = |tip: usize, pip: usize| frame.point(tip).y < frame.point(pip).y;
        let thumb_rise = frame.point(index::THUMB_MCP).y - frame.point(index::THUMB_TIP).y;
        Self {
            thumb_up: thumb_rise > THUMB_UP_THRESHOLD,
            index: extended(index::INDEX_TIP, index::INDEX_PIP),
            middle: extended(index::MIDDLE_TIP, index::MIDDLE_PIP),
            ring: extended(index::RING_TIP, index::RING_PIP),
            pinky: extended(index::PINKY_TIP, index::PINKY_PIP),
        }
    }

    /// First matching rule wins.
    pub fn gesture(self) -> Gesture {
        let Self { thumb_up, index, middle, ring, pinky } = self;
        if thumb_up && !index && !middle && !ring && !pinky {
            Gesture::ClearRequested
        } else if index && middle && !ring && !pinky {
            Gesture::Erasing
        } else if index && !middle && !ring && !pinky {
            Gesture::Drawing
        } else {
            Gesture::Idle
        }
    }
}

/// Stateless pose rules plus a rolling index-fingertip average for the cursor.
pub struct GestureClassifier {
    tips: VecDeque<NormPoint>,
    last: Option<(LandmarkFrame, Gesture)>,
}

impl GestureClassifier {
    pub fn new() -> Self {
        Self { tips: VecDeque::with_capacity(TIP_HISTORY), last: None }
    }

    pub fn classify(&mut self, frame: &LandmarkFrame) -> Gesture {
        if let Some((prev, gesture)) = &self.last {
            if prev == frame {
                return *gesture;
            }
        }
        let gesture = FingerState::of(frame).gesture();
        self.last = Some((frame.clone(), gesture));
        gesture
    }

    /// Push this frame's index tip and return the average over the window.
    pub fn smoothed_tip(&mut self, frame: &LandmarkFrame) -> NormPoint {
        if self.tips.len() == TIP_HISTORY {
            self.tips.pop_front();
        }
        self.tips.push_back(frame.index_tip());

        let n = self.tips.len() as f32;
        let (sx, sy) = self.tips.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        NormPoint::new(sx / n, sy / n)
    }

    /// Forget the smoothing history (hand lost or mode switched).
    pub fn reset_smoothing(&mut self) {
        self.tips.clear();
    }
}

impl Default for GestureClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Hold-to-trigger debounce with a cooldown.
///
/// `observe(true, now)` must be seen on `hold_frames` consecutive calls before
/// it fires, and it will not fire again until `cooldown` has passed since the
/// last trigger. Holding through the cooldown keeps counting but stays quiet.
#[derive(Debug)]
pub struct HoldGate {
    hold_frames: u32,
    cooldown: Duration,
    consecutive: u32,
    last_trigger: Option<Instant>,
}

impl HoldGate {
    pub fn new(hold_frames: u32, cooldown: Duration) -> Self {
        Self { hold_frames, cooldown, consecutive: 0, last_trigger: None }
    }

    pub fn for_clear() -> Self {
        Self::new(CLEAR_HOLD_FRAMES, CLEAR_COOLDOWN)
    }

    /// Returns true exactly when the side effect should run.
    pub fn observe(&mut self, held: bool, now: Instant) -> bool {
        if !held {
            self.consecutive = 0;
            return false;
        }
        self.consecutive = self.consecutive.saturating_add(1);
        if self.consecutive < self.hold_frames {
            return false;
        }
        let cooled = match self.last_trigger {
            None => true,
            Some(t) => now.saturating_duration_since(t) >= self.cooldown,
        };
        if cooled {
            self.last_trigger = Some(now);
        }
        cooled
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }

    pub fn held_frames(&self) -> u32 {
        self.consecutive
    }
}
