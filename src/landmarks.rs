// Hand landmarks and where they come from.
//
// Detection itself is an external process (e.g. a MediaPipe hand landmarker
// script). We stream it camera frames over stdin and read back one JSON line
// per frame with zero or more hands of 21 normalized points each. The pipes
// live on a worker thread so a stuck detector costs a frame, not the app.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender, TryRecvError, TrySendError};
use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;
use crate::types::{FrameBuffer, NormPoint};

/// Hand landmark indices (MediaPipe hand model convention).
#[allow(dead_code)]
pub mod index {
    pub const WRIST: usize = 0;
    pub const THUMB_CMC: usize = 1;
    pub const THUMB_MCP: usize = 2;
    pub const THUMB_IP: usize = 3;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_MCP: usize = 5;
    pub const INDEX_PIP: usize = 6;
    pub const INDEX_DIP: usize = 7;
    pub const INDEX_TIP: usize = 8;
    pub const MIDDLE_MCP: usize = 9;
    pub const MIDDLE_PIP: usize = 10;
    pub const MIDDLE_DIP: usize = 11;
    pub const MIDDLE_TIP: usize = 12;
    pub const RING_MCP: usize = 13;
    pub const RING_PIP: usize = 14;
    pub const RING_DIP: usize = 15;
    pub const RING_TIP: usize = 16;
    pub const PINKY_MCP: usize = 17;
    pub const PINKY_PIP: usize = 18;
    pub const PINKY_DIP: usize = 19;
    pub const PINKY_TIP: usize = 20;
}

pub const LANDMARK_COUNT: usize = 21;

/// One detected hand in one camera frame. Immutable once produced.
#[derive(Clone, Debug, PartialEq)]
pub struct LandmarkFrame {
    points: [NormPoint; LANDMARK_COUNT],
}

impl LandmarkFrame {
    pub fn new(points: [NormPoint; LANDMARK_COUNT]) -> Self {
        Self { points }
    }

    /// Build from a slice; `None` unless it holds exactly 21 points.
    pub fn from_slice(points: &[NormPoint]) -> Option<Self> {
        let points: [NormPoint; LANDMARK_COUNT] = points.try_into().ok()?;
        Some(Self { points })
    }

    #[inline]
    pub fn point(&self, idx: usize) -> NormPoint {
        self.points[idx]
    }

    pub fn index_tip(&self) -> NormPoint {
        self.points[index::INDEX_TIP]
    }

    pub fn middle_tip(&self) -> NormPoint {
        self.points[index::MIDDLE_TIP]
    }
}

/// Anything that turns a camera frame into at most one hand.
pub trait LandmarkSource {
    /// `Ok(None)` means "no hand in this frame".
    fn detect(&mut self, frame: &FrameBuffer) -> Result<Option<LandmarkFrame>, Error>;
}

/// Used when no detector is configured: never sees a hand.
pub struct NoDetector;

impl LandmarkSource for NoDetector {
    fn detect(&mut self, _frame: &FrameBuffer) -> Result<Option<LandmarkFrame>, Error> {
        Ok(None)
    }
}

/* ---------- JSON wire format from the detector process ---------- */

#[derive(Deserialize, Debug)]
struct LandmarkJson {
    x: f32,
    y: f32,
}

#[derive(Deserialize, Debug)]
struct HandJson {
    landmarks: Vec<LandmarkJson>,
}

#[derive(Deserialize, Debug)]
struct DetectionJson {
    #[serde(default)]
    hands: Vec<HandJson>,
    #[serde(default)]
    error: Option<String>,
}

/// Parse one detector response line into the first well-formed hand.
fn parse_detection(line: &str) -> Result<Option<LandmarkFrame>, Error> {
    let result: DetectionJson = serde_json::from_str(line)
        .map_err(|e| Error::Detector(format!("bad response {:?}: {e}", line.trim())))?;

    if let Some(error) = result.error {
        log::warn!("Detector reported: {error}");
        return Ok(None);
    }

    for hand in result.hands {
        let points: Vec<NormPoint> = hand.landmarks.iter().map(|l| NormPoint::new(l.x, l.y)).collect();
        match LandmarkFrame::from_slice(&points) {
            Some(frame) => return Ok(Some(frame)),
            None => log::warn!("Expected {LANDMARK_COUNT} landmarks, got {}", points.len()),
        }
    }
    Ok(None)
}

/// How long one tick waits for landmarks before treating the frame as empty.
const REPLY_TIMEOUT: Duration = Duration::from_millis(200);
/// Model loading can be slow; this bounds the wait for `READY`.
const READY_TIMEOUT: Duration = Duration::from_secs(30);

type Reply = std::io::Result<String>;

fn read_reply(output: &mut impl BufRead) -> Reply {
    let mut line = String::new();
    if output.read_line(&mut line)? == 0 {
        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "detector exited"));
    }
    Ok(line)
}

/// Worker loop: forward the first line (READY), then for each request write
/// it to the child and send back one reply line. Stops on the first I/O error
/// or once either side of the channel is gone.
fn pump(mut input: impl Write, mut output: impl BufRead, requests: Receiver<Vec<u8>>, replies: Sender<Reply>) {
    if replies.send(read_reply(&mut output)).is_err() {
        return;
    }
    for payload in requests {
        let reply = input
            .write_all(&payload)
            .and_then(|()| input.flush())
            .and_then(|()| read_reply(&mut output));
        let failed = reply.is_err();
        if replies.send(reply).is_err() || failed {
            return;
        }
    }
}

/// Landmark detector running as a child process.
///
/// Protocol: after spawning, the child prints `READY`. For each frame we write
/// width, height and channel count (u32 little-endian) followed by packed RGB
/// bytes, then read back exactly one JSON line.
pub struct DetectorProcess {
    process: Child,
    requests: SyncSender<Vec<u8>>,
    replies: Receiver<Reply>,
    in_flight: bool, // a request was sent and its reply not yet taken
}

impl DetectorProcess {
    pub fn spawn(argv: &[String]) -> Result<Self, Error> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::Detector("empty detector command".into()))?;

        log::info!("Starting landmark detector: {}", argv.join(" "));
        let mut process = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| Error::Detector(format!("spawn {program}: {e}")))?;

        let (Some(stdin), Some(stdout)) = (process.stdin.take(), process.stdout.take()) else {
            let _ = process.kill();
            return Err(Error::Detector("child pipes unavailable".into()));
        };

        let (requests, request_rx) = mpsc::sync_channel(1);
        let (reply_tx, replies) = mpsc::channel();
        let worker = std::thread::Builder::new()
            .name("landmark-detector".into())
            .spawn(move || pump(stdin, BufReader::new(stdout), request_rx, reply_tx));
        if let Err(e) = worker {
            let _ = process.kill();
            return Err(Error::Detector(format!("worker thread: {e}")));
        }

        let mut detector = Self { process, requests, replies, in_flight: false };
        let ready = match detector.replies.recv_timeout(READY_TIMEOUT) {
            Ok(Ok(line)) if line.trim() == "READY" => Ok(()),
            Ok(Ok(line)) => Err(format!("expected READY, got {:?}", line.trim())),
            Ok(Err(e)) => Err(format!("waiting for READY: {e}")),
            Err(RecvTimeoutError::Timeout) => Err(format!("no READY within {READY_TIMEOUT:?}")),
            Err(RecvTimeoutError::Disconnected) => Err("detector exited".to_string()),
        };
        // On error, dropping `detector` kills the child.
        ready.map_err(Error::Detector)?;

        log::info!("Landmark detector ready");
        Ok(detector)
    }

    fn take(reply: Reply) -> Result<String, Error> {
        reply.map_err(|e| Error::Detector(format!("pipe: {e}")))
    }
}

impl LandmarkSource for DetectorProcess {
    fn detect(&mut self, frame: &FrameBuffer) -> Result<Option<LandmarkFrame>, Error> {
        if frame.pixels.is_empty() {
            return Ok(None);
        }

        // An earlier frame timed out. Its answer is stale once it shows up;
        // until then the child is busy and this frame is skipped.
        if self.in_flight {
            match self.replies.try_recv() {
                Ok(reply) => {
                    Self::take(reply)?;
                    self.in_flight = false;
                }
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => return Err(Error::Detector("detector exited".into())),
            }
        }

        let mut payload = Vec::with_capacity(12 + 3 * frame.pixels.len());
        payload.extend_from_slice(&(frame.width as u32).to_le_bytes());
        payload.extend_from_slice(&(frame.height as u32).to_le_bytes());
        payload.extend_from_slice(&3u32.to_le_bytes());
        for &px in &frame.pixels {
            payload.extend_from_slice(&[(px >> 16) as u8, (px >> 8) as u8, px as u8]);
        }

        match self.requests.try_send(payload) {
            Ok(()) => self.in_flight = true,
            Err(TrySendError::Full(_)) => return Ok(None),
            Err(TrySendError::Disconnected(_)) => return Err(Error::Detector("detector exited".into())),
        }

        match self.replies.recv_timeout(REPLY_TIMEOUT) {
            Ok(reply) => {
                self.in_flight = false;
                parse_detection(&Self::take(reply)?)
            }
            Err(RecvTimeoutError::Timeout) => {
                log::debug!("Landmark detector slower than {REPLY_TIMEOUT:?}, skipping frame");
                Ok(None)
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::Detector("detector exited".into())),
        }
    }
}

impl Drop for DetectorProcess {
    fn drop(&mut self) {
        // Closing the child's pipes also ends the worker thread.
        let _ = self.process.kill();
        let _ = self.process.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hand_json(n: usize) -> String {
        let pts: Vec<String> = (0..n).map(|i| format!("{{\"x\":{}.0,\"y\":0.5}}", i % 2)).collect();
        format!("{{\"landmarks\":[{}]}}", pts.join(","))
    }

    #[test]
    fn parses_first_complete_hand() {
        let line = format!("{{\"hands\":[{},{}]}}", hand_json(5), hand_json(21));
        let frame = parse_detection(&line).unwrap().unwrap();
        assert_eq!(frame.point(1), NormPoint::new(1.0, 0.5));
        assert_eq!(frame.index_tip(), NormPoint::new(0.0, 0.5));
    }

    #[test]
    fn empty_hands_is_no_hand() {
        assert!(parse_detection("{\"hands\":[]}").unwrap().is_none());
    }

    #[test]
    fn reported_error_is_no_hand() {
        let line = format!("{{\"hands\":[{}],\"error\":\"model hiccup\"}}", hand_json(21));
        assert!(parse_detection(&line).unwrap().is_none());
    }

    #[test]
    fn garbage_is_a_detector_error() {
        assert!(matches!(parse_detection("not json"), Err(Error::Detector(_))));
    }

    #[test]
    fn frame_needs_exactly_21_points() {
        assert!(LandmarkFrame::from_slice(&[NormPoint::default(); 20]).is_none());
        assert!(LandmarkFrame::from_slice(&[NormPoint::default(); 21]).is_some());
    }

    #[test]
    fn pump_answers_each_request_then_reports_eof() {
        let (requests, request_rx) = mpsc::sync_channel(1);
        let (reply_tx, replies) = mpsc::channel();
        requests.send(vec![1, 2, 3]).unwrap();
        drop(requests);
        let output = std::io::Cursor::new(b"READY\n{\"hands\":[]}\n".to_vec());
        pump(Vec::new(), output, request_rx, reply_tx);

        let got: Vec<Reply> = replies.iter().collect();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].as_ref().unwrap().trim(), "READY");
        assert_eq!(got[1].as_ref().unwrap().trim(), "{\"hands\":[]}");
    }

    #[test]
    fn pump_stops_when_child_goes_quiet() {
        let (requests, request_rx) = mpsc::sync_channel(1);
        let (reply_tx, replies) = mpsc::channel();
        requests.send(vec![0]).unwrap();
        drop(requests);
        pump(Vec::new(), std::io::Cursor::new(b"READY\n".to_vec()), request_rx, reply_tx);

        let got: Vec<Reply> = replies.iter().collect();
        assert_eq!(got.len(), 2);
        assert_eq!(got[1].as_ref().unwrap_err().kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[cfg(unix)]
    fn shell(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into()]
    }

    #[cfg(unix)]
    #[test]
    fn hung_detector_costs_a_frame_not_the_tick() {
        let mut detector = DetectorProcess::spawn(&shell("echo READY; exec cat >/dev/null")).unwrap();
        let fb = FrameBuffer { width: 2, height: 2, pixels: vec![0; 4] };
        let started = std::time::Instant::now();
        assert!(detector.detect(&fb).unwrap().is_none());
        assert!(detector.detect(&fb).unwrap().is_none());
        assert!(started.elapsed() < REPLY_TIMEOUT * 5);
    }

    #[cfg(unix)]
    #[test]
    fn detector_reply_becomes_a_hand() {
        let script = format!("echo READY; echo '{{\"hands\":[{}]}}'; exec cat >/dev/null", hand_json(21));
        let mut detector = DetectorProcess::spawn(&shell(&script)).unwrap();
        let fb = FrameBuffer { width: 2, height: 2, pixels: vec![0; 4] };
        let hand = detector.detect(&fb).unwrap().unwrap();
        assert_eq!(hand.point(1), NormPoint::new(1.0, 0.5));
    }

    #[cfg(unix)]
    #[test]
    fn missing_ready_is_a_spawn_error() {
        assert!(matches!(DetectorProcess::spawn(&shell("echo hello")), Err(Error::Detector(_))));
    }

    #[test]
    fn no_detector_never_sees_a_hand() {
        let fb = FrameBuffer { width: 1, height: 1, pixels: vec![0] };
        assert!(NoDetector.detect(&fb).unwrap().is_none());
    }
}
