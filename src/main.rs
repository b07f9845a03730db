// What you SEE:
// • Left half: the live camera, mirrored. Right half: the canvas.
// • Gesture mode: index finger draws, index+middle erases, hold a thumbs-up to clear.
// • M / E switch to mouse drawing / erasing, G goes back to gestures.
// • U or Ctrl+Z undoes, C clears, S saves a PNG, K cycles colors, [ ] change width.
// • ESC quits.

mod camera;
mod canvas;
mod draw;
mod error;
mod gesture;
mod landmarks;
mod ledger;
mod raster;
mod router;
mod settings;
mod types;

use std::path::Path;
use std::time::{Duration, Instant};

use camera::{find_available_camera, fit_frame};
use canvas::{Brush, RasterCanvas};
use draw::{Command, Drawer, blit, draw_text_5x7, shade_strip};
use error::Error;
use gesture::{CLEAR_HOLD_FRAMES, Gesture};
use landmarks::{DetectorProcess, LandmarkSource, NoDetector};
use ledger::ActionLedger;
use router::{InputRouter, Mode, PointerTool};
use settings::{DrawingLog, DrawingRecord, Settings, export_file_name, with_png_extension};
use types::{FrameBuffer, Rgb};

/// Colors `K` cycles through.
const PALETTE: [Rgb; 6] = [
    Rgb::BLACK,
    Rgb::new(220, 30, 30),
    Rgb::new(30, 150, 40),
    Rgb::new(30, 70, 220),
    Rgb::new(240, 180, 0),
    Rgb::new(150, 50, 190),
];
const BRUSH_STEP: u32 = 2;
const MAX_CAMERA_INDEX: u32 = 4;
const HUD_HEIGHT: usize = 14;
const NO_CAMERA_GRAY: Rgb = Rgb::new(40, 40, 40);

fn next_color(current: Rgb) -> Rgb {
    let at = PALETTE.iter().position(|&c| c == current);
    PALETTE[at.map_or(0, |i| (i + 1) % PALETTE.len())]
}

fn open_ledger(path: &Path) -> ActionLedger {
    match ActionLedger::open(path) {
        Ok(ledger) => ledger,
        Err(e) => {
            log::warn!("Could not open ledger, history will not survive a restart: {e}");
            ActionLedger::in_memory()
        }
    }
}

fn open_detector(command: &[String]) -> Box<dyn LandmarkSource> {
    if command.is_empty() {
        log::info!("No landmark detector configured, gesture mode will see no hand");
        return Box::new(NoDetector);
    }
    match DetectorProcess::spawn(command) {
        Ok(detector) => Box::new(detector),
        Err(e) => {
            log::warn!("{e}; continuing without hand tracking");
            Box::new(NoDetector)
        }
    }
}

fn save_settings(settings: &Settings, path: &Path) {
    if let Err(e) = settings.save(path) {
        log::warn!("{e}");
    }
}

fn export(canvas: &RasterCanvas, dir: &Path, mode: Mode, drawings: &DrawingLog) -> Result<(), Error> {
    std::fs::create_dir_all(dir).map_err(|e| Error::Settings(format!("mkdir {dir:?}: {e}")))?;
    let created_at = chrono::Utc::now();
    let path = with_png_extension(&export_file_name(dir, created_at));
    let filename = canvas.save(&path)?;
    drawings.record(&DrawingRecord {
        filename,
        created_at,
        color: canvas.brush().color,
        mode: mode.history_name().to_string(),
    })
}

fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    /* --- Settings, history, canvas ---
       Visual: the canvas comes back exactly as it was left last time. */
    let settings_path = Settings::default_path();
    let mut settings = Settings::load_or_default(&settings_path);
    let (w, h) = (settings.canvas_width, settings.canvas_height);

    let ledger = open_ledger(&Settings::resolve(&settings_path, &settings.ledger_path));
    let brush = Brush {
        color: settings.last_color.unwrap_or(Rgb::BLACK),
        width: settings.brush_width,
    };
    let mut canvas = RasterCanvas::with_brush(w, h, ledger, brush);

    let drawings = DrawingLog::new(Settings::resolve(&settings_path, Path::new(DrawingLog::FILENAME)));
    log::info!("{} drawings exported so far", drawings.list().len());
    let export_dir = Settings::resolve(&settings_path, &settings.export_dir);

    /* --- Camera + hand tracking ---
       Visual: left panel shows the camera, or stays gray without one. */
    let mut cam = find_available_camera(settings.last_camera, MAX_CAMERA_INDEX, w as u32, h as u32);
    if let Some(c) = &cam {
        let (cw, ch) = c.resolution();
        if (cw as usize, ch as usize) != (w, h) {
            log::info!("Scaling camera {cw}x{ch} to {w}x{h}");
        }
        if settings.last_camera != Some(c.index()) {
            settings.last_camera = Some(c.index());
            save_settings(&settings, &settings_path);
        }
    }
    let mut detector = open_detector(&settings.detector_command);

    /* --- Window ---
       Visual: one window, camera on the left, canvas on the right. */
    let mut drawer = Drawer::new("Gesture Painter", 2 * w, h, settings.tick_hz)?;
    let mut screen = FrameBuffer::filled(2 * w, h, Rgb::BLACK);
    let mut camera_panel = FrameBuffer::filled(w, h, NO_CAMERA_GRAY);

    let start_mode = if cam.is_some() { Mode::Gesture } else { Mode::Pointer(PointerTool::Draw) };
    let mut router = InputRouter::new(start_mode);
    let mut last_gesture = Gesture::Idle;
    let mut was_down = false;

    /* --- HUD / FPS --- */
    let mut last_fps_time = Instant::now();
    let mut frames_this_second: u32 = 0;
    let mut hud_fps_text = String::from("FPS 0.0");

    /* ------------------------------ Main loop ------------------------------ */
    while drawer.is_open() && !drawer.esc_pressed() {
        let now = Instant::now();

        /* 1) Camera frame -> landmarks -> gesture dispatch. */
        if let Some(c) = cam.as_mut() {
            match c.next_frame() {
                Ok(frame) => {
                    camera_panel = fit_frame(&frame, w, h);
                    let hand = match detector.detect(&camera_panel) {
                        Ok(hand) => hand,
                        Err(e) => {
                            log::warn!("{e}; hand tracking disabled");
                            detector = Box::new(NoDetector);
                            None
                        }
                    };
                    if let Some(outcome) = router.on_frame(&mut canvas, hand.as_ref(), now) {
                        last_gesture = outcome.gesture;
                    }
                }
                Err(e) => log::warn!("Skipping tick: {e}"),
            }
        }

        /* 2) Mouse: press/move/release in canvas-local pixels. */
        let down = drawer.left_mouse_down();
        if let Some((mx, my)) = drawer.mouse_pos() {
            let (cx, cy) = (mx - w as f32, my);
            if down && !was_down {
                // Presses over the camera panel are ignored.
                if cx >= 0.0 {
                    router.pointer_press(&mut canvas, cx, cy);
                }
            } else if cx >= 0.0 || was_down {
                router.pointer_move(&mut canvas, cx, cy);
            }
        }
        if was_down && !down {
            router.pointer_release(&mut canvas);
        }
        was_down = down;

        /* 3) Keyboard. */
        for command in drawer.commands() {
            match command {
                Command::GestureMode => router.set_mode(&mut canvas, Mode::Gesture),
                Command::MouseDraw => router.set_mode(&mut canvas, Mode::Pointer(PointerTool::Draw)),
                Command::MouseErase => router.set_mode(&mut canvas, Mode::Pointer(PointerTool::Erase)),
                Command::Clear => canvas.clear(),
                Command::Undo => {
                    if !canvas.undo() {
                        log::debug!("Nothing to undo");
                    }
                }
                Command::Save => {
                    if let Err(e) = export(&canvas, &export_dir, router.mode(), &drawings) {
                        log::error!("{e}");
                    }
                }
                Command::NextColor => {
                    let color = next_color(canvas.brush().color);
                    canvas.change_color(color);
                    settings.last_color = Some(color);
                    save_settings(&settings, &settings_path);
                }
                Command::BrushSmaller | Command::BrushLarger => {
                    let width = canvas.brush().width;
                    let width = match command {
                        Command::BrushSmaller => width.saturating_sub(BRUSH_STEP),
                        _ => width + BRUSH_STEP,
                    };
                    canvas.change_brush_width(width);
                    settings.brush_width = canvas.brush().width;
                    save_settings(&settings, &settings_path);
                }
            }
        }

        /* 4) Compose both panels and the HUD. */
        blit(&mut screen, &camera_panel, 0, 0);
        blit(&mut screen, &canvas.render_with_cursor(), w, 0);
        shade_strip(&mut screen, HUD_HEIGHT);

        let mut hud = format!(
            "{} | {} | W {} | LEDGER {} | {}",
            router.mode().label(),
            last_gesture.label(),
            canvas.brush().width,
            canvas.ledger().len(),
            hud_fps_text
        );
        let held = router.clear_progress();
        if held > 0 {
            hud.push_str(&format!(" | CLEAR {}/{}", held.min(CLEAR_HOLD_FRAMES), CLEAR_HOLD_FRAMES));
        }
        if canvas.ledger().is_degraded() {
            hud.push_str(" | LEDGER DEGRADED");
        }
        draw_text_5x7(&mut screen, 4, 4, &hud, 0x00_FF_FF_FF);

        /* 5) Present (this also paces the loop to tick_hz). */
        drawer.present(&screen)?;

        /* 6) FPS counter. */
        frames_this_second += 1;
        if now.duration_since(last_fps_time) >= Duration::from_secs(1) {
            let secs = now.duration_since(last_fps_time).as_secs_f32();
            let fps = frames_this_second as f32 / secs;
            log::debug!("FPS: {fps:.1}");
            hud_fps_text = format!("FPS {fps:.1}");
            frames_this_second = 0;
            last_fps_time = now;
        }
    }

    canvas.reset_pointers();
    log::info!("Bye, {} actions in the ledger", canvas.ledger().len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_cycles_and_wraps() {
        assert_eq!(next_color(Rgb::BLACK), PALETTE[1]);
        assert_eq!(next_color(PALETTE[PALETTE.len() - 1]), Rgb::BLACK);
        // A color from settings that is not in the palette restarts the cycle.
        assert_eq!(next_color(Rgb::new(1, 2, 3)), Rgb::BLACK);
    }
}
