// User settings (TOML) and the export history, both under the per-user
// preferences directory.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::Rgb;

/// `<preferences>/gesture-painter`, if the platform has one.
pub fn preferences_dir() -> Option<PathBuf> {
    let mut base_dir = dirs::preference_dir()?;
    base_dir.push(env!("CARGO_PKG_NAME"));
    Some(base_dir)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Brush color restored at start-up.
    pub last_color: Option<Rgb>,
    /// Camera that worked last time; tried first.
    pub last_camera: Option<u32>,
    pub brush_width: u32,
    pub canvas_width: usize,
    pub canvas_height: usize,
    /// argv of the external landmark detector. Empty = pointer input only.
    pub detector_command: Vec<String>,
    /// Ledger journal; relative paths resolve against the preferences dir.
    pub ledger_path: PathBuf,
    pub export_dir: PathBuf,
    pub tick_hz: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            last_color: None,
            last_camera: None,
            brush_width: crate::canvas::DEFAULT_BRUSH_WIDTH,
            canvas_width: 640,
            canvas_height: 480,
            detector_command: Vec::new(),
            ledger_path: PathBuf::from("ledger.jsonl"),
            export_dir: dirs::picture_dir().unwrap_or_else(|| PathBuf::from(".")),
            tick_hz: 30,
        }
    }
}

impl Settings {
    const FILENAME: &'static str = "settings.toml";

    /// Read `path`, or defaults if it is missing or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                if path.exists() {
                    log::warn!("Settings at {path:?} unreadable, using defaults: {e}");
                } else {
                    log::info!("No settings at {path:?}, using defaults");
                }
                Self::default()
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Settings(format!("read {path:?}: {e}")))?;
        toml::from_str(&text).map_err(|e| Error::Settings(format!("parse {path:?}: {e}")))
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let text = toml::to_string_pretty(self).map_err(|e| Error::Settings(format!("encode: {e}")))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Settings(format!("mkdir {parent:?}: {e}")))?;
        }
        std::fs::write(path, text).map_err(|e| Error::Settings(format!("write {path:?}: {e}")))
    }

    /// Default location for the settings file.
    pub fn default_path() -> PathBuf {
        preferences_dir().unwrap_or_else(|| PathBuf::from(".")).join(Self::FILENAME)
    }

    /// Resolve a possibly-relative path against the directory holding `settings_path`.
    pub fn resolve(settings_path: &Path, p: &Path) -> PathBuf {
        if p.is_absolute() {
            return p.to_path_buf();
        }
        settings_path.parent().unwrap_or_else(|| Path::new(".")).join(p)
    }
}

/// One line of `drawings.jsonl`: a PNG the user exported.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DrawingRecord {
    pub filename: PathBuf,
    pub created_at: DateTime<Utc>,
    pub color: Rgb,
    pub mode: String,
}

/// Append-only history of exports.
pub struct DrawingLog {
    path: PathBuf,
}

impl DrawingLog {
    pub const FILENAME: &'static str = "drawings.jsonl";

    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn record(&self, record: &DrawingRecord) -> Result<(), Error> {
        let io = |e: std::io::Error| Error::Settings(format!("append {:?}: {e}", self.path));
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).map_err(io)?;
        file.write_all(line.as_bytes()).map_err(io)
    }

    /// Every readable record, oldest first.
    pub fn list(&self) -> Vec<DrawingRecord> {
        let Ok(text) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        text.lines().filter_map(|l| serde_json::from_str(l).ok()).collect()
    }
}

/// `drawing-YYYYMMDD-HHMMSS.png` under `dir`.
pub fn export_file_name(dir: &Path, now: DateTime<Utc>) -> PathBuf {
    dir.join(format!("drawing-{}.png", now.format("%Y%m%d-%H%M%S")))
}

/// Make sure a user-supplied export path ends in `.png`.
pub fn with_png_extension(path: &Path) -> PathBuf {
    let is_png = path.extension().is_some_and(|e| e.eq_ignore_ascii_case("png"));
    if is_png {
        path.to_path_buf()
    } else {
        let mut s = path.as_os_str().to_owned();
        s.push(".png");
        PathBuf::from(s)
    }
}
