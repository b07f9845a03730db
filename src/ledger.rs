// The stroke ledger: an ordered, append-only log of draw/erase segments.
//
// The in-memory list is what replay reads. When a journal file is attached,
// every mutation is mirrored to it as JSON lines so the drawing survives a
// restart:
//
//   {"id":1,"action_type":"draw","points":[[10,10],[40,12]],"color":[0,0,0],"width":10,"timestamp":"..."}
//
// Removing the newest entry truncates the file back to where that line began.
// If the journal ever fails we keep drawing in memory, stop writing, and mark
// the ledger degraded.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::canvas::{ERASER_EXTRA_WIDTH, MAX_BRUSH_WIDTH, MIN_BRUSH_WIDTH};
use crate::error::Error;
use crate::types::{PixelPoint, Rgb};

/// Loaded records with a coordinate beyond this (either sign) are rejected.
pub const MAX_COORD: i32 = 1 << 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Draw,
    Erase,
}

/// One logged segment. Never mutated after it is appended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrokeAction {
    pub id: u64,
    #[serde(rename = "action_type")]
    pub kind: ActionKind,
    pub points: [PixelPoint; 2],
    #[serde(default)]
    pub color: Option<Rgb>,
    /// Stroke thickness in pixels. Older records lack it; replay then uses
    /// the canvas's current brush.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl StrokeAction {
    /// Why replaying this record would be unreasonable, if it would be.
    fn implausible(&self) -> Option<String> {
        if let Some(width) = self.width {
            if !(MIN_BRUSH_WIDTH..=MAX_BRUSH_WIDTH + ERASER_EXTRA_WIDTH).contains(&width) {
                return Some(format!("width {width} out of range"));
            }
        }
        let limit = MAX_COORD.unsigned_abs();
        let far = self.points.iter().any(|p| p.x.unsigned_abs() > limit || p.y.unsigned_abs() > limit);
        far.then(|| format!("points {:?} out of range", self.points))
    }
}

/// Everything `append` needs from the caller; id and timestamp are assigned.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NewStroke {
    pub kind: ActionKind,
    pub from: PixelPoint,
    pub to: PixelPoint,
    pub color: Rgb,
    pub width: u32,
}

/// Parse JSON lines, skipping blanks and anything malformed.
/// Yields each record together with the byte offset its line starts at.
fn parse_lines(text: &str) -> Vec<(u64, StrokeAction)> {
    let mut out = Vec::new();
    let mut offset = 0u64;
    for (lineno, line) in text.split_inclusive('\n').enumerate() {
        let start = offset;
        offset += line.len() as u64;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<StrokeAction>(trimmed) {
            Ok(action) => match action.implausible() {
                Some(why) => log::warn!("Skipping ledger line {}: {why}", lineno + 1),
                None => out.push((start, action)),
            },
            Err(e) => log::warn!("Skipping malformed ledger line {}: {e}", lineno + 1),
        }
    }
    out
}

/// Append-only JSON-lines file mirroring the in-memory ledger.
struct Journal {
    path: PathBuf,
    file: File,
    line_starts: Vec<u64>, // one per live record, oldest first
    len: u64,
}

impl Journal {
    fn io(&self, source: std::io::Error) -> Error {
        Error::Ledger { path: self.path.clone(), source }
    }

    /// Open (creating if needed) and load every readable record.
    fn open(path: &Path) -> Result<(Self, Vec<StrokeAction>), Error> {
        let io = |source: std::io::Error| Error::Ledger { path: path.to_path_buf(), source };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .map_err(io)?;

        let mut text = String::new();
        file.read_to_string(&mut text).map_err(io)?;
        let mut len = text.len() as u64;

        // A torn final write would glue the next record onto garbage.
        if !text.is_empty() && !text.ends_with('\n') {
            file.write_all(b"\n").map_err(io)?;
            len += 1;
        }

        let (line_starts, mut actions): (Vec<u64>, Vec<StrokeAction>) = parse_lines(&text).into_iter().unzip();
        let mut journal = Self { path: path.to_path_buf(), file, line_starts, len };

        // Removal truncates from the end, so file order must be id order.
        if !actions.windows(2).all(|w| w[0].id < w[1].id) {
            log::warn!("Ledger {path:?} is out of id order, rewriting it");
            actions.sort_by_key(|a| a.id);
            actions.dedup_by_key(|a| a.id);
            journal.rewrite(&actions)?;
        }
        Ok((journal, actions))
    }

    fn rewrite(&mut self, actions: &[StrokeAction]) -> Result<(), Error> {
        self.clear()?;
        for action in actions {
            self.append(action)?;
        }
        Ok(())
    }

    fn append(&mut self, action: &StrokeAction) -> Result<(), Error> {
        let mut line = serde_json::to_string(action)?;
        line.push('\n');
        self.file.write_all(line.as_bytes()).map_err(|e| self.io(e))?;
        self.file.flush().map_err(|e| self.io(e))?;
        self.line_starts.push(self.len);
        self.len += line.len() as u64;
        Ok(())
    }

    fn truncate_to(&mut self, len: u64) -> Result<(), Error> {
        self.file.set_len(len).map_err(|e| self.io(e))?;
        self.file.seek(SeekFrom::End(0)).map_err(|e| self.io(e))?;
        self.len = len;
        Ok(())
    }

    fn remove_last(&mut self) -> Result<(), Error> {
        match self.line_starts.pop() {
            Some(start) => self.truncate_to(start),
            None => Ok(()),
        }
    }

    fn clear(&mut self) -> Result<(), Error> {
        self.line_starts.clear();
        self.truncate_to(0)
    }
}

pub struct ActionLedger {
    actions: Vec<StrokeAction>,
    next_id: u64,
    journal: Option<Journal>,
    degraded: bool,
}

impl ActionLedger {
    /// A ledger with no backing file.
    pub fn in_memory() -> Self {
        Self { actions: Vec::new(), next_id: 1, journal: None, degraded: false }
    }

    /// Load an in-memory ledger from JSON-lines text (malformed lines skipped).
    #[cfg(test)]
    pub fn from_jsonl(text: &str) -> Self {
        let actions: Vec<StrokeAction> = parse_lines(text).into_iter().map(|(_, a)| a).collect();
        Self::with_actions(actions, None)
    }

    /// Open the journal at `path`, loading whatever it already holds.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let (journal, actions) = Journal::open(path.as_ref())?;
        log::info!("Loaded {} ledger entries from {:?}", actions.len(), journal.path);
        Ok(Self::with_actions(actions, Some(journal)))
    }

    fn with_actions(mut actions: Vec<StrokeAction>, journal: Option<Journal>) -> Self {
        // Replay order is ascending id, whatever order the lines were in.
        actions.sort_by_key(|a| a.id);
        actions.dedup_by_key(|a| a.id);
        let next_id = actions.last().map_or(1, |a| a.id + 1);
        Self { actions, next_id, journal, degraded: false }
    }

    /// Log a persistence failure, detach the journal, keep going in memory.
    fn degrade(&mut self, what: &str, err: Error) {
        log::warn!("Ledger {what} failed, continuing in memory only: {err}");
        self.journal = None;
        self.degraded = true;
    }

    pub fn append(&mut self, stroke: NewStroke) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let action = StrokeAction {
            id,
            kind: stroke.kind,
            points: [stroke.from, stroke.to],
            color: Some(stroke.color),
            width: Some(stroke.width),
            timestamp: Utc::now(),
        };
        if let Some(journal) = self.journal.as_mut() {
            if let Err(e) = journal.append(&action) {
                self.degrade("append", e);
            }
        }
        self.actions.push(action);
        id
    }

    /// Every action, oldest (lowest id) first.
    pub fn all_in_order(&self) -> &[StrokeAction] {
        &self.actions
    }

    /// Delete and return the newest action.
    pub fn remove_most_recent(&mut self) -> Option<StrokeAction> {
        let action = self.actions.pop()?;
        if let Some(journal) = self.journal.as_mut() {
            if let Err(e) = journal.remove_last() {
                self.degrade("remove", e);
            }
        }
        Some(action)
    }

    /// Drop every action. Ids keep counting up.
    pub fn clear(&mut self) {
        self.actions.clear();
        if let Some(journal) = self.journal.as_mut() {
            if let Err(e) = journal.clear() {
                self.degrade("clear", e);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// True once a journal write has failed; disk and memory may differ.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    #[cfg(test)]
    pub fn to_jsonl(&self) -> Result<String, Error> {
        let mut out = String::new();
        for action in &self.actions {
            out.push_str(&serde_json::to_string(action)?);
            out.push('\n');
        }
        Ok(out)
    }
}
