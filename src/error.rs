// One error type for the whole app.
// Every variant states *where* things went wrong.
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Window init error: {0}")]
    WindowInit(String), // Creating the window failed
    #[error("Window update error: {0}")]
    WindowUpdate(String), // Updating the window buffer failed
    #[error("Camera init error: {0}")]
    CameraInit(String), // Opening/starting the camera failed
    #[error("Camera frame error: {0}")]
    CameraFrame(String), // Grabbing/decoding a frame failed
    #[error("Landmark detector error: {0}")]
    Detector(String), // The external landmark detector misbehaved
    #[error("Ledger I/O error at {path:?}: {source}")]
    Ledger {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Ledger record error: {0}")]
    LedgerFormat(#[from] serde_json::Error),
    #[error("Export to {path:?} failed: {source}")]
    Export {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Settings error: {0}")]
    Settings(String),
}
