//! Frames written to a job's scratch directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A still frame at the target resolution, ready to be sequenced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedFrame {
    /// PNG inside the job's scratch directory
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Original photo, or `None` for the title slide
    pub source: Option<PathBuf>,
}

impl PreparedFrame {
    pub fn is_title(&self) -> bool {
        self.source.is_none()
    }
}

/// `frame_NNN.png` inside `dir`. Index 0 is reserved for the title slide.
pub fn frame_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("frame_{:03}.png", index))
}
