//! Video metadata.

use serde::{Deserialize, Serialize};

/// Metadata probed from an input video at admission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: u64,
    /// Duration in seconds
    pub duration: f64,
}
