//! Pipeline stage definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the ordered processing stages of the conversion pipeline.
///
/// `Packaging` is not an external tool invocation; it is the coarse label
/// reported while the final artifacts are being wired into the job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Multi-subject tracking over the input video
    Tracking,
    /// Single-subject motion extraction from the tracking result
    Extraction,
    /// Neural temporal smoothing of the extracted motion
    Smoothing,
    /// Rig/animation (FBX) export
    Export,
    /// Final artifact bookkeeping
    Packaging,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Tracking => "tracking",
            Stage::Extraction => "extraction",
            Stage::Smoothing => "smoothing",
            Stage::Export => "export",
            Stage::Packaging => "packaging",
        }
    }

    /// Derive the coarse stage label from an overall progress percentage.
    ///
    /// The pipeline reports plain percentages; the bands here mirror the
    /// checkpoints each stage reports (tracking ends at 30, extraction at 45,
    /// smoothing at 70, export at 95).
    pub fn from_progress(progress: u8) -> Self {
        match progress {
            0..=29 => Stage::Tracking,
            30..=44 => Stage::Extraction,
            45..=69 => Stage::Smoothing,
            70..=94 => Stage::Export,
            _ => Stage::Packaging,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_bands_match_stage_checkpoints() {
        assert_eq!(Stage::from_progress(0), Stage::Tracking);
        assert_eq!(Stage::from_progress(29), Stage::Tracking);
        assert_eq!(Stage::from_progress(30), Stage::Extraction);
        assert_eq!(Stage::from_progress(44), Stage::Extraction);
        assert_eq!(Stage::from_progress(45), Stage::Smoothing);
        assert_eq!(Stage::from_progress(69), Stage::Smoothing);
        assert_eq!(Stage::from_progress(70), Stage::Export);
        assert_eq!(Stage::from_progress(94), Stage::Export);
        assert_eq!(Stage::from_progress(95), Stage::Packaging);
        assert_eq!(Stage::from_progress(100), Stage::Packaging);
    }
}
