//! Stable error codes surfaced to clients.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Stage;

/// Stable, user-visible error code attached to a failed job.
///
/// The serialized form is the SCREAMING_SNAKE_CASE string clients match on;
/// new codes may be added but existing ones never change meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Unexpected failure outside the external tools
    InternalError,
    /// Bad parameters or a disallowed input path
    InvalidRequest,
    /// A stage exceeded its time budget
    TaskTimeout,
    /// Tracking tool failed or produced no output
    TrackingFailed,
    /// Extraction tool failed or produced no output
    ExtractionFailed,
    /// Tracking result contained no subjects to extract
    NoTracksFound,
    /// Smoothing tool failed or produced no output
    SmoothingFailed,
    /// Export tool failed or produced no output
    ExportFailed,
    /// Tool diagnostics indicated accelerator memory exhaustion
    GpuOutOfMemory,
    /// Tool diagnostics or the filesystem indicated disk exhaustion
    DiskFull,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::TaskTimeout => "TASK_TIMEOUT",
            ErrorCode::TrackingFailed => "TRACKING_FAILED",
            ErrorCode::ExtractionFailed => "EXTRACTION_FAILED",
            ErrorCode::NoTracksFound => "NO_TRACKS_FOUND",
            ErrorCode::SmoothingFailed => "SMOOTHING_FAILED",
            ErrorCode::ExportFailed => "EXPORT_FAILED",
            ErrorCode::GpuOutOfMemory => "GPU_OUT_OF_MEMORY",
            ErrorCode::DiskFull => "DISK_FULL",
        }
    }

    /// The default code for a tool failure in the given stage.
    pub fn stage_default(stage: Stage) -> Self {
        match stage {
            Stage::Tracking => ErrorCode::TrackingFailed,
            Stage::Extraction => ErrorCode::ExtractionFailed,
            Stage::Smoothing => ErrorCode::SmoothingFailed,
            Stage::Export => ErrorCode::ExportFailed,
            Stage::Packaging => ErrorCode::InternalError,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::NoTracksFound).unwrap();
        assert_eq!(json, "\"NO_TRACKS_FOUND\"");
    }

    #[test]
    fn stage_defaults() {
        assert_eq!(
            ErrorCode::stage_default(Stage::Tracking),
            ErrorCode::TrackingFailed
        );
        assert_eq!(
            ErrorCode::stage_default(Stage::Export),
            ErrorCode::ExportFailed
        );
    }
}
