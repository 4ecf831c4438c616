//! Job record definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::{ErrorCode, JobParams, Stage, VideoInfo};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle status.
///
/// Transitions are monotonic and one-directional:
/// `Queued -> Processing -> {Completed | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the FIFO queue
    #[default]
    Queued,
    /// Claimed by the scheduler and running through the pipeline
    Processing,
    /// Pipeline finished, final artifact available
    Completed,
    /// Pipeline failed, error descriptor populated
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-stage artifact paths recorded as the pipeline advances.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobArtifacts {
    /// Tracking stage output (per-frame subject data)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_data: Option<PathBuf>,
    /// Single-subject motion extracted from the tracking result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_motion: Option<PathBuf>,
    /// Temporally smoothed motion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smoothed_motion: Option<PathBuf>,
    /// Final rig/animation export
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_file: Option<PathBuf>,
}

impl JobArtifacts {
    /// All recorded paths, final artifact last.
    pub fn all_paths(&self) -> Vec<PathBuf> {
        [
            &self.tracking_data,
            &self.extracted_motion,
            &self.smoothed_motion,
            &self.export_file,
        ]
        .into_iter()
        .flatten()
        .cloned()
        .collect()
    }

    /// Intermediate paths only (everything except the final export).
    pub fn intermediate_paths(&self) -> Vec<PathBuf> {
        [
            &self.tracking_data,
            &self.extracted_motion,
            &self.smoothed_motion,
        ]
        .into_iter()
        .flatten()
        .cloned()
        .collect()
    }
}

/// Error descriptor carried by a failed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub code: ErrorCode,
    pub message: String,
    /// Truncated diagnostic output from the failing tool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Stage that was executing when the failure occurred
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,
}

/// One submitted video-to-artifact conversion request and its tracked state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,

    /// Stage label, meaningful only while `Processing`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<Stage>,

    /// Progress percentage (0-100), non-decreasing while processing
    pub progress: u8,

    /// Input video as saved by the upload layer
    pub video_path: PathBuf,

    /// Metadata probed at admission time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_info: Option<VideoInfo>,

    /// Tuning parameters submitted with the job
    pub params: JobParams,

    /// Artifacts recorded stage by stage
    #[serde(default)]
    pub artifacts: JobArtifacts,

    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,

    /// Wall-clock processing time in seconds, set on completion or failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
}

impl Job {
    /// Create a freshly queued job record.
    pub fn new(video_path: PathBuf, video_info: Option<VideoInfo>, params: JobParams) -> Self {
        Self {
            id: JobId::new(),
            status: JobStatus::Queued,
            current_stage: None,
            progress: 0,
            video_path,
            video_info,
            params,
            artifacts: JobArtifacts::default(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            processing_time: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_queued_at_zero_progress() {
        let job = Job::new(PathBuf::from("/uploads/a.mp4"), None, JobParams::default());
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0);
        assert!(job.started_at.is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn artifact_paths_preserve_stage_order() {
        let artifacts = JobArtifacts {
            tracking_data: Some(PathBuf::from("/tmp/t.json")),
            extracted_motion: Some(PathBuf::from("/tmp/e.npz")),
            smoothed_motion: None,
            export_file: Some(PathBuf::from("/results/out.fbx")),
        };
        assert_eq!(
            artifacts.all_paths(),
            vec![
                PathBuf::from("/tmp/t.json"),
                PathBuf::from("/tmp/e.npz"),
                PathBuf::from("/results/out.fbx"),
            ]
        );
        assert_eq!(artifacts.intermediate_paths().len(), 2);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }
}
