//! Read-only snapshots served to the administrative surface.

use serde::{Deserialize, Serialize};

use crate::{JobId, Stage};

/// Snapshot of the job currently being processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentJobSnapshot {
    pub job_id: JobId,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<Stage>,
}

/// A queued job and its 1-based position in the wait queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJobSnapshot {
    pub job_id: JobId,
    pub position: usize,
}

/// Wait-queue occupancy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueInfo {
    pub queue_size: usize,
    pub max_queue_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_job: Option<CurrentJobSnapshot>,
    pub queued_jobs: Vec<QueuedJobSnapshot>,
}

/// Aggregate registry statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Seconds since the registry was constructed
    pub uptime: u64,
    pub total_jobs: u64,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
    pub active_jobs: usize,
    pub queued_jobs: usize,
    /// completed / total, 0.0 when no jobs were ever submitted
    pub success_rate: f64,
    /// Mean processing time of completed jobs still in the registry, seconds
    pub average_processing_time: f64,
}
