//! The job registry.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};
use validator::Validate;

use mocap_media::FileStore;
use mocap_models::{
    CurrentJobSnapshot, ErrorCode, Job, JobArtifacts, JobError, JobId, JobParams, JobStatus,
    QueueInfo, QueuedJobSnapshot, RegistryStats, Stage, VideoInfo,
};

use crate::error::{RegistryError, RegistryResult};

/// Cap on the diagnostic detail stored with a failed job.
const ERROR_DETAIL_MAX: usize = 2000;

struct Inner {
    jobs: HashMap<JobId, Job>,
    queue: VecDeque<JobId>,
    current: Option<JobId>,
    total_jobs: u64,
    completed_jobs: u64,
    failed_jobs: u64,
}

/// Owns job records, the FIFO wait queue, the single current-job slot, and
/// aggregate counters.
///
/// Every operation takes the single internal lock, so all mutations are
/// atomic with respect to each other; request-layer reads may run
/// concurrently with the scheduler's claim/complete/fail cycle. File
/// deletion is delegated to the injected [`FileStore`] and happens outside
/// the lock.
pub struct JobRegistry {
    inner: Mutex<Inner>,
    files: Arc<FileStore>,
    max_queue_size: usize,
    start_time: DateTime<Utc>,
}

impl JobRegistry {
    pub fn new(files: Arc<FileStore>, max_queue_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                jobs: HashMap::new(),
                queue: VecDeque::new(),
                current: None,
                total_jobs: 0,
                completed_jobs: 0,
                failed_jobs: 0,
            }),
            files,
            max_queue_size,
            start_time: Utc::now(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Inner operations never panic while holding the lock.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a new job and append it to the queue tail.
    pub fn create(
        &self,
        video_path: PathBuf,
        video_info: Option<VideoInfo>,
        params: JobParams,
    ) -> RegistryResult<Job> {
        params
            .validate()
            .map_err(|e| RegistryError::InvalidParams(e.to_string()))?;

        let mut inner = self.lock();
        if inner.queue.len() >= self.max_queue_size {
            return Err(RegistryError::QueueFull {
                max: self.max_queue_size,
            });
        }

        let job = Job::new(video_path, video_info, params);
        inner.queue.push_back(job.id.clone());
        inner.jobs.insert(job.id.clone(), job.clone());
        inner.total_jobs += 1;

        info!(job_id = %job.id, "Created job");
        Ok(job)
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.lock().jobs.get(id).cloned()
    }

    pub fn list(&self) -> Vec<Job> {
        self.lock().jobs.values().cloned().collect()
    }

    /// Whether the queue has reached its admission bound.
    pub fn is_queue_full(&self) -> bool {
        self.lock().queue.len() >= self.max_queue_size
    }

    /// Claim the next queued job for processing.
    ///
    /// Returns `None` while another job occupies the current slot, keeping
    /// at most one job `Processing` system-wide.
    pub fn next_queued(&self) -> Option<Job> {
        let mut inner = self.lock();
        if inner.current.is_some() {
            return None;
        }

        let id = inner.queue.pop_front()?;
        inner.current = Some(id.clone());
        let job = inner
            .jobs
            .get_mut(&id)
            .expect("queued id always has a record");
        job.status = JobStatus::Processing;
        job.started_at = Some(Utc::now());

        info!(job_id = %id, "Started processing job");
        Some(job.clone())
    }

    /// Update the stage label and progress of a processing job.
    ///
    /// Unknown ids are a no-op: a progress report may race a deletion and
    /// that is not an error. Progress never decreases.
    pub fn update_stage(&self, id: &JobId, stage: Stage, progress: u8) {
        let mut inner = self.lock();
        let Some(job) = inner.jobs.get_mut(id) else {
            return;
        };
        if job.status != JobStatus::Processing {
            return;
        }
        job.current_stage = Some(stage);
        job.progress = job.progress.max(progress.min(100));
        debug!(job_id = %id, stage = %stage, progress = job.progress, "Stage update");
    }

    /// Finalize a processing job as completed. Returns false if the job is
    /// unknown or not processing.
    pub fn complete(&self, id: &JobId, artifacts: JobArtifacts) -> bool {
        let mut inner = self.lock();
        let Some(job) = inner.jobs.get_mut(id) else {
            warn!(job_id = %id, "complete() on unknown job");
            return false;
        };
        if job.status != JobStatus::Processing {
            warn!(job_id = %id, status = %job.status, "complete() on non-processing job");
            return false;
        }

        let now = Utc::now();
        job.status = JobStatus::Completed;
        job.completed_at = Some(now);
        job.artifacts = artifacts;
        job.progress = 100;
        job.current_stage = None;
        if let Some(started) = job.started_at {
            job.processing_time = Some((now - started).num_milliseconds() as f64 / 1000.0);
        }
        let elapsed = job.processing_time.unwrap_or(0.0);

        inner.current = None;
        inner.completed_jobs += 1;

        info!(job_id = %id, elapsed_secs = elapsed, "Completed job");
        true
    }

    /// Finalize a processing job as failed. Returns false if the job is
    /// unknown or not processing.
    pub fn fail(
        &self,
        id: &JobId,
        code: ErrorCode,
        message: impl Into<String>,
        detail: Option<String>,
        failed_stage: Option<Stage>,
    ) -> bool {
        let mut inner = self.lock();
        let Some(job) = inner.jobs.get_mut(id) else {
            warn!(job_id = %id, "fail() on unknown job");
            return false;
        };
        if job.status != JobStatus::Processing {
            warn!(job_id = %id, status = %job.status, "fail() on non-processing job");
            return false;
        }

        let now = Utc::now();
        let message = message.into();
        job.status = JobStatus::Failed;
        job.completed_at = Some(now);
        job.current_stage = None;
        job.error = Some(JobError {
            code,
            message: message.clone(),
            detail: detail.map(|d| truncate(&d, ERROR_DETAIL_MAX)),
            failed_stage,
        });
        if let Some(started) = job.started_at {
            job.processing_time = Some((now - started).num_milliseconds() as f64 / 1000.0);
        }

        inner.current = None;
        inner.failed_jobs += 1;

        error!(job_id = %id, code = %code, "Failed job: {}", message);
        true
    }

    /// Delete a job and request deletion of its files.
    ///
    /// Deleting the job currently being processed is disallowed; callers
    /// must wait for it to finish or fail under its own stage timeouts.
    /// Returns `Ok(false)` for an unknown id.
    pub async fn delete(&self, id: &JobId, keep_intermediate: bool) -> RegistryResult<bool> {
        let paths = {
            let mut inner = self.lock();
            if inner.current.as_ref() == Some(id) {
                return Err(RegistryError::JobProcessing(id.clone()));
            }
            let Some(job) = inner.jobs.remove(id) else {
                return Ok(false);
            };
            inner.queue.retain(|queued| queued != id);

            let mut paths = vec![job.video_path.clone()];
            if let Some(export) = &job.artifacts.export_file {
                paths.push(export.clone());
            }
            if !keep_intermediate {
                paths.extend(job.artifacts.intermediate_paths());
            }
            paths
        };

        // File deletion happens outside the critical section. The temp
        // sweep removes anything under the job-id prefix, so it is skipped
        // when intermediates are kept.
        self.files
            .delete_job_files(id.as_str(), &paths, !keep_intermediate)
            .await;

        info!(job_id = %id, "Deleted job");
        Ok(true)
    }

    pub fn queue_info(&self) -> QueueInfo {
        let inner = self.lock();

        let current_job = inner.current.as_ref().and_then(|id| {
            inner.jobs.get(id).map(|job| CurrentJobSnapshot {
                job_id: job.id.clone(),
                progress: job.progress,
                current_stage: job.current_stage,
            })
        });

        let queued_jobs = inner
            .queue
            .iter()
            .enumerate()
            .map(|(idx, id)| QueuedJobSnapshot {
                job_id: id.clone(),
                position: idx + 1,
            })
            .collect();

        QueueInfo {
            queue_size: inner.queue.len(),
            max_queue_size: self.max_queue_size,
            current_job,
            queued_jobs,
        }
    }

    pub fn stats(&self) -> RegistryStats {
        let inner = self.lock();

        let success_rate = if inner.total_jobs > 0 {
            inner.completed_jobs as f64 / inner.total_jobs as f64
        } else {
            0.0
        };

        let completed_times: Vec<f64> = inner
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Completed)
            .filter_map(|j| j.processing_time)
            .collect();
        let average_processing_time = if completed_times.is_empty() {
            0.0
        } else {
            completed_times.iter().sum::<f64>() / completed_times.len() as f64
        };

        RegistryStats {
            uptime: (Utc::now() - self.start_time).num_seconds().max(0) as u64,
            total_jobs: inner.total_jobs,
            completed_jobs: inner.completed_jobs,
            failed_jobs: inner.failed_jobs,
            active_jobs: usize::from(inner.current.is_some()),
            queued_jobs: inner.queue.len(),
            success_rate,
            average_processing_time,
        }
    }

    /// Age-based deletion of terminal jobs past their retention window.
    /// Returns the number of jobs removed.
    pub async fn sweep(
        &self,
        completed_retention: Duration,
        failed_retention: Duration,
    ) -> usize {
        let now = Utc::now();
        let expired: Vec<JobId> = {
            let inner = self.lock();
            inner
                .jobs
                .values()
                .filter(|job| {
                    let Some(completed_at) = job.completed_at else {
                        return false;
                    };
                    match job.status {
                        JobStatus::Completed => now - completed_at > completed_retention,
                        JobStatus::Failed => now - completed_at > failed_retention,
                        _ => false,
                    }
                })
                .map(|job| job.id.clone())
                .collect()
        };

        let mut removed = 0;
        for id in &expired {
            match self.delete(id, false).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!(job_id = %id, "Sweep skipped job: {}", e),
            }
        }

        if removed > 0 {
            info!("Swept {} expired jobs", removed);
        }
        removed
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
