//! The scheduler loop.
//!
//! Claims queued jobs one at a time and drives each through the pipeline.
//! The loop runs from service start until the shutdown signal and never
//! terminates because of a single job's failure.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use mocap_models::Job;
use mocap_registry::{progress_channel, spawn_progress_forwarder, JobRegistry};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::pipeline::MocapPipeline;

pub struct Scheduler {
    registry: Arc<JobRegistry>,
    pipeline: Arc<MocapPipeline>,
    config: Arc<WorkerConfig>,
    shutdown: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new(
        registry: Arc<JobRegistry>,
        pipeline: Arc<MocapPipeline>,
        config: Arc<WorkerConfig>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            registry,
            pipeline,
            config,
            shutdown,
        }
    }

    /// Handle used to request shutdown from another task.
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown.clone()
    }

    /// Run until the shutdown signal.
    ///
    /// A job already mid-pipeline when the signal arrives finishes or fails
    /// under its own stage timeouts; the loop exits at its next suspension
    /// point.
    pub async fn run(&self) {
        info!("Scheduler started");
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            match self.registry.next_queued() {
                Some(job) => {
                    if let Err(e) = self.process_job(job).await {
                        // One job must never stop the loop; log and back off.
                        error!("Scheduler cycle error: {}", e);
                        tokio::time::sleep(self.config.error_backoff).await;
                    }
                }
                None => {
                    tokio::select! {
                        _ = shutdown_rx.changed() => {}
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
            }
        }

        info!("Scheduler stopped");
    }

    /// Drive one claimed job through the pipeline and finalize it.
    ///
    /// The pipeline's process waits are suspension points, so concurrent
    /// registry reads and the progress forwarder keep running while a stage
    /// executes.
    async fn process_job(&self, job: Job) -> WorkerResult<()> {
        info!(job_id = %job.id, "Processing job");

        let (progress_tx, progress_rx) = progress_channel();
        let forwarder = spawn_progress_forwarder(Arc::clone(&self.registry), progress_rx);

        let result = self.pipeline.run(&job, &progress_tx).await;

        // Flush pending stage updates before finalizing.
        drop(progress_tx);
        let _ = forwarder.await;

        let finalized = match result {
            Ok(output) => self.registry.complete(&job.id, output.artifacts),
            Err(failure) => {
                let detail = match (&failure.detail, failure.stage) {
                    (Some(detail), stage) => Some(format!("Failed at stage: {stage}\n{detail}")),
                    (None, stage) => Some(format!("Failed at stage: {stage}")),
                };
                self.registry.fail(
                    &job.id,
                    failure.code,
                    failure.message,
                    detail,
                    Some(failure.stage),
                )
            }
        };

        if !finalized {
            return Err(WorkerError::internal(format!(
                "Job {} could not be finalized (record missing or not processing)",
                job.id
            )));
        }
        Ok(())
    }

    /// Periodic retention sweep, spawned alongside the scheduler.
    pub async fn run_sweeper(&self) {
        let completed = chrono::Duration::from_std(self.config.completed_retention)
            .unwrap_or_else(|_| chrono::Duration::hours(72));
        let failed = chrono::Duration::from_std(self.config.failed_retention)
            .unwrap_or_else(|_| chrono::Duration::hours(72));

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut interval = tokio::time::interval(self.config.sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        interval.tick().await; // immediate first tick

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    self.registry.sweep(completed, failed).await;
                    // The tracker's shared output directory accumulates
                    // leftovers no job record points at.
                    mocap_media::sweep_stale_entries(
                        &self.config.output_dir,
                        self.config.completed_retention,
                    )
                    .await;
                }
            }
        }
    }
}

// Scheduler behavior is covered by the integration tests in
// tests/scheduler_loop.rs, which drive real (stubbed) tool processes.
