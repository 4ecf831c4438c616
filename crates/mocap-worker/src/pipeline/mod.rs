//! The four-stage conversion pipeline.
//!
//! Drives one job through tracking, extraction, smoothing, and export
//! against the configured external tools. Each stage runs under its own
//! timeout; any failure triggers best-effort deletion of every artifact
//! produced so far.

pub mod tracks;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::fs;
use tracing::{info, warn};

use mocap_media::{classify_diagnostics, MediaError, ToolCommand, ToolOutput, ToolRunner};
use mocap_models::{ErrorCode, Job, JobArtifacts, JobId, JobParams, Stage};
use mocap_registry::ProgressSender;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

/// Successful pipeline run: all four artifact paths plus total elapsed time.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub artifacts: JobArtifacts,
    pub elapsed: Duration,
}

/// Structured pipeline failure.
///
/// `partial` names the artifacts produced before the failure for
/// diagnostics; the files themselves have already been cleaned up.
#[derive(Debug, Clone)]
pub struct PipelineFailure {
    pub stage: Stage,
    pub code: ErrorCode,
    pub message: String,
    pub detail: Option<String>,
    pub partial: JobArtifacts,
    pub elapsed: Duration,
}

/// Job parameters with service defaults applied.
#[derive(Debug, Clone)]
struct EffectiveParams {
    track_id: Option<u32>,
    fps: u32,
    with_root_motion: bool,
    cam_scale: f64,
    smoothing_strength: f64,
    smoothing_window: u32,
    smoothing_ema: f64,
}

impl EffectiveParams {
    fn resolve(params: &JobParams, config: &WorkerConfig) -> Self {
        Self {
            track_id: params.track_id,
            fps: params.fps.unwrap_or(config.default_fps),
            with_root_motion: params
                .with_root_motion
                .unwrap_or(config.default_with_root_motion),
            cam_scale: params.cam_scale.unwrap_or(config.default_cam_scale),
            smoothing_strength: params
                .smoothing_strength
                .unwrap_or(config.default_smoothing_strength),
            smoothing_window: params
                .smoothing_window
                .unwrap_or(config.default_smoothing_window),
            smoothing_ema: params.smoothing_ema.unwrap_or(config.default_smoothing_ema),
        }
    }
}

/// Failure of a single stage, before it is wrapped into a [`PipelineFailure`].
struct StageFailure {
    code: ErrorCode,
    message: String,
    detail: Option<String>,
}

type StageResult<T> = Result<T, StageFailure>;

/// Executes the four ordered stages for one job.
pub struct MocapPipeline {
    config: Arc<WorkerConfig>,
}

impl MocapPipeline {
    /// Create the pipeline, verifying the Blender scripts are present.
    ///
    /// The stage executables are resolved at invocation time; a missing one
    /// fails the job, not the service.
    pub fn new(config: Arc<WorkerConfig>) -> WorkerResult<Self> {
        for script in [&config.export_script, &config.strip_script] {
            if !script.exists() {
                return Err(WorkerError::config_error(format!(
                    "Required script not found: {}",
                    script.display()
                )));
            }
        }
        for bin in [
            &config.tracker_bin,
            &config.extractor_bin,
            &config.smoother_bin,
            &config.blender_bin,
        ] {
            if which::which(bin).is_err() {
                warn!("Stage executable not resolvable yet: {}", bin.display());
            }
        }
        Ok(Self { config })
    }

    /// Run the full pipeline for one job.
    pub async fn run(
        &self,
        job: &Job,
        progress: &ProgressSender,
    ) -> Result<PipelineOutput, PipelineFailure> {
        let start = Instant::now();
        let params = EffectiveParams::resolve(&job.params, &self.config);
        let mut produced = JobArtifacts::default();

        macro_rules! stage {
            ($stage:expr, $result:expr) => {
                match $result {
                    Ok(path) => path,
                    Err(failure) => {
                        self.cleanup_artifacts(&job.id, &produced).await;
                        return Err(PipelineFailure {
                            stage: $stage,
                            code: failure.code,
                            message: failure.message,
                            detail: failure.detail,
                            partial: produced,
                            elapsed: start.elapsed(),
                        });
                    }
                }
            };
        }

        let tracking = stage!(Stage::Tracking, self.run_tracking(job, progress).await);
        produced.tracking_data = Some(tracking.clone());

        let extracted = stage!(
            Stage::Extraction,
            self.run_extraction(&job.id, &tracking, params.track_id, progress)
                .await
        );
        produced.extracted_motion = Some(extracted.clone());

        let smoothed = stage!(
            Stage::Smoothing,
            self.run_smoothing(&job.id, &extracted, &params, progress).await
        );
        produced.smoothed_motion = Some(smoothed.clone());

        let export = stage!(
            Stage::Export,
            self.run_export(&job.id, &smoothed, &params, progress).await
        );
        produced.export_file = Some(export);

        progress.report(&job.id, 100);
        let elapsed = start.elapsed();
        info!(job_id = %job.id, elapsed_secs = elapsed.as_secs_f64(), "Pipeline completed");

        Ok(PipelineOutput {
            artifacts: produced,
            elapsed,
        })
    }

    /// Stage 1: multi-subject tracking.
    ///
    /// The input path must be confined to the upload directory; the tool's
    /// output is relocated to a job-scoped canonical path afterwards.
    async fn run_tracking(&self, job: &Job, progress: &ProgressSender) -> StageResult<PathBuf> {
        self.confine_to_upload_dir(&job.video_path).await?;
        progress.report(&job.id, 10);

        let cmd = ToolCommand::new(&self.config.tracker_bin)
            .arg("--source")
            .path_arg(&job.video_path)
            .arg("--output-dir")
            .path_arg(&self.config.output_dir);

        self.invoke(Stage::Tracking, &cmd, self.config.tracking_timeout)
            .await?;

        // The tracker names its output after the video, in a directory
        // shared by all jobs.
        let stem = job
            .video_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let raw_output = self
            .config
            .output_dir
            .join("results")
            .join(format!("demo_{stem}.json"));
        self.verify_output(Stage::Tracking, &raw_output).await?;

        let canonical = self
            .config
            .temp_dir
            .join(format!("{}_tracking.json", job.id));
        mocap_media::move_file(&raw_output, &canonical)
            .await
            .map_err(|e| self.classify(Stage::Tracking, e))?;

        progress.report(&job.id, 30);
        Ok(canonical)
    }

    /// Stage 2: single-subject extraction.
    async fn run_extraction(
        &self,
        job_id: &JobId,
        tracking: &Path,
        track_id: Option<u32>,
        progress: &ProgressSender,
    ) -> StageResult<PathBuf> {
        progress.report(job_id, 35);

        let track_id = match track_id {
            Some(tid) => tid,
            None => {
                let frames = tracks::load_tracking(tracking)
                    .await
                    .map_err(|e| self.classify(Stage::Extraction, e))?;
                tracks::select_longest_track(&frames).ok_or_else(|| StageFailure {
                    code: ErrorCode::NoTracksFound,
                    message: "No tracks found in tracking result".to_string(),
                    detail: None,
                })?
            }
        };
        info!(job_id = %job_id, track_id, "Extracting track");

        let output = self
            .config
            .temp_dir
            .join(format!("{job_id}_tid{track_id}_extracted.npz"));
        let cmd = ToolCommand::new(&self.config.extractor_bin)
            .arg("--tracks")
            .path_arg(tracking)
            .arg("--out")
            .path_arg(&output)
            .arg("--tid")
            .arg(track_id.to_string());

        self.invoke(Stage::Extraction, &cmd, self.config.extraction_timeout)
            .await?;
        self.verify_output(Stage::Extraction, &output).await?;

        progress.report(job_id, 45);
        Ok(output)
    }

    /// Stage 3: temporal smoothing. Strength/window/EMA pass through
    /// unchanged.
    async fn run_smoothing(
        &self,
        job_id: &JobId,
        extracted: &Path,
        params: &EffectiveParams,
        progress: &ProgressSender,
    ) -> StageResult<PathBuf> {
        progress.report(job_id, 50);

        let output = self.config.temp_dir.join(format!("{job_id}_smoothed.npz"));
        let cmd = ToolCommand::new(&self.config.smoother_bin)
            .arg("--input")
            .path_arg(extracted)
            .arg("--out")
            .path_arg(&output)
            .arg("--ckpt")
            .path_arg(&self.config.smoothing_checkpoint)
            .arg("--win")
            .arg(params.smoothing_window.to_string())
            .arg("--ema")
            .arg(params.smoothing_ema.to_string())
            .arg("--strength")
            .arg(params.smoothing_strength.to_string());

        self.invoke(Stage::Smoothing, &cmd, self.config.smoothing_timeout)
            .await?;
        self.verify_output(Stage::Smoothing, &output).await?;

        progress.report(job_id, 70);
        Ok(output)
    }

    /// Stage 4: rig/animation export via headless Blender, followed by the
    /// best-effort mesh-strip sub-stage.
    async fn run_export(
        &self,
        job_id: &JobId,
        smoothed: &Path,
        params: &EffectiveParams,
        progress: &ProgressSender,
    ) -> StageResult<PathBuf> {
        progress.report(job_id, 75);

        let suffix = if params.with_root_motion {
            "_rootmotion"
        } else {
            ""
        };
        let output = self.config.result_dir.join(format!("{job_id}{suffix}.fbx"));

        let mut cmd = ToolCommand::new(&self.config.blender_bin)
            .arg("-b")
            .arg("-P")
            .path_arg(&self.config.export_script)
            .arg("--")
            .arg("--input")
            .path_arg(smoothed)
            .arg("--out")
            .path_arg(&output)
            .arg("--fps")
            .arg(params.fps.to_string())
            .arg("--cam-scale")
            .arg(params.cam_scale.to_string());
        if !params.with_root_motion {
            cmd = cmd.arg("--no-root-motion");
        }

        self.invoke(Stage::Export, &cmd, self.config.export_timeout)
            .await?;
        self.verify_output(Stage::Export, &output).await?;

        let final_output = self.strip_mesh(job_id, &output).await;

        progress.report(job_id, 95);
        Ok(final_output)
    }

    /// Best-effort sub-stage: strip mesh data from the export, keeping
    /// skeleton and animation, to shrink the download.
    ///
    /// Never fatal: any failure keeps the original (heavier) artifact.
    async fn strip_mesh(&self, job_id: &JobId, export: &Path) -> PathBuf {
        let stripped = self.config.result_dir.join(format!("{job_id}_skeleton.fbx"));
        let cmd = ToolCommand::new(&self.config.blender_bin)
            .arg("-b")
            .arg("-P")
            .path_arg(&self.config.strip_script)
            .arg("--")
            .arg("--input")
            .path_arg(export)
            .arg("--out")
            .path_arg(&stripped);

        let runner = ToolRunner::new(self.config.export_timeout)
            .with_kill_grace(self.config.kill_grace);
        match runner.run(&cmd).await {
            Ok(_) if matches!(fs::try_exists(&stripped).await, Ok(true)) => {
                if let Err(e) = fs::remove_file(export).await {
                    warn!(job_id = %job_id, "Failed to delete heavy export: {}", e);
                }
                info!(job_id = %job_id, "Mesh strip succeeded");
                stripped
            }
            Ok(_) => {
                warn!(job_id = %job_id, "Mesh strip reported success but produced no file");
                export.to_path_buf()
            }
            Err(e) => {
                warn!(job_id = %job_id, "Mesh strip failed, keeping full export: {}", e);
                export.to_path_buf()
            }
        }
    }

    /// Run one stage command and classify any failure.
    async fn invoke(
        &self,
        stage: Stage,
        cmd: &ToolCommand,
        timeout: Duration,
    ) -> StageResult<ToolOutput> {
        info!(stage = %stage, "Starting stage");
        let runner = ToolRunner::new(timeout).with_kill_grace(self.config.kill_grace);
        let result = runner.run(cmd).await.map_err(|e| self.classify(stage, e));
        match &result {
            Ok(out) => {
                info!(stage = %stage, elapsed_secs = out.elapsed.as_secs_f64(), "Stage completed")
            }
            Err(failure) => {
                warn!(stage = %stage, code = %failure.code, "Stage failed: {}", failure.message)
            }
        }
        result
    }

    /// Re-verify the expected output with a fresh filesystem check.
    ///
    /// The tool reporting success and the output becoming visible are two
    /// separate events; absence here is a stage failure.
    async fn verify_output(&self, stage: Stage, path: &Path) -> StageResult<()> {
        match fs::try_exists(path).await {
            Ok(true) => Ok(()),
            _ => Err(StageFailure {
                code: ErrorCode::stage_default(stage),
                message: format!("{} output file not found: {}", stage, path.display()),
                detail: None,
            }),
        }
    }

    /// Reject inputs outside the authorized upload directory tree.
    async fn confine_to_upload_dir(&self, video: &Path) -> StageResult<()> {
        let denied = || StageFailure {
            code: ErrorCode::InvalidRequest,
            message: format!(
                "Input video outside the upload directory: {}",
                video.display()
            ),
            detail: None,
        };

        let video = fs::canonicalize(video).await.map_err(|_| denied())?;
        let upload_root = fs::canonicalize(&self.config.upload_dir)
            .await
            .map_err(|_| denied())?;
        if video.starts_with(&upload_root) {
            Ok(())
        } else {
            Err(denied())
        }
    }

    /// Convert a low-level invocation error into a stage failure, checking
    /// tool diagnostics for resource-exhaustion signatures before falling
    /// back to the stage default code.
    fn classify(&self, stage: Stage, err: MediaError) -> StageFailure {
        match err {
            MediaError::Timeout(secs) => StageFailure {
                code: ErrorCode::TaskTimeout,
                message: format!("{} timed out after {}s", stage, secs),
                detail: None,
            },
            MediaError::ToolFailed {
                message,
                stderr,
                exit_code: _,
            } => {
                let code = stderr
                    .as_deref()
                    .and_then(classify_diagnostics)
                    .unwrap_or_else(|| ErrorCode::stage_default(stage));
                StageFailure {
                    code,
                    message,
                    detail: stderr,
                }
            }
            MediaError::DiskFull(message) => StageFailure {
                code: ErrorCode::DiskFull,
                message,
                detail: None,
            },
            MediaError::SecurityViolation(path) => StageFailure {
                code: ErrorCode::InvalidRequest,
                message: format!("Path outside the authorized tree: {}", path.display()),
                detail: None,
            },
            other => StageFailure {
                code: ErrorCode::InternalError,
                message: other.to_string(),
                detail: None,
            },
        }
    }

    /// Compensating cleanup: delete every artifact produced so far.
    /// Individual failures are logged, never raised.
    async fn cleanup_artifacts(&self, job_id: &JobId, produced: &JobArtifacts) {
        for path in produced.all_paths() {
            match fs::remove_file(&path).await {
                Ok(()) => info!(job_id = %job_id, "Cleaned up artifact: {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(job_id = %job_id, "Failed to clean up {}: {}", path.display(), e)
                }
            }
        }
    }
}
