//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Service configuration, environment-driven with typed defaults.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Directory uploads are saved into; tracking inputs must live here
    pub upload_dir: PathBuf,
    /// Shared directory the tracker writes its raw output into
    pub output_dir: PathBuf,
    /// Scratch directory for job-scoped intermediates
    pub temp_dir: PathBuf,
    /// Directory for final export artifacts
    pub result_dir: PathBuf,

    /// Subject tracking executable
    pub tracker_bin: PathBuf,
    /// Single-subject extraction executable
    pub extractor_bin: PathBuf,
    /// Temporal smoothing executable
    pub smoother_bin: PathBuf,
    /// Smoothing model checkpoint handed to the smoother
    pub smoothing_checkpoint: PathBuf,
    /// Blender binary for the export stage
    pub blender_bin: PathBuf,
    /// Blender script that exports the rig/animation
    pub export_script: PathBuf,
    /// Blender script that strips mesh data, keeping skeleton/animation
    pub strip_script: PathBuf,

    /// Per-stage wall-clock timeouts
    pub tracking_timeout: Duration,
    pub extraction_timeout: Duration,
    pub smoothing_timeout: Duration,
    pub export_timeout: Duration,
    /// Grace period granted to a force-killed process
    pub kill_grace: Duration,

    /// Scheduler idle poll interval
    pub poll_interval: Duration,
    /// Backoff after an unexpected scheduler-cycle error
    pub error_backoff: Duration,

    /// Wait-queue admission bound
    pub max_queue_size: usize,

    /// Interval between retention sweeps
    pub sweep_interval: Duration,
    /// Retention for completed jobs
    pub completed_retention: Duration,
    /// Retention for failed jobs
    pub failed_retention: Duration,

    /// Defaults applied when a job omits the tuning parameter
    pub default_fps: u32,
    pub default_with_root_motion: bool,
    pub default_cam_scale: f64,
    pub default_smoothing_strength: f64,
    pub default_smoothing_window: u32,
    pub default_smoothing_ema: f64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from("./data");
        Self {
            upload_dir: data_dir.join("uploads"),
            output_dir: data_dir.join("outputs"),
            temp_dir: data_dir.join("tmp"),
            result_dir: data_dir.join("results"),
            tracker_bin: PathBuf::from("mocap-tracker"),
            extractor_bin: PathBuf::from("mocap-extract-track"),
            smoother_bin: PathBuf::from("mocap-smooth"),
            smoothing_checkpoint: data_dir.join("checkpoints/smoothing.ckpt"),
            blender_bin: PathBuf::from("blender"),
            export_script: PathBuf::from("scripts/export_rig.py"),
            strip_script: PathBuf::from("scripts/strip_mesh.py"),
            tracking_timeout: Duration::from_secs(900),
            extraction_timeout: Duration::from_secs(60),
            smoothing_timeout: Duration::from_secs(120),
            export_timeout: Duration::from_secs(120),
            kill_grace: Duration::from_secs(5),
            poll_interval: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
            max_queue_size: 10,
            sweep_interval: Duration::from_secs(6 * 3600),
            completed_retention: Duration::from_secs(72 * 3600),
            failed_retention: Duration::from_secs(72 * 3600),
            default_fps: 30,
            default_with_root_motion: true,
            default_cam_scale: 1.0,
            default_smoothing_strength: 1.0,
            default_smoothing_window: 9,
            default_smoothing_ema: 0.2,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            upload_dir: env_path("MOCAP_UPLOAD_DIR", defaults.upload_dir),
            output_dir: env_path("MOCAP_OUTPUT_DIR", defaults.output_dir),
            temp_dir: env_path("MOCAP_TEMP_DIR", defaults.temp_dir),
            result_dir: env_path("MOCAP_RESULT_DIR", defaults.result_dir),
            tracker_bin: env_path("MOCAP_TRACKER_BIN", defaults.tracker_bin),
            extractor_bin: env_path("MOCAP_EXTRACTOR_BIN", defaults.extractor_bin),
            smoother_bin: env_path("MOCAP_SMOOTHER_BIN", defaults.smoother_bin),
            smoothing_checkpoint: env_path(
                "MOCAP_SMOOTHING_CHECKPOINT",
                defaults.smoothing_checkpoint,
            ),
            blender_bin: env_path("MOCAP_BLENDER_BIN", defaults.blender_bin),
            export_script: env_path("MOCAP_EXPORT_SCRIPT", defaults.export_script),
            strip_script: env_path("MOCAP_STRIP_SCRIPT", defaults.strip_script),
            tracking_timeout: env_secs("MOCAP_TRACKING_TIMEOUT_SECS", 900),
            extraction_timeout: env_secs("MOCAP_EXTRACTION_TIMEOUT_SECS", 60),
            smoothing_timeout: env_secs("MOCAP_SMOOTHING_TIMEOUT_SECS", 120),
            export_timeout: env_secs("MOCAP_EXPORT_TIMEOUT_SECS", 120),
            kill_grace: env_secs("MOCAP_KILL_GRACE_SECS", 5),
            poll_interval: env_secs("MOCAP_POLL_INTERVAL_SECS", 1),
            error_backoff: env_secs("MOCAP_ERROR_BACKOFF_SECS", 5),
            max_queue_size: env_parse("MOCAP_MAX_QUEUE_SIZE", 10),
            sweep_interval: env_secs("MOCAP_SWEEP_INTERVAL_SECS", 6 * 3600),
            completed_retention: env_secs("MOCAP_COMPLETED_RETENTION_SECS", 72 * 3600),
            failed_retention: env_secs("MOCAP_FAILED_RETENTION_SECS", 72 * 3600),
            default_fps: env_parse("MOCAP_DEFAULT_FPS", 30),
            default_with_root_motion: env_parse("MOCAP_DEFAULT_WITH_ROOT_MOTION", true),
            default_cam_scale: env_parse("MOCAP_DEFAULT_CAM_SCALE", 1.0),
            default_smoothing_strength: env_parse("MOCAP_DEFAULT_SMOOTHING_STRENGTH", 1.0),
            default_smoothing_window: env_parse("MOCAP_DEFAULT_SMOOTHING_WINDOW", 9),
            default_smoothing_ema: env_parse("MOCAP_DEFAULT_SMOOTHING_EMA", 0.2),
        }
    }
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or(default)
}

fn env_secs(key: &str, default: u64) -> Duration {
    Duration::from_secs(
        std::env::var(key)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default),
    )
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
