//! Pipeline executor behavior against stubbed external tools.

mod common;

use std::sync::Arc;

use common::{Harness, TWO_SUBJECT_TRACKING};
use mocap_models::{ErrorCode, Job, JobParams, Stage};
use mocap_registry::progress_channel;
use mocap_worker::MocapPipeline;

fn pipeline(harness: &Harness) -> MocapPipeline {
    MocapPipeline::new(Arc::clone(&harness.config)).unwrap()
}

fn job(harness: &Harness, video: &str, params: JobParams) -> Job {
    Job::new(harness.upload_video(video), None, params)
}

#[tokio::test]
async fn full_pipeline_success_strips_mesh() {
    let harness = Harness::new(TWO_SUBJECT_TRACKING);
    let pipeline = pipeline(&harness);
    let job = job(&harness, "clip.mp4", JobParams::default());
    let (tx, _rx) = progress_channel();

    let output = pipeline.run(&job, &tx).await.unwrap();
    let artifacts = &output.artifacts;

    // Tracking output relocated to the job-scoped canonical path.
    let tracking = artifacts.tracking_data.clone().unwrap();
    assert_eq!(tracking, harness.temp_path(&format!("{}_tracking.json", job.id)));
    assert!(tracking.exists());
    assert!(artifacts.extracted_motion.clone().unwrap().exists());
    assert!(artifacts.smoothed_motion.clone().unwrap().exists());

    // Mesh strip replaced the heavy export and deleted it.
    let export = artifacts.export_file.clone().unwrap();
    assert_eq!(
        export,
        harness.config.result_dir.join(format!("{}_skeleton.fbx", job.id))
    );
    assert_eq!(std::fs::read_to_string(&export).unwrap().trim(), "skeleton");
    assert!(!harness
        .config
        .result_dir
        .join(format!("{}_rootmotion.fbx", job.id))
        .exists());
}

#[tokio::test]
async fn auto_selects_the_longest_track() {
    let harness = Harness::new(TWO_SUBJECT_TRACKING);
    let pipeline = pipeline(&harness);
    let job = job(&harness, "clip.mp4", JobParams::default());
    let (tx, _rx) = progress_channel();

    let output = pipeline.run(&job, &tx).await.unwrap();

    // {3: 5 frames, 7: 12 frames} with no explicit selector picks 7.
    let extracted = output.artifacts.extracted_motion.unwrap();
    assert_eq!(std::fs::read_to_string(&extracted).unwrap().trim(), "tid=7");
}

#[tokio::test]
async fn explicit_track_id_skips_auto_selection() {
    let harness = Harness::new(TWO_SUBJECT_TRACKING);
    let pipeline = pipeline(&harness);
    let params = JobParams {
        track_id: Some(3),
        ..Default::default()
    };
    let job = job(&harness, "clip.mp4", params);
    let (tx, _rx) = progress_channel();

    let output = pipeline.run(&job, &tx).await.unwrap();

    let extracted = output.artifacts.extracted_motion.unwrap();
    assert_eq!(std::fs::read_to_string(&extracted).unwrap().trim(), "tid=3");
}

#[tokio::test]
async fn no_tracks_found_stops_before_later_stages() {
    let harness = Harness::new(r#"[{"tid": []}, {"tid": []}]"#);
    let pipeline = pipeline(&harness);
    let job = job(&harness, "clip.mp4", JobParams::default());
    let (tx, _rx) = progress_channel();

    let failure = pipeline.run(&job, &tx).await.unwrap_err();

    assert_eq!(failure.stage, Stage::Extraction);
    assert_eq!(failure.code, ErrorCode::NoTracksFound);
    assert!(!harness.tool_ran("extractor"));
    assert!(!harness.tool_ran("smoother"));
    assert!(!harness.tool_ran("blender"));

    // Compensating cleanup removed the tracking artifact.
    let tracking = failure.partial.tracking_data.unwrap();
    assert!(!tracking.exists());
}

#[tokio::test]
async fn disk_full_diagnostics_are_classified() {
    let harness = Harness::new(TWO_SUBJECT_TRACKING);
    harness.write_tool(
        "extractor",
        "echo 'OSError: [Errno 28] No space left on device' >&2\nexit 1\n",
    );
    let pipeline = pipeline(&harness);
    let job = job(&harness, "clip.mp4", JobParams::default());
    let (tx, _rx) = progress_channel();

    let failure = pipeline.run(&job, &tx).await.unwrap_err();

    assert_eq!(failure.stage, Stage::Extraction);
    assert_eq!(failure.code, ErrorCode::DiskFull);
    assert!(failure.detail.unwrap().contains("No space left"));

    // The tracking artifact no longer exists on disk.
    assert!(!failure.partial.tracking_data.unwrap().exists());
}

#[tokio::test]
async fn oom_diagnostics_are_classified() {
    let harness = Harness::new(TWO_SUBJECT_TRACKING);
    harness.write_tool(
        "smoother",
        "echo 'RuntimeError: CUDA out of memory' >&2\nexit 1\n",
    );
    let pipeline = pipeline(&harness);
    let job = job(&harness, "clip.mp4", JobParams::default());
    let (tx, _rx) = progress_channel();

    let failure = pipeline.run(&job, &tx).await.unwrap_err();

    assert_eq!(failure.stage, Stage::Smoothing);
    assert_eq!(failure.code, ErrorCode::GpuOutOfMemory);
    assert!(!failure.partial.tracking_data.unwrap().exists());
    assert!(!failure.partial.extracted_motion.unwrap().exists());
}

#[tokio::test]
async fn mesh_strip_failure_keeps_the_full_export() {
    let harness = Harness::new(TWO_SUBJECT_TRACKING);
    harness.write_tool(
        "blender",
        r#"case "$3" in
    *export_rig*) echo fbx > "$8" ;;
    *strip_mesh*) echo 'strip exploded' >&2; exit 1 ;;
esac
"#,
    );
    let pipeline = pipeline(&harness);
    let job = job(&harness, "clip.mp4", JobParams::default());
    let (tx, _rx) = progress_channel();

    // The optimization sub-stage is never fatal.
    let output = pipeline.run(&job, &tx).await.unwrap();
    let export = output.artifacts.export_file.unwrap();
    assert_eq!(
        export,
        harness
            .config
            .result_dir
            .join(format!("{}_rootmotion.fbx", job.id))
    );
    assert_eq!(std::fs::read_to_string(&export).unwrap().trim(), "fbx");
}

#[tokio::test]
async fn rejects_video_outside_the_upload_directory() {
    let harness = Harness::new(TWO_SUBJECT_TRACKING);
    let pipeline = pipeline(&harness);

    let outside = harness.config.result_dir.join("sneaky.mp4");
    std::fs::write(&outside, b"video").unwrap();
    let job = Job::new(outside, None, JobParams::default());
    let (tx, _rx) = progress_channel();

    let failure = pipeline.run(&job, &tx).await.unwrap_err();

    assert_eq!(failure.stage, Stage::Tracking);
    assert_eq!(failure.code, ErrorCode::InvalidRequest);
    assert!(!harness.tool_ran("extractor"));
}

#[tokio::test]
async fn stage_timeout_is_classified_and_bounded() {
    let mut harness = Harness::new(TWO_SUBJECT_TRACKING);
    harness.write_tool("tracker", "sleep 60\n");
    {
        let config = Arc::get_mut(&mut harness.config).unwrap();
        config.tracking_timeout = std::time::Duration::from_millis(300);
    }
    let pipeline = pipeline(&harness);
    let job = job(&harness, "clip.mp4", JobParams::default());
    let (tx, _rx) = progress_channel();

    let start = std::time::Instant::now();
    let failure = pipeline.run(&job, &tx).await.unwrap_err();

    assert_eq!(failure.stage, Stage::Tracking);
    assert_eq!(failure.code, ErrorCode::TaskTimeout);
    // Timeout plus kill grace, with generous headroom.
    assert!(start.elapsed() < std::time::Duration::from_secs(15));
}

#[tokio::test]
async fn missing_verified_output_is_a_stage_failure() {
    let harness = Harness::new(TWO_SUBJECT_TRACKING);
    // Exit 0 without writing anything: success report, no visible output.
    harness.write_tool("tracker", "exit 0\n");
    let pipeline = pipeline(&harness);
    let job = job(&harness, "clip.mp4", JobParams::default());
    let (tx, _rx) = progress_channel();

    let failure = pipeline.run(&job, &tx).await.unwrap_err();

    assert_eq!(failure.stage, Stage::Tracking);
    assert_eq!(failure.code, ErrorCode::TrackingFailed);
    assert!(failure.message.contains("output file not found"));
}
