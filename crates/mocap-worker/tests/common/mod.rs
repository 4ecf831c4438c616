//! Shared harness: a temp directory tree plus stub external tools.
//!
//! Each test binary uses a different subset of the helpers.
#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use mocap_worker::WorkerConfig;

/// Default tracking output: subject 3 in 5 frames, subject 7 in 12.
pub const TWO_SUBJECT_TRACKING: &str = r#"[
    {"tid": [3, 7]}, {"tid": [3, 7]}, {"tid": [3, 7]}, {"tid": [3, 7]}, {"tid": [3, 7]},
    {"tid": [7]}, {"tid": [7]}, {"tid": [7]}, {"tid": [7]}, {"tid": [7]},
    {"tid": [7]}, {"tid": [7]}
]"#;

pub struct Harness {
    pub dir: TempDir,
    pub config: Arc<WorkerConfig>,
}

impl Harness {
    /// Build a harness whose tracker emits the given tracking JSON and
    /// whose remaining stubs succeed.
    pub fn new(tracking_json: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        for sub in ["uploads", "outputs", "tmp", "results", "tools", "scripts"] {
            fs::create_dir_all(root.join(sub)).unwrap();
        }
        // The pipeline only checks these exist; the blender stub ignores them.
        fs::write(root.join("scripts/export_rig.py"), "# export stub").unwrap();
        fs::write(root.join("scripts/strip_mesh.py"), "# strip stub").unwrap();

        let harness = Self {
            config: Arc::new(WorkerConfig {
                upload_dir: root.join("uploads"),
                output_dir: root.join("outputs"),
                temp_dir: root.join("tmp"),
                result_dir: root.join("results"),
                tracker_bin: root.join("tools/tracker"),
                extractor_bin: root.join("tools/extractor"),
                smoother_bin: root.join("tools/smoother"),
                smoothing_checkpoint: root.join("scripts/smoothing.ckpt"),
                blender_bin: root.join("tools/blender"),
                export_script: root.join("scripts/export_rig.py"),
                strip_script: root.join("scripts/strip_mesh.py"),
                tracking_timeout: Duration::from_secs(20),
                extraction_timeout: Duration::from_secs(20),
                smoothing_timeout: Duration::from_secs(20),
                export_timeout: Duration::from_secs(20),
                kill_grace: Duration::from_secs(5),
                poll_interval: Duration::from_millis(50),
                error_backoff: Duration::from_millis(100),
                max_queue_size: 10,
                ..WorkerConfig::default()
            }),
            dir,
        };

        // Tracker: writes demo_<stem>.json under <output-dir>/results.
        // Invoked as: tracker --source <video> --output-dir <dir>
        harness.write_tool(
            "tracker",
            &format!(
                r#"name=$(basename "$2")
stem="${{name%.*}}"
mkdir -p "$4/results"
cat > "$4/results/demo_$stem.json" <<'TRACKS'
{tracking_json}
TRACKS
"#
            ),
        );

        // Extractor: records the selected tid into the output.
        // Invoked as: extractor --tracks <json> --out <npz> --tid <id>
        harness.write_tool(
            "extractor",
            &format!(
                "echo run >> {}\necho \"tid=$6\" > \"$4\"\n",
                harness.marker("extractor").display()
            ),
        );

        // Smoother: copies input to output.
        // Invoked as: smoother --input <npz> --out <npz> --ckpt ... --win ...
        harness.write_tool(
            "smoother",
            &format!(
                "echo run >> {}\ncp \"$2\" \"$4\"\n",
                harness.marker("smoother").display()
            ),
        );

        // Blender: dispatches on the -P script.
        // Invoked as: blender -b -P <script> -- --input <in> --out <out> ...
        harness.write_tool(
            "blender",
            &format!(
                r#"echo run >> {marker}
case "$3" in
    *export_rig*) echo fbx > "$8" ;;
    *strip_mesh*) echo skeleton > "$8" ;;
esac
"#,
                marker = harness.marker("blender").display()
            ),
        );

        harness
    }

    /// Overwrite one stub tool with a custom body.
    pub fn write_tool(&self, name: &str, body: &str) {
        let path = self.dir.path().join("tools").join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    /// Marker file a stub appends to on every invocation.
    pub fn marker(&self, name: &str) -> PathBuf {
        self.dir.path().join("tools").join(format!("{name}.log"))
    }

    /// Whether a stub tool ever ran.
    pub fn tool_ran(&self, name: &str) -> bool {
        self.marker(name).exists()
    }

    /// Create an upload inside the authorized directory.
    pub fn upload_video(&self, name: &str) -> PathBuf {
        let path = self.config.upload_dir.join(name);
        fs::write(&path, b"not really a video").unwrap();
        path
    }

    /// The job-scoped temp path of a given artifact.
    pub fn temp_path(&self, file_name: &str) -> PathBuf {
        self.config.temp_dir.join(file_name)
    }
}

/// Poll until `cond` holds, panicking after ~15 seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..300 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached within 15s");
}
